use anyhow::Result;
use serde::Serialize;

use crate::DuckDbBackend;

/// A tenant-owned record served by the metered `/api/items` routes.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CreateItemParams {
    pub name: String,
    pub description: Option<String>,
}

pub struct UpdateItemParams {
    pub name: Option<String>,
    pub description: Option<String>,
}

const ITEM_SELECT: &str = "SELECT id, tenant_id, name, description, \
     CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) FROM items";

/// Generate an item ID: "item_" + 10 random alphanumeric chars.
fn generate_item_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: String = (0..10)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect();
    format!("item_{chars}")
}

fn item_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl DuckDbBackend {
    pub async fn create_item(&self, tenant_id: &str, params: CreateItemParams) -> Result<Item> {
        let conn = self.conn.lock().await;
        let id = generate_item_id();
        conn.execute(
            "INSERT INTO items (id, tenant_id, name, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            duckdb::params![id, tenant_id, params.name, params.description],
        )?;

        // Read back the created row to get timestamps.
        let item = conn
            .prepare(&format!("{ITEM_SELECT} WHERE id = ?1"))?
            .query_row(duckdb::params![id], item_from_row)?;
        Ok(item)
    }

    /// All items owned by `tenant_id`, newest first.
    pub async fn list_items(&self, tenant_id: &str) -> Result<Vec<Item>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "{ITEM_SELECT} WHERE tenant_id = ?1 ORDER BY created_at DESC, id"
        ))?;
        let rows = stmt.query_map(duckdb::params![tenant_id], item_from_row)?;
        Ok(rows.collect::<duckdb::Result<Vec<_>>>()?)
    }

    /// Scoped to the tenant: another tenant's id reads as missing.
    pub async fn update_item(
        &self,
        tenant_id: &str,
        id: &str,
        params: UpdateItemParams,
    ) -> Result<Option<Item>> {
        let conn = self.conn.lock().await;

        let exists: i64 = conn
            .prepare("SELECT COUNT(*) FROM items WHERE tenant_id = ?1 AND id = ?2")?
            .query_row(duckdb::params![tenant_id, id], |row| row.get(0))?;
        if exists == 0 {
            return Ok(None);
        }

        if let Some(ref name) = params.name {
            conn.execute(
                "UPDATE items SET name = ?1, updated_at = CURRENT_TIMESTAMP \
                 WHERE tenant_id = ?2 AND id = ?3",
                duckdb::params![name, tenant_id, id],
            )?;
        }
        if let Some(ref description) = params.description {
            conn.execute(
                "UPDATE items SET description = ?1, updated_at = CURRENT_TIMESTAMP \
                 WHERE tenant_id = ?2 AND id = ?3",
                duckdb::params![description, tenant_id, id],
            )?;
        }

        let item = conn
            .prepare(&format!("{ITEM_SELECT} WHERE id = ?1"))?
            .query_row(duckdb::params![id], item_from_row)?;
        Ok(Some(item))
    }
}
