pub mod backend;
pub mod items;
pub mod plans;
pub mod schema;
pub mod subscriptions;
pub mod usage;

pub use backend::DuckDbBackend;
