pub mod admin;
pub mod health;
pub mod items;
pub mod quota;
pub mod usage;
