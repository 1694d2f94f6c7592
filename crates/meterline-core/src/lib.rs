pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod period;
pub mod plan;
pub mod policy;
pub mod store;
pub mod subscription;
pub mod usage;
pub mod verdict;

pub use engine::QuotaEngine;
pub use error::QuotaError;
pub use verdict::{DenyReason, QuotaVerdict};
