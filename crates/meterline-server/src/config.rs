/// Re-export `Config` from `meterline-core` for use within this crate.
///
/// Environment parsing lives in `meterline-core` so integration tests can
/// build a `Config` literal without depending on process env.
pub use meterline_core::config::Config;
