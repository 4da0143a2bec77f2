//! Log source implementations

pub mod unified;

pub use unified::{parse_ndjson, UnifiedLogSource};
