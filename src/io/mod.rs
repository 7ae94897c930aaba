//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - per-observation fitted-value export (`export`)
//! - regime summary JSON read/write (`summary`)

pub mod export;
pub mod ingest;
pub mod summary;

pub use export::*;
pub use ingest::*;
pub use summary::*;
