pub mod defaults;
pub mod error;
pub mod module;
pub mod paths;
pub mod pipeline;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
