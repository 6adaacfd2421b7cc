//! Shared, persisted state through which the pipeline stages hand off work.
//!
//! Every stage reads and writes named slots of one JSON mapping. Each mutation is persisted
//! before it becomes visible, so a restarted process resumes from exactly what was on disk.

mod accessor;
pub mod storage;
mod watermark;

pub use accessor::{State, StateBatch};
pub use storage::{JsonFileStorage, MemoryStorage, StateMap, StateStorage};
pub use watermark::Watermark;

/// Names of the slots stored in the state mapping.
pub mod keys {
    /// Start of the current dependency-change sweep window.
    pub const TIMESTAMP: &str = "timestamp";
    /// Modification time of the last film work extracted by the primary sweep.
    pub const FW_MODIFIED: &str = "fw_modified";
    /// Raw rows waiting for the transform stage.
    pub const EXTRACTED_DATA: &str = "extracted_data";
    /// Documents keyed by id waiting for the load stage.
    pub const TRANSFORMED_DATA: &str = "transformed_data";
}
