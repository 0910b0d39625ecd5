//! Watermark persistence
//!
//! - `MemoryWatermarkStore`: process-lifetime only
//! - `JsonFileWatermarkStore`: survives restarts, one JSON object per file

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileWatermarkStore;
pub use memory::MemoryWatermarkStore;
