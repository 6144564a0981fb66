//! Bank-level operations: chunk discovery and sub-sound metadata

mod metadata;
mod scanner;

pub use metadata::{ChunkMetadata, read_chunk_metadata};
pub use scanner::{BankScan, DiscoveredInputs, ScannedChunk, discover_inputs, scan_file};
