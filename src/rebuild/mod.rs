//! Chunk rebuild pipeline: encoder invocation, quality search, and in-place
//! patching

mod encoder;
mod orchestrator;
mod patcher;

pub use encoder::{
    EncodeOutcome, EncodeRequest, EncoderProgress, FsbEncoder, ProcessEncoder,
};
pub use orchestrator::{
    BatchReplacement, PreviousBuild, RebuildOptions, RebuildOrchestrator, RebuildOutcome,
    RebuildRequest,
};
pub use patcher::{ChunkBoundary, patch_container};
