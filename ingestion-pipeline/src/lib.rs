pub mod chunker;
pub mod extraction;
pub mod merge;
pub mod ocr;
pub mod pdf;
pub mod pipeline;

pub use pipeline::{DefaultPipelineServices, IngestionPipeline, PipelineServices};
