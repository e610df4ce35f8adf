// Data processing pipeline: ingestion, processing, loading and storage

pub mod artifacts;
pub mod ingestion;
pub mod loader;
pub mod orchestrator;
pub mod processing;
pub mod storage;

pub use loader::{BulkLoader, LoadTotals};
pub use orchestrator::{PipelineOrchestrator, RunSummary};
