// Pipeline processing: normalization, deduplication and enrichment

pub mod dedupe;
pub mod enrich;
pub mod normalize;

pub use dedupe::{deduplicate, DedupeReport};
pub use enrich::{Enricher, LineTotalEnricher};
pub use normalize::{DescriptionModes, NormalizeReport, RecordNormalizer};
