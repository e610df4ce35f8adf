// Ingestion: turns the raw delimited export into RawRecords

pub mod reader;

pub use reader::RawRecordReader;
