pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod types;

pub use config::EtlConfig;
pub use error::{EtlError, Result};
