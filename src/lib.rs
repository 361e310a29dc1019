pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod index;
pub mod logging;
pub mod process;
pub mod schema;

pub use config::PipelineConfig;
pub use error::HarmonizeError;
