pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError};
pub use models::{ItemOutcome, ItemReport, RunResult};
pub use services::consumer::Consumer;
pub use services::producer::Producer;
