pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod transform;

pub use error::{HealthlakeError, Result};
