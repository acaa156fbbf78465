// Pixelgate image gateway request interpreter

pub mod config;
pub mod constants;
pub mod error;
pub mod imagesize;
pub mod logging;
pub mod options;
pub mod overlay;
pub mod path;
pub mod pipeline;
pub mod security;

pub use config::Config;
pub use error::ProcessingError;
pub use options::ProcessingOptions;
pub use pipeline::{resolve, ResolvedRequest};
