pub mod config;
pub mod error;
pub mod normalize;
pub mod scope;
pub mod types;

pub use config::AppConfig;
pub use error::CrawlError;
pub use types::*;
