pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::AppConfig;
pub use error::{BoxError, GraphError, Result};
pub use event::EventBus;
pub use types::*;
