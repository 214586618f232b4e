pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::MaestroConfig;
pub use error::{MaestroError, Result};
pub use types::*;
