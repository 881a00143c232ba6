pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::AlmanacConfig;
pub use error::{AlmanacError, Result};
pub use events::DomainEvent;
pub use types::*;
