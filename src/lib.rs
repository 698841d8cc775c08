mod cache;
mod client;
mod error;
pub mod schedule;
mod temperature;
mod types;
mod update;

pub use cache::{CacheSlot, DocumentCache};
pub use client::{InfinitudeClient, InfinitudeClientBuilder, SystemSnapshot};
pub use error::{Error, Result};
pub use temperature::Temperature;
pub use types::*;
pub use update::UpdateCoordinator;
