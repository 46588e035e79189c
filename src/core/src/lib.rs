mod clock;
mod config;
mod engine;
mod error;
mod kiln_config;
mod paths;
mod server;
pub mod storage;
pub mod stories;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ServerConfig, StoryPolicy};
pub use engine::StoryEngine;
pub use error::StoryError;
pub use kiln_config::{KilnConfig, StoriesConfig, ViewsConfig};
pub use server::{build_router, ApiError};
pub use storage::{SqliteStore, Store, StoreError};
pub use sweeper::{spawn_expiry_sweeper, sweep_once};
