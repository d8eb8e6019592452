//! HTTP service that turns timestamped named-entity mentions into a scrolling
//! word-ticker video by driving Blender headless.

pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod renderer;
pub mod routes;
pub mod ticker;

pub use config::Config;
pub use error::{ApiError, ConfigError, RenderError, TickerError};
pub use routes::{create_routes, AppState};
