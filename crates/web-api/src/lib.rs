pub mod error;
pub mod handlers;
pub mod health;
pub mod server;

pub use error::ApiError;
pub use health::{HealthResponse, RecorderHealth};
pub use server::ApiServer;
