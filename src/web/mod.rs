//! REST adapter for docstore.
//!
//! Exposes the file service over HTTP under `/f`, plus a `/health` probe.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_health_router, create_router};
pub use server::WebServer;
