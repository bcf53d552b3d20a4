//! REST API for the knowledge base.
//!
//! axum router with bearer-token authentication, role enforcement
//! middleware, document CRUD, semantic search, and file import.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
