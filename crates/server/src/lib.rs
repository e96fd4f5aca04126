//! The HTTP resample RPC: `create_router` wires a worker-pool-backed
//! [`AppState`] into an `axum` router serving `GET`/`POST /`.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
