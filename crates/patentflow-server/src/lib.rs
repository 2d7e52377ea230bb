//! REST surface for patent report generation: the axum router, its shared
//! state and the tracing layer that feeds the live log stream.

pub mod logging;
pub mod routes;

pub use routes::{router, AppState};
