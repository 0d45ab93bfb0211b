//! Telephony adapter and process HTTP server

pub mod routes;
pub mod settings;
pub mod state;
pub mod stream_ws;

pub use routes::create_router;
pub use settings::Settings;
pub use state::AppState;
