// Glacier API Library
//
// HTTP endpoints and the WebSocket transport that delivers notifications to walls

pub mod http;
pub mod hub;

// Re-export commonly used types
pub use http::{create_router, AppState};
pub use hub::ClientHub;
