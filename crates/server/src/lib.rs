//! HTTP and WebSocket surface of the sticker service.

pub mod api;
pub mod metrics;
pub mod state;
