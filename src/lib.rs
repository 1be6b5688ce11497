// Public API for integration tests and potential library usage

pub mod api;
pub mod error;
pub mod identity;
pub mod llm;
pub mod protocol;
pub mod state;
pub mod throttle;
pub mod types;
pub mod ws;

// Re-export broadcast for testing
pub mod broadcast;
