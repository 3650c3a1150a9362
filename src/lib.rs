//! Local relay for the Groq chat API.
//!
//! Serves a static frontend, lists chat-capable models and forwards chat
//! requests (including inline images) to the provider.

pub mod assets;
pub mod chat;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logger;
pub mod models;
pub mod router;
pub mod upstream;

pub use router::{build_router, run_router, RouterState};
