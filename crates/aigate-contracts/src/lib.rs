//! Wire types shared by the gateway crates.
//!
//! Two schemas live side by side here: the OpenAI-compatible surface the gateway
//! exposes (`chat`, `embeddings`, `models`, `assistants`) and the Workers AI
//! surface it calls (`backend`).

pub mod assistants;
pub mod backend;
pub mod chat;
pub mod embeddings;
pub mod models;
pub mod patch;

pub use assistants::*;
pub use backend::*;
pub use chat::*;
pub use embeddings::*;
pub use models::*;
pub use patch::Patch;
