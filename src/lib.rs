//! streamgen - stream text from a causal language model over HTTP
//!
//! `GET /` continues a configured prompt and sends the text back as a
//! chunked response while the model produces it.
//!
//! # Architecture
//!
//! - **engine**: the model boundary (`GenerationEngine`), a candle-backed
//!   implementation, a scripted stub, and the `Scheduler` that runs each
//!   job on its own OS thread under a concurrency limit
//! - **stream**: the handoff from the decode thread to the response body
//! - **server**: axum router and handlers
//! - **config** / **cli**: settings file and command line
//!
//! # Example
//!
//! ```bash
//! # Serve on 0.0.0.0:8000
//! streamgen serve
//!
//! # Without downloading weights
//! streamgen serve --stub
//!
//! curl -N http://localhost:8000/
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod server;
pub mod stream;

// Re-export key types
pub use config::{AppConfig, GenerationConfig, ModelConfig, ServerConfig};
pub use engine::{GenerationEngine, GenerationJob, Scheduler};
pub use stream::{ChunkSender, ChunkStream};
