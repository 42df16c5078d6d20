//! # Joe AI
//!
//! A persona-constrained retrieval-augmented chat assistant.
//!
//! A local corpus of transcripts and a reference document (the BrainLift) is
//! chunked, embedded, and stored once. Each question is answered by
//! retrieving the closest chunks, assembling a persona-bound system payload
//! with the current date, calling a completion provider, and cleaning the
//! reply so it stays in first person and in the right tense.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Documents  │──▶│ Chunk+Embed │──▶│  SQLite  │
//! │  .md / .txt │   │  (retried)  │   │  vectors │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ top-k
//!      ┌──────────┐   ┌──────────┐   ┌─────▼─────┐
//!      │ Sanitize │◀──│   LLM    │◀──│  Prompt   │
//!      └──────────┘   └──────────┘   │ + dates   │
//!                                    └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! joe init                          # create the store
//! joe ingest                        # chunk and embed the documents root
//! joe search "vector alignment"     # inspect retrieval
//! joe ask "Should we add a feature?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`connector_fs`] | Documents root scanning |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding providers and retry |
//! | [`store`] | Vector store backends |
//! | [`ingest`] | Idempotent ingestion |
//! | [`search`] | Top-k retrieval |
//! | [`dates`] | Relative date normalization |
//! | [`prompt`] | System payload assembly |
//! | [`completion`] | Completion providers |
//! | [`sanitize`] | Output post-processing |
//! | [`answer`] | Answer orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod connector_fs;
pub mod dates;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod sanitize;
pub mod search;
pub mod store;

pub use answer::Assistant;
pub use error::{Error, Result};
