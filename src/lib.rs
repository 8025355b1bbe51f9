//! # Doc-Chat
//!
//! A multi-tenant document-grounded chat backend.
//!
//! Doc-Chat ingests uploaded text documents, splits them into overlapping
//! chunks, embeds them, and stores the vectors in a per-tenant collection.
//! At query time it retrieves the chunks most similar to the caller's
//! question and streams a completion grounded in them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Upload  │──▶│ Chunk + Tag  │──▶│  Chroma   │
//! │ (.txt/.md)│  │  + Embed     │   │ (1/tenant)│
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                     ┌───────────────────┤
//!                     ▼                   ▼
//!               ┌──────────┐       ┌──────────┐
//!               │ Documents │      │  /query  │
//!               │ Analytics │      │ (stream) │
//!               └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline error taxonomy |
//! | [`tenant`] | clientId validation and collection naming |
//! | [`chunker`] | Recursive text splitting |
//! | [`embedding`] | OpenAI embeddings adapter |
//! | [`vector_index`] | Chroma vector store adapter |
//! | [`store`] | Document persistence (local and managed) |
//! | [`ingest`] | Upload pipeline |
//! | [`retrieve`] | Query-time retrieval |
//! | [`chat`] | Prompt assembly and streamed completion |
//! | [`analytics`] | Per-tenant aggregate statistics |
//! | [`server`] | HTTP API |

pub mod analytics;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod tenant;
pub mod vector_index;
