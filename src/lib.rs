//! # FIT-FLIX
//!
//! A retrieval-augmented question-answering assistant for a fitness brand.
//!
//! Markdown and text files describing classes, trainers, nutrition, and
//! membership are split into overlapping chunks, embedded, and stored in
//! SQLite. Each question retrieves the closest chunks and a hosted LLM
//! answers from them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Knowledge   │──▶│ Split+Embed  │──▶│  SQLite  │
//! │ base files  │   │              │   │ vectors  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │ retrieve
//!                                      ┌────▼─────┐
//!                                      │   LLM    │
//!                                      └────┬─────┘
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │
//!                 │ (chat)   │        │  (axum)  │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fitflix index                     # embed the knowledge base
//! fitflix retrieve "yoga schedule"  # inspect retrieval
//! fitflix ask "When is yoga?"       # one-shot answer
//! fitflix chat                      # interactive session
//! fitflix serve                     # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`loader`] | Knowledge-base file loading and cleaning |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`knowledge_base`] | Indexing and retrieval |
//! | [`generation`] | LLM clients and answer generation |
//! | [`assistant`] | Question answering and sessions |
//! | [`server`] | HTTP API |
//!
//! Text splitting, prompt building, and the store and retriever abstractions
//! live in the I/O-free `fitflix-core` crate.

pub mod assistant;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod knowledge_base;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
