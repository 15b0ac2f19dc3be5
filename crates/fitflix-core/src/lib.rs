//! # FIT-FLIX Core
//!
//! I/O-free logic for the FIT-FLIX assistant: data models, sentence-aware
//! text splitting, the embedding and vector-store traits, the retriever, and
//! prompt/context formatting.
//!
//! This crate performs no filesystem, database, or network access. Concrete
//! embedding providers, the SQLite store, and the hosted LLM clients live in
//! the `fitflix` app crate.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod store;
