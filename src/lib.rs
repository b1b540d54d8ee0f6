//! Wordchain: word-chain game assistant engine.
//!
//! Keeps a SQLite word table indexed by chaining nodes, classifies words
//! against End/Attack node sets, and answers "which words can I play next"
//! with ranked, filtered candidate lists.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod graph;
pub mod observability;
pub mod types;

pub use engine::{Engine, EngineEvent};
pub use error::{Error, Result};
