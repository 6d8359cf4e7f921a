//! DBC parsing and the in-memory signal model
//!
//! This module contains the DBC text parser and the validated model the
//! frame decoder reads layouts from.

pub mod dbc;
pub mod database;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, DbcModel, MessageDefinition, SignalDefinition, ValueType,
};
