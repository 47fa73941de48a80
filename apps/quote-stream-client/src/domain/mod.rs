//! Domain Layer - Core quote and session types.
//!
//! This layer contains the core domain types for quote streaming with no
//! transport dependencies. All types here are pure Rust with serialization
//! support.

/// Quote updates and their partial field sets.
pub mod quote;

/// Session identifiers and connection lifecycle states.
pub mod session;
