//! Application Layer - Port definitions.
//!
//! This layer defines the transport contract that the protocol engine drives
//! and that infrastructure adapters implement.

/// Port interfaces for the transport.
pub mod ports;
