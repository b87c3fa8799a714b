//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! - **Driving Ports (Inbound):** [`SecureTransport`], used by the listener
//! - **Driven Ports (Outbound):** [`PskKeyStore`] and [`TimeSource`]

pub mod inbound;
pub mod outbound;

pub use inbound::{Delivered, EngineOutput, SecureTransport, SessionEvent};
pub use outbound::{PskKeyStore, TimeSource};
