//! Service Layer - wires the protocol domain to the ports.

pub mod engine;
pub mod session;

pub use engine::SessionEngine;
pub use session::{SecureSession, SessionStep};
