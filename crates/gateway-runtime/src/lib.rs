//! # Access Gateway Runtime
//!
//! Configuration, logging bootstrap and the UDP listener that connects the
//! secure session engine, the message exchange and the access control
//! dispatcher.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then `GW_*` environment, then CLI flags)
//! 2. Validate it
//! 3. Install the log subscriber
//! 4. Provision PSK identities, bind the secure port
//! 5. Serve until Ctrl+C, then send close_notify to every peer

pub mod config;
pub mod gateway;
pub mod logging;
pub mod sink;

pub use config::{ConfigError, GatewayConfig};
pub use gateway::Gateway;
pub use logging::init_logging;
