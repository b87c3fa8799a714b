//! Adapters Layer - concrete upstream clients.

pub mod http_authority;

pub use http_authority::HttpAccessAuthority;
