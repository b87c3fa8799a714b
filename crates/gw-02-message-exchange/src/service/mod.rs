//! Service Layer - the message exchange state machine.

pub mod exchange;

pub use exchange::MessageExchange;

#[cfg(test)]
mod tests;
