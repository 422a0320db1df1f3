//! Signaling Relay
//!
//! Bootstraps peer-to-peer video calls for the virtual fair:
//! - Authenticates each browser connection with a signed token
//! - Keeps a registry of who is connected
//! - Forwards offer/answer/ICE messages between peers by id
//! - Announces joins and departures

mod dispatch;
mod error;
mod protocol;
mod registry;
mod session;

#[cfg(test)]
mod e2e_tests;

pub use dispatch::RelayContext;
pub use error::ErrorCategory;
pub use session::handle_connection;
