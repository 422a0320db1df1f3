//! Signed-token identity primitives for the virtual fair signaling relay.
//!
//! Browser clients present an HS256 token minted by the clubs backend. The
//! relay verifies it with a shared secret and exposes the decoded claims to
//! the other peers as the client's [`Identity`].

pub mod error;
pub mod identity;
pub mod token;

pub use error::AuthError;
pub use identity::Identity;
pub use token::{TokenAuthority, TokenClaims};
