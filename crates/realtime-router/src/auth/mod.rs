//! Handshake authorization
//!
//! Resolves the identity of a connecting client from its handshake headers.

mod credential;
mod resolver;

pub use credential::Credential;
pub use resolver::{AuthError, AuthorizationResolver, HeaderTokenResolver, JwtResolver};
