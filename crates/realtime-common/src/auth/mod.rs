//! Token verification

mod jwt;

pub use jwt::{Claims, TokenError, TokenVerifier};
