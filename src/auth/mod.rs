//! Authentication module
//!
//! Supports: static Bearer tokens and the OAuth2 refresh-token exchange.
//!
//! The `Authenticator` applies the bearer header to requests and manages the
//! access-token lifecycle: it caches the exchanged token for its declared
//! lifetime minus a safety margin, and can be told to discard the token when
//! the upstream rejects it.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken, TOKEN_EXPIRY_MARGIN_SECS};
