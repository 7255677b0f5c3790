//! Resolution of the identity a connection announces with `setup`.
//!
//! Authentication happens outside the relay; by the time a client sends
//! `setup` it holds a user id issued by the auth layer. The
//! [`IdentityResolver`] seam lets an embedding application check that claim
//! (against a session store, a signed token, ...) before the registry
//! records it.

use prochat_proto::event::SetupPayload;

/// Errors raised when a `setup` claim is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The claim carried no usable user id.
    #[error("setup carried an empty user id")]
    Empty,
    /// The resolver refused the claim.
    #[error("identity rejected: {0}")]
    Rejected(String),
}

/// Maps a `setup` claim to a stable user identity.
pub trait IdentityResolver: Send + Sync {
    /// Returns the identity to register for this claim.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if the claim is refused.
    fn resolve(&self, claim: &SetupPayload) -> Result<String, IdentityError>;
}

/// Trusts the announced id as-is, after trimming surrounding whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaimedIdentity;

impl IdentityResolver for ClaimedIdentity {
    fn resolve(&self, claim: &SetupPayload) -> Result<String, IdentityError> {
        let user_id = claim.user_id.trim();
        if user_id.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(user_id.to_string())
    }
}
