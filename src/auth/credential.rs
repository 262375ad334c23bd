//! Identity credential contract: the upstream source of tokens the registry accepts in exchange
//! for its own refresh tokens.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
};

/// Boxed future returned by [`TokenCredential::get_token`].
pub type CredentialFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Source of identity tokens (managed identity, service principal, CLI login, ...).
///
/// Implementations own acquisition and any caching of their own tokens; the authentication policy
/// only calls [`get_token`](Self::get_token) when its cached registry refresh token has to be
/// replaced. Failures should be reported as [`Error::Credential`] unless a more specific variant
/// applies, and are surfaced to the caller unchanged.
pub trait TokenCredential
where
	Self: Send + Sync,
{
	/// Requests a token valid for `scopes`.
	fn get_token<'a>(&'a self, scopes: &'a ScopeSet) -> CredentialFuture<'a>;
}

/// Credential that always returns the same token, useful for pre-fetched tokens and tests.
#[derive(Clone)]
pub struct StaticTokenCredential(AccessToken);
impl StaticTokenCredential {
	/// Wraps a token obtained elsewhere.
	pub fn new(token: AccessToken) -> Self {
		Self(token)
	}
}
impl TokenCredential for StaticTokenCredential {
	fn get_token<'a>(&'a self, _scopes: &'a ScopeSet) -> CredentialFuture<'a> {
		Box::pin(async move { Ok(self.0.clone()) })
	}
}
impl Debug for StaticTokenCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("StaticTokenCredential").field(&self.0).finish()
	}
}
