//! Challenge-driven bearer authentication as a [`reqwest_middleware`] middleware.
//!
//! For every request the policy:
//!
//! 1. sends a bodiless probe copy through the rest of the pipeline and returns any non-401
//!    response untouched,
//! 2. parses the `WWW-Authenticate` challenge of a 401 into a [`Challenge`],
//! 3. obtains a registry refresh token from its [`ExpiringResource`] cache (exchanging a fresh
//!    identity token when the cached one is stale) or, without a credential, requests an anonymous
//!    token,
//! 4. exchanges the refresh token for an access token scoped to the challenge, and
//! 5. sends the original request with `Authorization: Bearer <access-token>`.
//!
//! Challenge values travel with the request rather than living in shared fields, so concurrent
//! requests for different scopes never observe each other's challenge. The most recent challenge
//! is still recorded for diagnostics.

// crates.io
use reqwest::header::AUTHORIZATION;
use reqwest_middleware::{ClientBuilder, Middleware, Next};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, RefreshToken, ScopeSet, TokenCredential},
	cache::{CacheMetrics, ExpiringResource, ExpiringResourceOptions},
	challenge::Challenge,
	error::ConfigError,
	exchange::{AuthenticationClient, TokenGrant},
	http,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	retry::RetryPolicy,
};

/// Scope requested from identity credentials when none is configured.
pub const DEFAULT_CREDENTIAL_SCOPE: &str = "https://containerregistry.azure.net/.default";

type RefreshTokenCache = ExpiringResource<RefreshToken, Challenge>;

/// Pipeline middleware attaching registry access tokens obtained through bearer challenges.
pub struct AuthenticationPolicy {
	client: Arc<AuthenticationClient>,
	// `None` runs the policy anonymously.
	refresh_tokens: Option<RefreshTokenCache>,
	last_challenge: Mutex<Option<Challenge>>,
}
impl AuthenticationPolicy {
	/// Creates a policy exchanging tokens through `client`.
	///
	/// With a `credential`, identity tokens for `scopes` are traded for cached refresh tokens;
	/// without one the policy requests anonymous access tokens.
	pub fn new(
		credential: Option<Arc<dyn TokenCredential>>,
		scopes: ScopeSet,
		client: AuthenticationClient,
	) -> Self {
		Self::with_cache_options(credential, scopes, client, ExpiringResourceOptions::default())
	}

	/// Same as [`AuthenticationPolicy::new`] with explicit refresh token cache options.
	pub fn with_cache_options(
		credential: Option<Arc<dyn TokenCredential>>,
		scopes: ScopeSet,
		client: AuthenticationClient,
		options: ExpiringResourceOptions,
	) -> Self {
		let client = Arc::new(client);
		let refresh_tokens = credential
			.map(|credential| refresh_token_cache(credential, scopes, client.clone(), options));

		Self { client, refresh_tokens, last_challenge: Mutex::new(None) }
	}

	/// Starts a builder for a policy talking to `endpoint`.
	pub fn builder(endpoint: Url) -> AuthenticationPolicyBuilder {
		AuthenticationPolicyBuilder::new(endpoint)
	}

	/// Returns `true` when no identity credential is configured.
	pub fn is_anonymous(&self) -> bool {
		self.refresh_tokens.is_none()
	}

	/// Returns the most recent challenge the registry issued, if any.
	pub fn last_challenge(&self) -> Option<Challenge> {
		self.last_challenge.lock().clone()
	}

	/// Counters of the refresh token cache; `None` in anonymous mode.
	pub fn refresh_token_metrics(&self) -> Option<&CacheMetrics> {
		self.refresh_tokens.as_ref().map(ExpiringResource::metrics)
	}

	/// Obtains an access token satisfying `challenge`.
	pub async fn access_token(&self, challenge: &Challenge) -> Result<AccessToken> {
		let Some(cache) = &self.refresh_tokens else {
			return self
				.client
				.exchange_refresh_token(&challenge.service, &challenge.scope, "", TokenGrant::Password)
				.await;
		};
		let refresh_token = cache.get(challenge.clone()).await?;

		self.client
			.exchange_refresh_token(
				&challenge.service,
				&challenge.scope,
				refresh_token.expose(),
				TokenGrant::RefreshToken,
			)
			.await
	}

	async fn authorize(
		&self,
		mut req: Request,
		extensions: &mut ::http::Extensions,
		next: Next<'_>,
	) -> reqwest_middleware::Result<Response> {
		let probe = http::probe_request(&req);
		let response = next.clone().run(probe, extensions).await?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return Ok(response);
		}

		let challenge = Challenge::from_headers(response.headers()).map_err(Error::from)?;

		drop(response);

		*self.last_challenge.lock() = Some(challenge.clone());

		let token = self.access_token(&challenge).await?;
		let header =
			token.secret.bearer_header().map_err(|e| Error::from(ConfigError::from(e)))?;

		req.headers_mut().insert(AUTHORIZATION, header);

		next.run(req, extensions).await
	}
}
#[async_trait::async_trait]
impl Middleware for AuthenticationPolicy {
	async fn handle(
		&self,
		req: Request,
		extensions: &mut ::http::Extensions,
		next: Next<'_>,
	) -> reqwest_middleware::Result<Response> {
		const KIND: FlowKind = FlowKind::Authorize;

		let span = FlowSpan::new(KIND, "handle");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.authorize(req, extensions, next)).await;

		obs::record_flow_result(KIND, &result);

		result
	}
}
impl Debug for AuthenticationPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationPolicy")
			.field("client", &self.client)
			.field("anonymous", &self.is_anonymous())
			.field("refresh_tokens", &self.refresh_tokens)
			.finish()
	}
}

/// Builder assembling an [`AuthenticationPolicy`] together with its exchange pipeline.
pub struct AuthenticationPolicyBuilder {
	endpoint: Url,
	credential: Option<Arc<dyn TokenCredential>>,
	scopes: Option<ScopeSet>,
	cache_options: ExpiringResourceOptions,
	retry: RetryPolicy,
	http: Option<ReqwestClient>,
}
impl AuthenticationPolicyBuilder {
	fn new(endpoint: Url) -> Self {
		Self {
			endpoint,
			credential: None,
			scopes: None,
			cache_options: ExpiringResourceOptions::default(),
			retry: RetryPolicy::default(),
			http: None,
		}
	}

	/// Authenticates with `credential` instead of anonymously.
	pub fn credential(mut self, credential: impl 'static + TokenCredential) -> Self {
		self.credential = Some(Arc::new(credential));

		self
	}

	/// Authenticates with a shared credential instead of anonymously.
	pub fn shared_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Overrides the scopes requested from the credential.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Overrides the refresh token cache timing.
	pub fn cache_options(mut self, options: ExpiringResourceOptions) -> Self {
		self.cache_options = options;

		self
	}

	/// Overrides the retry middleware used by the token exchange and registry pipelines.
	pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Sends every request through `client` instead of a default reqwest client.
	pub fn http_client(mut self, client: ReqwestClient) -> Self {
		self.http = Some(client);

		self
	}

	/// Builds the policy; its token exchanges run through a pipeline with the retry middleware.
	pub fn build(mut self) -> Result<AuthenticationPolicy> {
		let http = self.http.take().unwrap_or_default();

		self.build_with(http)
	}

	/// Builds a registry client running `[AuthenticationPolicy, RetryPolicy]` over the transport.
	///
	/// The policy sits outermost so its probe and authenticated retry are both covered by the
	/// retry middleware.
	pub fn build_client(self) -> Result<ClientWithMiddleware> {
		let http = self.http.clone().unwrap_or_default();
		let retry = self.retry;
		let policy = self.build_with(http.clone())?;

		Ok(ClientBuilder::new(http).with(policy).with(retry).build())
	}

	fn build_with(self, http: ReqwestClient) -> Result<AuthenticationPolicy> {
		let scopes = match self.scopes {
			Some(scopes) => scopes,
			None => ScopeSet::new([DEFAULT_CREDENTIAL_SCOPE]).map_err(ConfigError::from)?,
		};
		let exchange_pipeline = ClientBuilder::new(http).with(self.retry).build();
		let client = AuthenticationClient::new(self.endpoint, exchange_pipeline)?;

		Ok(AuthenticationPolicy::with_cache_options(
			self.credential,
			scopes,
			client,
			self.cache_options,
		))
	}
}
impl Debug for AuthenticationPolicyBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationPolicyBuilder")
			.field("endpoint", &self.endpoint.as_str())
			.field("credential_set", &self.credential.is_some())
			.field("scopes", &self.scopes)
			.field("cache_options", &self.cache_options)
			.field("retry", &self.retry)
			.finish()
	}
}

fn refresh_token_cache(
	credential: Arc<dyn TokenCredential>,
	scopes: ScopeSet,
	client: Arc<AuthenticationClient>,
	options: ExpiringResourceOptions,
) -> RefreshTokenCache {
	ExpiringResource::with_options(
		move |challenge: Challenge| {
			let credential = credential.clone();
			let scopes = scopes.clone();
			let client = client.clone();

			async move {
				let identity_token = credential.get_token(&scopes).await?;
				let refresh_token =
					client.exchange_identity_token(&challenge.service, &identity_token).await?;
				let expires_at = refresh_token.expires_at;

				Ok((refresh_token, expires_at))
			}
		},
		options,
	)
}
