//! Bearer-challenge authentication for container registries: probe the registry, read its
//! `WWW-Authenticate` challenge, trade an identity token for a cached refresh token, and retry
//! the request with a freshly exchanged access token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod challenge;
pub mod error;
pub mod exchange;
pub mod http;
pub mod obs;
pub mod policy;
pub mod retry;

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Request, Response, StatusCode};
	pub use reqwest_middleware::ClientWithMiddleware;
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use reqwest_middleware;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
