use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use tracing::debug;

use crate::auth::{AuthConfig, TokenProvider};
use crate::error::GalleryClientError;

/// builds the client used to talk to the gallery service.
pub fn build_auth_http_client(
    auth_config: &Option<AuthConfig>,
) -> std::result::Result<ClientWithMiddleware, GalleryClientError> {
    let auth_middleware = auth_config.as_ref().map(AuthMiddleware::from);
    if auth_middleware.is_none() {
        debug!("gallery auth disabled");
    }
    let reqwest_client = reqwest::Client::builder().build()?;
    Ok(ClientBuilder::new(reqwest_client).maybe_with(auth_middleware).build())
}

pub fn build_http_client() -> std::result::Result<ClientWithMiddleware, GalleryClientError> {
    let reqwest_client = reqwest::Client::builder().build()?;
    Ok(ClientBuilder::new(reqwest_client).build())
}

/// Helper trait to allow the reqwest_middleware client to optionally add a middleware.
trait OptionalMiddleware {
    fn maybe_with<M: Middleware>(self, middleware: Option<M>) -> Self;
}

impl OptionalMiddleware for ClientBuilder {
    fn maybe_with<M: Middleware>(self, middleware: Option<M>) -> Self {
        match middleware {
            Some(m) => self.with(m),
            None => self,
        }
    }
}

/// AuthMiddleware is a thread-safe middleware that adds a bearer token to
/// outbound requests. If the token it holds is expired, it will automatically
/// be refreshed.
pub struct AuthMiddleware {
    token_provider: Arc<Mutex<TokenProvider>>,
}

impl AuthMiddleware {
    /// Fetches a token from our TokenProvider. This locks the TokenProvider as
    /// we might need to refresh the token if it has expired.
    ///
    /// In the common case, this lock is held only to read the underlying token
    /// stored in memory. In the event of an expired token we hold the lock
    /// while the refresher runs; no other gallery requests can proceed from
    /// this client until the token has been fetched, which is expected since
    /// any request without it would fail anyway.
    fn get_token(&self) -> Result<String, anyhow::Error> {
        let mut provider = self.token_provider.lock().map_err(|e| anyhow!("lock error: {e:?}"))?;
        provider.get_valid_token().map_err(|e| anyhow!("couldn't get token: {e:?}"))
    }
}

impl From<&AuthConfig> for AuthMiddleware {
    fn from(cfg: &AuthConfig) -> Self {
        Self {
            token_provider: Arc::new(Mutex::new(TokenProvider::new(cfg))),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self.get_token().map_err(reqwest_middleware::Error::Middleware)?;

        let header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| reqwest_middleware::Error::Middleware(anyhow!("invalid auth token: {e}")))?;
        req.headers_mut().insert(AUTHORIZATION, header);

        next.run(req, extensions).await
    }
}
