use std::fmt;
use std::sync::Arc;

use http::HeaderValue;
use http::Method;
use http::Request;
use http::Response;
use http::Uri;
use http::header::ACCEPT;
use http::header::AUTHORIZATION;
use http::header::CONTENT_TYPE;
use quota_window::RateLimiter;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::ApiError;
use crate::ClientConfig;
use crate::Document;
use crate::transport::ReqwestTransport;
use crate::transport::Transport;
use crate::transport::transport_error;
use crate::transport::with_timeout;

const APPLICATION_JSON: &str = "application/json";

/// A successful (2xx) reply to a document submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResponse {
    pub status: u16,
    pub body: String,
}

impl DocumentResponse {
    /// Decode the response body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Client for the document creation API.
///
/// Every call is admitted by a shared sliding window [`RateLimiter`] before
/// it is sent, so no more than `request_limit` calls leave the process in
/// any trailing `time_unit`. Cloning is cheap and clones share the quota.
///
/// No call is retried; retry policy belongs to the caller.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Uri,
    authorization: HeaderValue,
    limiter: RateLimiter,
    transport: Transport,
}

impl ApiClient {
    /// Build a client that talks to `config.endpoint` over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if the limit or timeout is zero, the endpoint or token
    /// are malformed, or the HTTP client cannot be created.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Config(format!("cannot build http client: {e}")))?;
        Self::with_transport(config, ReqwestTransport::new(client))
    }

    /// Build a client that sends requests through `transport`.
    ///
    /// The transport is wrapped with the configured request timeout.
    pub fn with_transport<S>(config: ClientConfig, transport: S) -> Result<Self, ApiError>
    where
        S: Service<Request<String>, Response = Response<String>, Error = BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let limiter = RateLimiter::per_unit(config.time_unit, config.request_limit)?;

        if config.timeout_ms == 0 {
            return Err(ApiError::Config("request timeout must be positive".to_string()));
        }

        let endpoint = config
            .endpoint
            .parse::<Uri>()
            .map_err(|e| ApiError::Config(format!("invalid endpoint {}: {e}", config.endpoint)))?;

        let mut authorization = HeaderValue::try_from(format!("Bearer {}", config.auth_token))
            .map_err(|_| ApiError::Config("auth token is not a valid header value".to_string()))?;
        authorization.set_sensitive(true);

        debug!(?config, "api client configured");

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                authorization,
                limiter,
                transport: with_timeout(transport, config.timeout()),
            }),
        })
    }

    /// The limiter shared by every clone of this client.
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Submit `document` for creation.
    ///
    /// Waits for rate limit capacity first. `signature` is required by the
    /// call contract even though `LP_INTRODUCE_GOODS` does not transmit it.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` for a blank document or an empty signature, before
    ///   any quota is consumed.
    /// * `RequestFailed` for a non-2xx status (with the status code) or a
    ///   transport failure (with code `-1`).
    pub async fn create_document<D>(
        &self,
        document: &D,
        signature: &str,
    ) -> Result<DocumentResponse, ApiError>
    where
        D: Document + Sync,
    {
        self.submit(document, signature, None).await
    }

    /// Like [`create_document`](Self::create_document), but gives up with
    /// `ApiError::Cancelled` if `cancel` fires while waiting for capacity.
    pub async fn create_document_cancellable<D>(
        &self,
        document: &D,
        signature: &str,
        cancel: &CancellationToken,
    ) -> Result<DocumentResponse, ApiError>
    where
        D: Document + Sync,
    {
        self.submit(document, signature, Some(cancel)).await
    }

    #[instrument(skip_all, fields(doc_type = D::DOC_TYPE), level = "debug")]
    async fn submit<D>(
        &self,
        document: &D,
        signature: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<DocumentResponse, ApiError>
    where
        D: Document + Sync,
    {
        if document.is_blank() {
            return Err(ApiError::InvalidArgument("document must not be empty"));
        }
        if signature.trim().is_empty() {
            return Err(ApiError::InvalidArgument("signature must not be empty"));
        }

        // Released on every exit path below
        let _permit = self.inner.limiter.admit(cancel).await?;

        let body = document
            .to_json()
            .map_err(|e| ApiError::transport(format!("cannot serialize document: {e}")))?;
        let request = self.build_request(body)?;

        debug!(endpoint = %self.inner.endpoint, "sending document");
        let response = self
            .inner
            .transport
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| {
                let err = transport_error(err);
                warn!(error = %err, "document request failed");
                err
            })?;

        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            let err = ApiError::status(status.as_u16(), body);
            warn!(error = %err, "document rejected");
            return Err(err);
        }

        debug!(%status, "document accepted");
        Ok(DocumentResponse {
            status: status.as_u16(),
            body,
        })
    }

    fn build_request(&self, body: String) -> Result<Request<String>, ApiError> {
        Request::builder()
            .method(Method::POST)
            .uri(self.inner.endpoint.clone())
            .header(AUTHORIZATION, self.inner.authorization.clone())
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .body(body)
            .map_err(|e| ApiError::transport(e.to_string()))
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("endpoint", &self.inner.endpoint)
            .field("limiter", &self.inner.limiter)
            .finish_non_exhaustive()
    }
}
