//! # crpt-api
//!
//! A client for the GIS MT ("Honest Sign") document creation API that keeps
//! outbound traffic inside the API's published request quota.
//!
//! ## How a call flows
//!
//! 1. **Validation**: a blank document or empty signature is rejected with
//!    [`ApiError::InvalidArgument`] before any quota is used.
//! 2. **Admission**: the shared [`quota_window::RateLimiter`] admits the call,
//!    suspending it while `request_limit` calls already left in the trailing
//!    window.
//! 3. **Send**: the document is serialized to JSON and POSTed with a bearer
//!    token through the [`Transport`].
//! 4. **Error Mapping**: non-2xx replies and transport failures become
//!    [`ApiError::RequestFailed`].
//!
//! The limiter is released on every exit path. Release only wakes waiting
//! callers early; each admission still counts against the quota for the full
//! window.
//!
//! ## Example
//!
//! ```no_run
//! use crpt_api::{ApiClient, ClientConfig, Description, LpIntroduceGoods};
//! use quota_window::TimeUnit;
//!
//! # async fn run() -> Result<(), crpt_api::ApiError> {
//! let client = ApiClient::new(ClientConfig::new(TimeUnit::Minutes, 100, "token"))?;
//!
//! let doc = LpIntroduceGoods {
//!     description: Some(Description::new("7700000000")),
//!     doc_id: Some("doc-1".to_string()),
//!     ..Default::default()
//! };
//! client.create_document(&doc, "signature").await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod document;
mod error;
mod transport;


pub use client::ApiClient;
pub use client::DocumentResponse;
pub use config::ClientConfig;
pub use config::DEFAULT_ENDPOINT;
pub use document::Description;
pub use document::Document;
pub use document::LpIntroduceGoods;
pub use document::Product;
pub use error::ApiError;
pub use error::TRANSPORT_FAILURE;
pub use error::extract_error_message;
pub use transport::ReqwestTransport;
pub use transport::Transport;
pub use transport::with_timeout;
