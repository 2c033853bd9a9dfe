use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use http::Request;
use http::Response;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::util::BoxCloneSyncService;

use crate::ApiError;

/// The HTTP seam of the client: a request in, status and body out.
pub type Transport = BoxCloneSyncService<Request<String>, Response<String>, BoxError>;

/// Sends requests over a pooled `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<Request<String>> for ReqwestTransport {
    type Response = Response<String>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<String>) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let req = reqwest::Request::try_from(req)?;
            let res = client.execute(req).await?;
            let status = res.status();
            let body = res.text().await?;
            Ok(Response::builder().status(status).body(body)?)
        })
    }
}

/// Bound every call made through `svc` by `timeout` and erase its type.
pub fn with_timeout<S>(svc: S, timeout: Duration) -> Transport
where
    S: Service<Request<String>, Response = Response<String>, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(ServiceBuilder::new().timeout(timeout).service(svc))
}

/// Map a transport failure, where no status was received, into an [`ApiError`].
pub(crate) fn transport_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::transport("request timed out")
    } else {
        ApiError::transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;
    use tower::service_fn;

    use super::*;
    use crate::TRANSPORT_FAILURE;

    #[tokio::test(start_paused = true)]
    async fn it_times_out_slow_transports() {
        let slow = service_fn(|_req: Request<String>| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, BoxError>(Response::new(String::new()))
        });
        let svc = with_timeout(slow, Duration::from_millis(100));

        let err = svc.oneshot(Request::new(String::new())).await.unwrap_err();
        let err = transport_error(err);

        assert_eq!(err.code(), Some(TRANSPORT_FAILURE));
        assert_eq!(err.to_string(), "request failed (-1): request timed out");
        assert_eq!(err.raw_body(), None);
    }

    #[tokio::test]
    async fn it_keeps_transport_error_text() {
        let broken = service_fn(|_req: Request<String>| async {
            Err::<Response<String>, BoxError>("connection refused".into())
        });
        let svc = with_timeout(broken, Duration::from_secs(1));

        let err = transport_error(svc.oneshot(Request::new(String::new())).await.unwrap_err());
        assert_eq!(
            err,
            ApiError::RequestFailed {
                code: TRANSPORT_FAILURE,
                message: "connection refused".to_string(),
                raw_body: None,
            }
        );
    }
}
