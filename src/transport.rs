use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::errors::{ExchangeError, TransportFailureKind};

/// How much of a rejected body is kept for diagnostics.
const REJECTED_BODY_LIMIT: usize = 2048;

/// Single-shot HTTP delivery of signed envelopes.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a new `HttpTransport`.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Gateway URL the envelopes are posted to.
    /// * `timeout` - Deadline for one request/response round trip.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::TransportFailure {
                kind: TransportFailureKind::Other,
                message: format!("Failed to create gateway client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one envelope and returns the raw reply body.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>, ExchangeError>` - Reply bytes on any 2xx status,
    ///   `RequestRejected` on any other status (the body is not parsed), or
    ///   `TransportFailure` when the network round trip itself failed.
    pub async fn send(&self, envelope: &[u8]) -> Result<Vec<u8>, ExchangeError> {
        tracing::info!("Posting {} byte envelope to {}", envelope.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(envelope.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let snippet = &body[..body.len().min(REJECTED_BODY_LIMIT)];
            tracing::warn!("Gateway rejected the request with status {}", status);
            return Err(ExchangeError::RequestRejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(snippet).into_owned(),
            });
        }

        let body = response.bytes().await?;
        tracing::info!("Gateway answered {} with {} bytes", status, body.len());
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_posts_octet_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bki"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8, 8]))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(format!("{}/bki", server.uri()), Duration::from_secs(5)).unwrap();
        let reply = transport.send(&[1, 2, 3]).await.unwrap();
        assert_eq!(reply, vec![9, 8]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("partner blocked"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), Duration::from_secs(5)).unwrap();
        match transport.send(b"x").await {
            Err(ExchangeError::RequestRejected { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "partner blocked");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(server.uri(), Duration::from_millis(100)).unwrap();
        let err = transport.send(b"x").await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::TransportFailure {
                kind: TransportFailureKind::Timeout,
                ..
            }
        ));
        assert!(err.is_retryable_by_caller());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_failure() {
        // Nothing listens on port 9 (discard) on a test host.
        let transport = HttpTransport::new("http://127.0.0.1:9/bki", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            transport.send(b"x").await,
            Err(ExchangeError::TransportFailure { .. })
        ));
    }
}
