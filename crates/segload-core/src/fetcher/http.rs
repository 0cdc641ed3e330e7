use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use super::{validate_partial, ByteRange, ContentRange, FetchError, PartialResponse, RangeFetcher};
use crate::config::{LoaderConfig, SESSION_HEADER};
use crate::session::SessionId;

/// reqwest-backed range fetcher with connection pooling and timeouts.
#[derive(Debug, Clone)]
pub struct HttpRangeFetcher {
    client: Client,
}

impl HttpRangeFetcher {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            client: Self::build_client(request_timeout, connect_timeout),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.request_timeout, config.connect_timeout)
    }

    pub fn build_client(request_timeout: Duration, connect_timeout: Duration) -> Client {
        Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(4)
            // Content-Range describes the identity encoding; compression would skew it.
            .no_gzip()
            .build()
            .expect("Failed to build HTTP client")
    }

    fn transport(url: &Url, e: reqwest::Error) -> FetchError {
        FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
            timeout: e.is_timeout(),
        }
    }
}

impl Default for HttpRangeFetcher {
    fn default() -> Self {
        Self::from_config(&LoaderConfig::default())
    }
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    async fn fetch_range(
        &self,
        url: &Url,
        session_id: &SessionId,
        range: Option<ByteRange>,
    ) -> Result<PartialResponse, FetchError> {
        let mut req = self
            .client
            .get(url.clone())
            .header(SESSION_HEADER, session_id.as_str());
        if let Some(r) = range {
            req = req.header(RANGE, r.to_header_value());
        }

        let response = req.send().await.map_err(|e| {
            warn!(%url, error = %e, "Range fetch transport error");
            Self::transport(url, e)
        })?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            warn!(%url, status = status.as_u16(), "Server answered range request without 206");
            return Err(FetchError::UnsupportedRange {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let header = response
            .headers()
            .get(CONTENT_RANGE)
            .ok_or_else(|| FetchError::MalformedRange {
                url: url.to_string(),
                reason: "missing Content-Range header".to_string(),
            })?
            .to_str()
            .map_err(|e| FetchError::MalformedRange {
                url: url.to_string(),
                reason: format!("non-ASCII Content-Range header: {e}"),
            })?
            .to_string();
        let content_range = ContentRange::parse(&header).map_err(|reason| {
            FetchError::MalformedRange {
                url: url.to_string(),
                reason,
            }
        })?;

        let bytes = response.bytes().await.map_err(|e| Self::transport(url, e))?;
        validate_partial(url.as_str(), range, content_range, bytes.len() as u64)?;

        debug!(
            %url,
            start = content_range.start,
            end = content_range.end,
            total = content_range.total,
            "Range fetched"
        );
        Ok(PartialResponse {
            bytes,
            content_range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpRangeFetcher {
        HttpRangeFetcher::new(Duration::from_secs(5), Duration::from_secs(1))
    }

    fn media_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/video.mp4", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_bytes_and_total_on_206() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .and(header("Range", "bytes=0-3"))
            .and(header("X-Session-ID", "session_abc123def"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-3/5000000")
                    .set_body_bytes(vec![1u8, 2, 3, 4]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resp = fetcher()
            .fetch_range(
                &media_url(&server),
                &SessionId::from("session_abc123def"),
                Some(ByteRange::new(0, 3)),
            )
            .await
            .unwrap();
        assert_eq!(&resp.bytes[..], &[1, 2, 3, 4]);
        assert_eq!(resp.total_bytes(), 5_000_000);
    }

    #[tokio::test]
    async fn fetch_rejects_full_content_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_range(
                &media_url(&server),
                &SessionId::from("s"),
                Some(ByteRange::new(0, 65535)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnsupportedRange");
        assert_eq!(err.status_code(), Some(200));
    }

    #[tokio::test]
    async fn fetch_without_range_omits_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4]))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_range(&media_url(&server), &SessionId::from("s"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedRange { status: 200, .. }));

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("range").is_none());
        assert_eq!(
            received[0].headers.get("x-session-id").unwrap().to_str().unwrap(),
            "s"
        );
    }

    #[tokio::test]
    async fn fetch_reports_missing_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![0u8; 4]))
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_range(&media_url(&server), &SessionId::from("s"), Some(ByteRange::new(0, 3)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MalformedRange");
    }

    #[tokio::test]
    async fn fetch_reports_unparsable_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-3/*")
                    .set_body_bytes(vec![0u8; 4]),
            )
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_range(&media_url(&server), &SessionId::from("s"), Some(ByteRange::new(0, 3)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedRange { .. }));
    }

    #[tokio::test]
    async fn fetch_reports_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-9/100")
                    .set_body_bytes(vec![0u8; 4]),
            )
            .mount(&server)
            .await;

        let err = fetcher()
            .fetch_range(&media_url(&server), &SessionId::from("s"), Some(ByteRange::new(0, 9)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "MalformedRange");
    }

    #[tokio::test]
    async fn fetch_maps_connection_failure_to_transport() {
        let server = MockServer::start().await;
        let url = media_url(&server);
        drop(server);

        let err = fetcher()
            .fetch_range(&url, &SessionId::from("s"), Some(ByteRange::new(0, 9)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TransportError");
    }

    #[tokio::test]
    async fn fetch_maps_slow_response_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-0/1")
                    .set_body_bytes(vec![0u8])
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpRangeFetcher::new(Duration::from_millis(50), Duration::from_secs(1));
        let err = fetcher
            .fetch_range(&media_url(&server), &SessionId::from("s"), Some(ByteRange::new(0, 0)))
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }
}
