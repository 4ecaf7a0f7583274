use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::RawRecord;
use super::{Fetcher, RecordExtractor};
use crate::config::ShiftSyncConfig;
use crate::error::FetchError;
use crate::state_machine::RetryConfig;

/// HTTP implementation of [`Fetcher`].
///
/// Rate limiting is not done here; callers acquire a slot from the shared
/// limiter before each call. Transient failures (429, 5xx, connection
/// errors) are retried with exponential backoff.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    extractor: Arc<dyn RecordExtractor>,
    retry: RetryConfig,
    /// Ceiling applied to server-supplied `Retry-After` delays.
    max_retry_after: Duration,
}

impl HttpFetcher {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        extractor: Arc<dyn RecordExtractor>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extractor,
            retry: RetryConfig::default(),
            max_retry_after: timeout,
        })
    }

    /// Builds a fetcher for `config.base_url` with the configured timeout and
    /// retry policy.
    pub fn from_config(
        config: &ShiftSyncConfig,
        extractor: Arc<dyn RecordExtractor>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(config.base_url.clone(), config.request_timeout(), extractor)?
            .with_retry(config.fetch_retry_config())
            .with_max_retry_after(config.max_retry_after()))
    }

    pub fn with_max_retry_after(mut self, ceiling: Duration) -> Self {
        self.max_retry_after = ceiling;
        self
    }

    /// Delay requested by a `Retry-After` header, in milliseconds, capped at
    /// the configured ceiling.
    fn retry_after_ms(&self, header: Option<&str>) -> Option<u64> {
        let secs = header?.trim().parse::<u64>().ok()?;
        let ceiling = u64::try_from(self.max_retry_after.as_millis()).unwrap_or(u64::MAX);
        Some(secs.saturating_mul(1000).min(ceiling))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url_for(&self, address: &str) -> String {
        if address.starts_with('/') {
            format!("{}{}", self.base_url, address)
        } else {
            format!("{}/{}", self.base_url, address)
        }
    }

    async fn get_body(&self, cancel: &CancellationToken, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                sent = self.client.get(url).send() => sent,
            };

            let (retry_status, retry_after) = match sent {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|e| FetchError::Network {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                    if !is_transient(status) {
                        return Err(FetchError::Http {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    let retry_after = self.retry_after_ms(
                        response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok()),
                    );
                    (status.as_u16(), retry_after)
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if attempt > self.retry.max_retries {
                        return Err(FetchError::Network {
                            url: url.to_string(),
                            message: e.to_string(),
                        });
                    }
                    (0, None)
                }
                Err(e) => {
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            };

            if attempt > self.retry.max_retries {
                return Err(FetchError::Retry {
                    url: url.to_string(),
                    attempts: attempt,
                    last_status: retry_status,
                });
            }

            let delay = retry_after.unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
            warn!(url, attempt, status = retry_status, delay_ms = delay, "transient upstream failure, retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
            }
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_and_extract(
        &self,
        cancel: &CancellationToken,
        address: &str,
    ) -> Result<Vec<RawRecord>, FetchError> {
        let url = self.url_for(address);
        let body = self.get_body(cancel, &url).await?;
        let records = self
            .extractor
            .extract(&body)
            .map_err(|message| FetchError::Parse {
                url: url.clone(),
                message,
            })?;
        debug!(url, records = records.len(), "extracted unit");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Reads one `date,shift_type,person` row per line.
    struct CsvLines;

    impl RecordExtractor for CsvLines {
        fn extract(&self, body: &str) -> Result<Vec<RawRecord>, String> {
            if body.trim() == "garbage" {
                return Err("no schedule table found".into());
            }
            body.lines()
                .filter(|l| !l.trim().is_empty())
                .enumerate()
                .map(|(i, line)| {
                    let cols: Vec<&str> = line.split(',').collect();
                    if cols.len() < 3 {
                        return Err(format!("row {i}: expected 3 columns"));
                    }
                    let mut record = RawRecord::new(cols[0], cols[1]).with_person(cols[2]);
                    record.row_index = i;
                    Ok(record)
                })
                .collect()
        }
    }

    fn fetcher(server: &MockServer) -> HttpFetcher {
        HttpFetcher::new(server.uri(), Duration::from_secs(5), Arc::new(CsvLines))
            .unwrap()
            .with_retry(RetryConfig {
                max_retries: 2,
                base_delay_ms: 1,
            })
    }

    #[test]
    fn from_config_uses_configured_policy() {
        let config = ShiftSyncConfig {
            base_url: "https://schedules.example.com/".into(),
            max_fetch_retries: 7,
            ..ShiftSyncConfig::default()
        };
        let fetcher = HttpFetcher::from_config(&config, Arc::new(CsvLines)).unwrap();
        assert_eq!(fetcher.retry.max_retries, 7);
        assert_eq!(fetcher.max_retry_after, config.max_retry_after());
        assert_eq!(
            fetcher.url_for("/schedule/2025-11"),
            "https://schedules.example.com/schedule/2025-11"
        );
    }

    #[tokio::test]
    async fn fetches_and_extracts_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedule/2025-11"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "2025-11-03,Technologist,A. Smith\n2025-11-04,Radiologist,B. Jones\n",
            ))
            .mount(&server)
            .await;

        let records = fetcher(&server)
            .fetch_and_extract(&CancellationToken::new(), "/schedule/2025-11")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].person, "B. Jones");
        assert_eq!(records[1].row_index, 1);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(&server)
            .fetch_and_extract(&CancellationToken::new(), "/schedule/2030-01")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(&server)
            .fetch_and_extract(&CancellationToken::new(), "schedule/2025-11")
            .await
            .unwrap_err();
        match err {
            FetchError::Retry {
                attempts,
                last_status,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_status, 503);
            }
            other => panic!("expected retry error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limited_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2025-11-01,Nurse,C. Diaz"))
            .mount(&server)
            .await;

        let records = fetcher(&server)
            .fetch_and_extract(&CancellationToken::new(), "/schedule/2025-11")
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn retry_after_is_capped() {
        let fetcher = HttpFetcher::new("http://localhost", Duration::from_secs(5), Arc::new(CsvLines))
            .unwrap()
            .with_max_retry_after(Duration::from_secs(2));
        assert_eq!(fetcher.retry_after_ms(Some("1")), Some(1000));
        assert_eq!(fetcher.retry_after_ms(Some("86400")), Some(2000));
        assert_eq!(fetcher.retry_after_ms(Some("18446744073709552")), Some(2000));
        assert_eq!(fetcher.retry_after_ms(Some("soon")), None);
        assert_eq!(fetcher.retry_after_ms(None), None);
    }

    #[tokio::test]
    async fn oversized_retry_after_does_not_stall() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "18446744073709552"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2025-11-01,Nurse,C. Diaz"))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server).with_max_retry_after(Duration::from_millis(10));
        let records = tokio::time::timeout(
            Duration::from_secs(3),
            fetcher.fetch_and_extract(&CancellationToken::new(), "/schedule/2025-11"),
        )
        .await
        .expect("fetch should not sleep past the ceiling")
        .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn extractor_failure_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("garbage"))
            .mount(&server)
            .await;

        let err = fetcher(&server)
            .fetch_and_extract(&CancellationToken::new(), "/schedule/2025-11")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { ref message, .. } if message.contains("no schedule table")));
    }

    #[tokio::test]
    async fn cancelled_before_request() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher(&server)
            .fetch_and_extract(&cancel, "/schedule/2025-11")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
    }
}
