use crate::outcome::{RequestOutcome, RequestTask, Status};
use anyhow::Result;
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub type OutcomeFuture<'a> = Pin<Box<dyn Future<Output = RequestOutcome> + Send + 'a>>;

/// Issues one request and turns whatever happens into a [`RequestOutcome`].
///
/// Implementations must not fail: transport errors are reported through
/// the sentinel statuses so a single bad request never stops a worker.
pub trait RequestExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn execute<'a>(&'a self, task: &'a RequestTask) -> OutcomeFuture<'a>;
}

/// Mock executor for testing (always answers with a fixed status after a fixed delay)
pub struct MockExecutor {
    delay: Duration,
    status: Status,
}

impl MockExecutor {
    pub fn new(delay_ms: u64) -> Self {
        Self::with_status(delay_ms, Status::Http(200))
    }

    pub fn with_status(delay_ms: u64, status: Status) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            status,
        }
    }
}

impl RequestExecutor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn execute<'a>(&'a self, _task: &'a RequestTask) -> OutcomeFuture<'a> {
        Box::pin(async move {
            let issued_at = Utc::now();
            let start = Instant::now();
            sleep(self.delay).await;
            RequestOutcome::new(issued_at, start.elapsed(), self.status)
        })
    }
}

/// GET executor backed by a shared reqwest client
pub struct HttpExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpExecutor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, timeout })
    }

    async fn fetch(&self, url: &str) -> Result<u16, reqwest::Error> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status().as_u16();
        // Latency covers the whole transfer, not just the headers.
        response.bytes().await?;
        Ok(status)
    }
}

impl RequestExecutor for HttpExecutor {
    fn name(&self) -> &'static str {
        "http"
    }

    fn execute<'a>(&'a self, task: &'a RequestTask) -> OutcomeFuture<'a> {
        Box::pin(async move {
            let issued_at = Utc::now();
            let start = Instant::now();
            let result = self.fetch(task.url()).await;
            let elapsed = start.elapsed();

            let status = match result {
                Ok(code) => Status::Http(code),
                Err(e) if e.is_timeout() => {
                    tracing::debug!("Request to {} timed out after {:?}", task.url(), elapsed);
                    Status::Timeout
                }
                Err(e) => {
                    tracing::debug!("Request to {} failed: {}", task.url(), e);
                    Status::ConnectionError
                }
            };

            RequestOutcome::new(issued_at, elapsed, status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(start_paused = true)]
    async fn test_mock_executor() {
        let executor = MockExecutor::new(50);
        let outcome = executor.execute(&RequestTask::new("mock://")).await;

        assert_eq!(outcome.status, Status::Http(200));
        assert!(outcome.latency_ms >= 50.0, "latency: {}", outcome.latency_ms);
    }

    #[tokio::test]
    async fn test_http_success_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64 * 1024)))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(Duration::from_secs(5)).unwrap();
        let task = RequestTask::new(format!("{}/login", server.uri()));
        let outcome = executor.execute(&task).await;

        assert_eq!(outcome.status, Status::Http(200));
        assert!(outcome.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_http_error_status_is_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(Duration::from_secs(5)).unwrap();
        let outcome = executor.execute(&RequestTask::new(server.uri())).await;

        assert_eq!(outcome.status, Status::Http(503));
        assert!(!outcome.status.is_success());
    }

    #[tokio::test]
    async fn test_http_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let executor = HttpExecutor::new(Duration::from_millis(100)).unwrap();
        let outcome = executor.execute(&RequestTask::new(server.uri())).await;

        assert_eq!(outcome.status, Status::Timeout);
        assert!(outcome.latency_ms >= 100.0, "latency: {}", outcome.latency_ms);
        assert!(outcome.latency_ms < 2000.0, "latency: {}", outcome.latency_ms);
    }

    #[tokio::test]
    async fn test_http_connection_refused() {
        // Bind then drop to get a local port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let executor = HttpExecutor::new(Duration::from_secs(2)).unwrap();
        let outcome = executor
            .execute(&RequestTask::new(format!("http://{}/", addr)))
            .await;

        assert_eq!(outcome.status, Status::ConnectionError);
        assert_eq!(outcome.status.code(), 999);
        assert!(outcome.latency_ms >= 0.0);
    }
}
