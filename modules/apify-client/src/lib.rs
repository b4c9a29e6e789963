pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{
    RunData, TikTokAuthor, TikTokHashtag, TikTokMusicMeta, TikTokPost, TikTokProfileInput,
    TikTokVideoMeta,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// clockworks/tiktok-scraper, addressed by its `username~name` slug.
const TIKTOK_SCRAPER: &str = "clockworks~tiktok-scraper";

/// Each poll blocks server-side for up to 60s, so this caps a run at ~10 minutes.
const DEFAULT_MAX_POLLS: u32 = 10;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
    max_polls: u32,
}

impl ApifyClient {
    pub fn new(token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            token,
            base_url: BASE_URL.to_string(),
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    /// Start a TikTok profile scrape run. Returns immediately with run metadata.
    pub async fn start_tiktok_profile_scrape(&self, handle: &str, limit: u32) -> Result<RunData> {
        let input = TikTokProfileInput::latest(handle, limit);

        let url = format!("{}/acts/{}/runs", self.base_url, TIKTOK_SCRAPER);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient long-polling.
    ///
    /// A run still going after the last poll is aborted, so a retry never
    /// overlaps with it.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<RunData> {
        for poll in 0..self.max_polls {
            let url = format!("{}/actor-runs/{}?waitForFinish=60", self.base_url, run_id);
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(ApifyError::RunFailed(api_resp.data.status));
                }
                _ => {
                    tracing::debug!(
                        run_id,
                        poll,
                        status = %api_resp.data.status,
                        "Run still in progress"
                    );
                }
            }
        }

        tracing::warn!(run_id, polls = self.max_polls, "Gave up waiting for Apify run, aborting");
        if let Err(e) = self.abort_run(run_id).await {
            tracing::warn!(run_id, error = %e, "Failed to abort Apify run");
        }
        Err(ApifyError::RunFailed("TIMED-OUT".to_string()))
    }

    /// Ask Apify to stop a run that is still in progress.
    pub async fn abort_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{}/actor-runs/{}/abort", self.base_url, run_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::parse(resp).await?;
        Ok(api_resp.data)
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<T>> {
        let url = format!(
            "{}/datasets/{}/items?format=json&clean=true",
            self.base_url, dataset_id
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse(resp).await
    }

    /// Scrape a TikTok profile's latest videos end-to-end: start run, poll, fetch results.
    ///
    /// A profile the actor could not resolve comes back as error rows only;
    /// that is reported as [`ApifyError::NotFound`].
    pub async fn scrape_tiktok_posts(&self, handle: &str, limit: u32) -> Result<Vec<TikTokPost>> {
        tracing::info!(handle, limit, "Starting TikTok profile scrape");

        let run = self.start_tiktok_profile_scrape(handle, limit).await?;
        tracing::info!(run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        let rows: Vec<TikTokPost> = self
            .get_dataset_items(&completed.default_dataset_id)
            .await?;

        let (errors, posts): (Vec<_>, Vec<_>) = rows.into_iter().partition(|p| p.is_error_row());
        if posts.is_empty() && !errors.is_empty() {
            return Err(ApifyError::NotFound(handle.to_string()));
        }

        tracing::info!(handle, count = posts.len(), "Fetched TikTok posts");
        Ok(posts)
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves every request with a run in `status` and records request lines.
    async fn run_status_server(status: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head);
                let request_line = head.lines().next().unwrap_or_default().to_string();
                seen.lock().unwrap().push(request_line);

                let body = serde_json::json!({
                    "data": {"id": "run-1", "status": status, "defaultDatasetId": "ds-1"}
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (format!("http://{addr}"), requests)
    }

    #[tokio::test]
    async fn run_left_running_after_last_poll_is_aborted() {
        let (base_url, requests) = run_status_server("RUNNING").await;
        let client = ApifyClient::new("apify_api_test".to_string())
            .unwrap()
            .with_base_url(&base_url)
            .with_max_polls(2);

        let err = client.wait_for_run("run-1").await.unwrap_err();

        assert!(matches!(&err, ApifyError::RunFailed(s) if s == "TIMED-OUT"));
        assert!(err.is_transient());
        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(requests[..2]
            .iter()
            .all(|r| r.starts_with("GET /actor-runs/run-1?waitForFinish=60")));
        assert!(requests[2].starts_with("POST /actor-runs/run-1/abort"));
    }

    #[tokio::test]
    async fn finished_run_is_not_aborted() {
        let (base_url, requests) = run_status_server("SUCCEEDED").await;
        let client = ApifyClient::new("apify_api_test".to_string())
            .unwrap()
            .with_base_url(&base_url);

        let run = client.wait_for_run("run-1").await.unwrap();

        assert_eq!(run.default_dataset_id, "ds-1");
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transient_network_error() {
        let client = ApifyClient::new("apify_api_test".to_string())
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = client.scrape_tiktok_posts("someone", 5).await.unwrap_err();
        assert!(matches!(err, ApifyError::Network { .. }));
        assert!(err.is_transient());
    }
}
