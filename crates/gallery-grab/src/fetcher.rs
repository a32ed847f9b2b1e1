//! Concurrent retrieval of candidate images.
//!
//! Every candidate gets its own future. Each future contains its own
//! failures and resolves to a [`FetchOutcome`], so the join over all of them
//! cannot fail and one bad candidate never cancels its siblings.

use std::time::Duration;

use futures::future::join_all;

use crate::renderer::RenderContext;
use crate::storage::ImageWriter;
use crate::types::{CandidateImage, FetchOutcome, GrabError, GrabResult};

/// Fetch and persist all candidates concurrently.
///
/// Returns one outcome per candidate in input order, whatever order the
/// underlying requests complete in.
pub async fn fetch_all(
    page: &dyn RenderContext,
    candidates: &[CandidateImage],
    query: &str,
    writer: &ImageWriter,
    timeout: Duration,
) -> Vec<FetchOutcome> {
    let tasks = candidates
        .iter()
        .enumerate()
        .map(|(ordinal, candidate)| {
            fetch_one(page, candidate.clone(), ordinal, query, writer, timeout)
        });

    let outcomes = join_all(tasks).await;

    let saved = outcomes.iter().filter(|o| o.is_success()).count();
    tracing::debug!(
        attempted = outcomes.len(),
        saved,
        failed = outcomes.len() - saved,
        "fetch phase settled"
    );

    outcomes
}

async fn fetch_one(
    page: &dyn RenderContext,
    candidate: CandidateImage,
    ordinal: usize,
    query: &str,
    writer: &ImageWriter,
    timeout: Duration,
) -> FetchOutcome {
    let bytes = match retrieve(page, &candidate.source_url, timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(url = %candidate.source_url, "{e}");
            return FetchOutcome::failure(candidate, &e);
        }
    };

    match writer.write(query, ordinal, &bytes).await {
        Ok(path) => {
            tracing::debug!(
                url = %candidate.source_url,
                path = %path.display(),
                bytes = bytes.len(),
                "saved image"
            );
            FetchOutcome::success(candidate, bytes, path)
        }
        Err(e) => {
            tracing::warn!(url = %candidate.source_url, "{e}");
            FetchOutcome::failure(candidate, &e)
        }
    }
}

/// Single attempt: non-2xx, transport error, and timeout are all failures.
async fn retrieve(page: &dyn RenderContext, url: &str, timeout: Duration) -> GrabResult<Vec<u8>> {
    let fail = |reason: String| GrabError::Fetch {
        url: url.to_string(),
        reason,
    };

    let response = tokio::time::timeout(timeout, page.request(url))
        .await
        .map_err(|_| fail(format!("timed out after {}ms", timeout.as_millis())))?
        .map_err(|e| fail(format!("{e:#}")))?;

    if !response.is_success() {
        return Err(fail(format!("HTTP {}", response.status)));
    }

    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionPolicy;
    use crate::renderer::{FetchResponse, NavigationResult};
    use crate::types::FetchStatus;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Serves `photo-N` after N*10ms, 404s anything containing "missing",
    /// and never answers anything containing "hang".
    struct SlowPage;

    #[async_trait]
    impl RenderContext for SlowPage {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }

        async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        async fn request(&self, url: &str) -> Result<FetchResponse> {
            if url.contains("hang") {
                std::future::pending::<()>().await;
            }
            if url.contains("missing") {
                return Ok(FetchResponse {
                    status: 404,
                    body: Vec::new(),
                });
            }
            let n: u64 = url.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(n * 10)).await;
            Ok(FetchResponse {
                status: 200,
                body: url.as_bytes().to_vec(),
            })
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    /// Every request blocks until all `n` requests are in flight at once.
    struct GatedPage {
        gate: tokio::sync::Barrier,
    }

    impl GatedPage {
        fn new(n: usize) -> Self {
            Self {
                gate: tokio::sync::Barrier::new(n),
            }
        }
    }

    #[async_trait]
    impl RenderContext for GatedPage {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }

        async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        async fn request(&self, url: &str) -> Result<FetchResponse> {
            self.gate.wait().await;
            Ok(FetchResponse {
                status: 200,
                body: url.as_bytes().to_vec(),
            })
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn candidates(urls: &[&str]) -> Vec<CandidateImage> {
        urls.iter()
            .enumerate()
            .map(|(i, u)| CandidateImage {
                source_url: u.to_string(),
                ordinal_rank: i,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_outcomes_follow_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path(), CollisionPolicy::Overwrite);
        // Later candidates finish first.
        let list = candidates(&[
            "https://img.example/photo-5",
            "https://img.example/photo-3",
            "https://img.example/photo-1",
        ]);

        let outcomes =
            fetch_all(&SlowPage, &list, "dogs", &writer, Duration::from_secs(5)).await;

        assert_eq!(outcomes.len(), 3);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.candidate, list[i]);
            assert_eq!(
                outcome.saved_path.as_deref(),
                Some(dir.path().join(format!("dogs_{}.jpg", i + 1)).as_path())
            );
            assert_eq!(outcome.payload.as_deref(), Some(list[i].source_url.as_bytes()));
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path(), CollisionPolicy::Overwrite);
        let list = candidates(&[
            "https://img.example/photo-1",
            "https://img.example/missing-2",
            "https://img.example/hang-3",
            "https://img.example/photo-4",
        ]);

        let outcomes =
            fetch_all(&SlowPage, &list, "dogs", &writer, Duration::from_millis(200)).await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            &outcomes[1].status,
            FetchStatus::Failure { reason } if reason.contains("HTTP 404")
        ));
        assert!(matches!(
            &outcomes[2].status,
            FetchStatus::Failure { reason } if reason.contains("timed out")
        ));
        assert!(outcomes[3].is_success());
        assert!(outcomes[1].saved_path.is_none());
        assert!(!dir.path().join("dogs_2.jpg").exists());
        assert!(dir.path().join("dogs_4.jpg").exists());
    }

    #[tokio::test]
    async fn test_requests_are_all_in_flight_together() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path(), CollisionPolicy::Overwrite);
        let list = candidates(&[
            "https://img.example/photo-1",
            "https://img.example/photo-2",
            "https://img.example/photo-3",
            "https://img.example/photo-4",
        ]);
        let page = GatedPage::new(list.len());

        // One at a time, the first request would wait on the gate until it timed out.
        let outcomes =
            fetch_all(&page, &list, "dogs", &writer, Duration::from_millis(500)).await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.is_success()));
    }

    #[tokio::test]
    async fn test_write_failure_becomes_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path().join("gone"), CollisionPolicy::Overwrite);
        let list = candidates(&["https://img.example/photo-1"]);

        let outcomes =
            fetch_all(&SlowPage, &list, "dogs", &writer, Duration::from_secs(5)).await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[0].payload.is_none());
    }
}
