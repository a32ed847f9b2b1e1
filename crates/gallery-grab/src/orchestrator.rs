//! Session orchestration: launch, navigate, extract, fetch, teardown.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::bounded::bound;
use crate::config::{resolve_save_dir, GrabConfig};
use crate::fetcher::fetch_all;
use crate::renderer::{RenderContext, Renderer};
use crate::resolver::{resolve_with, SelectorStrategy, DEFAULT_STRATEGIES};
use crate::storage::ImageWriter;
use crate::types::{DownloadManifest, GrabError, GrabResult, SearchRequest};

/// Build the gallery search URL for a request.
///
/// The query becomes a single percent-encoded path segment under
/// `/s/photos/`; orientation and license go into the query string.
pub fn search_url(base_url: &str, request: &SearchRequest) -> GrabResult<String> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| GrabError::Validation(format!("invalid gallery base URL '{base_url}': {e}")))?;

    url.path_segments_mut()
        .map_err(|_| GrabError::Validation(format!("gallery base URL '{base_url}' cannot be a base")))?
        .pop_if_empty()
        .extend(["s", "photos", request.query()]);

    url.query_pairs_mut()
        .append_pair("orientation", request.orientation().as_str())
        .append_pair("license", request.license_type().as_str());

    Ok(url.into())
}

/// Downloads gallery search results through a [`Renderer`].
pub struct Downloader<'a> {
    renderer: &'a dyn Renderer,
    config: GrabConfig,
    strategies: &'a [SelectorStrategy],
}

impl<'a> Downloader<'a> {
    pub fn new(renderer: &'a dyn Renderer, config: GrabConfig) -> Self {
        Self {
            renderer,
            config,
            strategies: DEFAULT_STRATEGIES,
        }
    }

    /// Replace the selector fallback chain.
    pub fn with_strategies(mut self, strategies: &'a [SelectorStrategy]) -> Self {
        self.strategies = strategies;
        self
    }

    /// Run one download.
    ///
    /// The browsing session is closed exactly once on every path out of
    /// this function once it has been launched.
    pub async fn download(&self, request: &SearchRequest) -> GrabResult<DownloadManifest> {
        let save_dir = prepare_save_dir(request).await?;
        let url = search_url(&self.config.base_url, request)?;

        tracing::info!(
            query = request.query(),
            count = request.count(),
            orientation = %request.orientation(),
            license = %request.license_type(),
            save_dir = %save_dir.display(),
            "starting download"
        );

        let mut session = self
            .renderer
            .launch(&self.config)
            .await
            .map_err(|e| GrabError::Launch(format!("{e:#}")))?;

        let result = self
            .run_session(session.as_mut(), request, &url, save_dir)
            .await;

        if let Err(e) = session.close().await {
            tracing::warn!("browser teardown failed: {e:#}");
        }

        match &result {
            Ok(manifest) => tracing::info!(
                requested = manifest.requested_count,
                saved = manifest.actual_count,
                "download finished"
            ),
            Err(e) => tracing::warn!("download failed: {e}"),
        }

        result
    }

    async fn run_session(
        &self,
        session: &mut dyn RenderContext,
        request: &SearchRequest,
        url: &str,
        save_dir: PathBuf,
    ) -> GrabResult<DownloadManifest> {
        let nav = session
            .navigate(url, self.config.navigation_timeout_ms)
            .await
            .map_err(|e| GrabError::Navigation(format!("{url}: {e:#}")))?;
        tracing::debug!(final_url = %nav.final_url, load_time_ms = nav.load_time_ms, "page loaded");

        if self.config.settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;
        }

        let started = Instant::now();
        let page: &dyn RenderContext = &*session;

        let candidates = resolve_with(page, self.strategies).await?;
        let work = bound(candidates, request.count());

        let writer = ImageWriter::new(&save_dir, self.config.collision_policy);
        let outcomes = fetch_all(
            page,
            &work,
            request.query(),
            &writer,
            Duration::from_millis(self.config.fetch_timeout_ms),
        )
        .await;

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extraction and fetch complete"
        );

        Ok(DownloadManifest::from_outcomes(request, save_dir, outcomes))
    }
}

/// Make the save directory absolute and ensure it exists.
async fn prepare_save_dir(request: &SearchRequest) -> GrabResult<PathBuf> {
    let dir = resolve_save_dir(request.save_dir()).map_err(|source| GrabError::SaveDir {
        path: request.save_dir().to_path_buf(),
        source,
    })?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| GrabError::SaveDir {
            path: dir.clone(),
            source,
        })?;
    Ok(dir)
}

/// The primary operation: validate, download, and summarise as text.
///
/// Empty `save_dir`, `orientation` and `license_type` fall back to their
/// defaults. Never fails: errors come back as `Error occurred: ...`.
pub async fn download_images(
    renderer: &dyn Renderer,
    config: GrabConfig,
    query: &str,
    count: i64,
    save_dir: &str,
    orientation: &str,
    license_type: &str,
) -> String {
    let request = SearchRequest::builder(query)
        .count(count)
        .save_dir(save_dir)
        .orientation(orientation)
        .license_type(license_type)
        .build();

    let result = match request {
        Ok(request) => Downloader::new(renderer, config).download(&request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(manifest) => manifest.summary(),
        Err(e) => format!("Error occurred: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(query: &str) -> SearchRequest {
        SearchRequest::builder(query)
            .orientation("portrait")
            .license_type("plus")
            .build()
            .unwrap()
    }

    #[test]
    fn test_search_url_shape() {
        let url = search_url("https://unsplash.com", &request("cats")).unwrap();
        assert_eq!(
            url,
            "https://unsplash.com/s/photos/cats?orientation=portrait&license=plus"
        );
    }

    #[test]
    fn test_search_url_defaults() {
        let req = SearchRequest::builder("cats").build().unwrap();
        let url = search_url("https://unsplash.com/", &req).unwrap();
        assert_eq!(
            url,
            "https://unsplash.com/s/photos/cats?orientation=landscape&license=free"
        );
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("http://127.0.0.1:9000", &request("red cars/trucks")).unwrap();
        assert!(url.starts_with("http://127.0.0.1:9000/s/photos/red%20cars%2Ftrucks?"));
    }

    #[tokio::test]
    async fn test_prepare_save_dir_creates_nested_dir() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("a").join("..").join("b").join("c");
        let req = SearchRequest::builder("cats")
            .save_dir(target.to_str().unwrap())
            .build()
            .unwrap();

        let dir = prepare_save_dir(&req).await.unwrap();
        assert_eq!(dir, root.path().join("b").join("c"));
        assert!(dir.is_dir());

        // Second call on an existing directory is fine.
        assert_eq!(prepare_save_dir(&req).await.unwrap(), dir);
    }

    #[test]
    fn test_search_url_rejects_bad_base() {
        assert!(matches!(
            search_url("not a url", &request("cats")),
            Err(GrabError::Validation(_))
        ));
    }
}
