//! Resolve image source URLs from a rendered gallery page.
//!
//! Gallery markup is third-party and drifts, so extraction walks an ordered
//! list of selector strategies and commits to the first one that yields
//! anything after filtering. Results from different strategies are never
//! merged.

use crate::renderer::RenderContext;
use crate::types::{CandidateImage, GrabError, GrabResult};

/// Substrings marking profile pictures and avatars rather than content.
pub const NON_CONTENT_MARKERS: &[&str] = &["profile", "avatar"];

/// One way of locating image elements in the DOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorStrategy {
    pub name: &'static str,
    pub selector: &'static str,
}

/// Strategies in priority order, most specific first.
pub const DEFAULT_STRATEGIES: &[SelectorStrategy] = &[
    SelectorStrategy {
        name: "masonry-grid",
        selector: r#"img[data-test="photo-grid-masonry-img"]"#,
    },
    SelectorStrategy {
        name: "photo-url",
        selector: r#"img[src*="images.unsplash.com/photo-"]"#,
    },
    SelectorStrategy {
        name: "figure",
        selector: "figure img",
    },
];

impl SelectorStrategy {
    /// Script returning the `src` of every match in document order.
    pub fn script(&self) -> String {
        // serde_json produces a valid JS string literal.
        let selector = serde_json::to_string(self.selector).unwrap_or_default();
        format!(
            "Array.from(document.querySelectorAll({selector})).map(img => img.currentSrc || img.src).filter(Boolean)"
        )
    }

    /// Run this strategy against the page and return filtered candidates.
    pub async fn try_extract(&self, page: &dyn RenderContext) -> GrabResult<Vec<CandidateImage>> {
        let value = page
            .execute_js(&self.script())
            .await
            .map_err(|e| GrabError::Extraction(format!("strategy '{}': {e:#}", self.name)))?;

        let raw: Vec<String> = match value {
            serde_json::Value::Null => Vec::new(),
            other => serde_json::from_value(other).map_err(|e| {
                GrabError::Extraction(format!(
                    "strategy '{}' returned unexpected value: {e}",
                    self.name
                ))
            })?,
        };

        Ok(filter_sources(raw))
    }
}

/// Drop non-content and non-absolute URLs, then rank in document order.
pub fn filter_sources(sources: impl IntoIterator<Item = String>) -> Vec<CandidateImage> {
    sources
        .into_iter()
        .filter(|src| is_content_url(src))
        .enumerate()
        .map(|(ordinal_rank, source_url)| CandidateImage {
            source_url,
            ordinal_rank,
        })
        .collect()
}

/// True for absolute http(s) URLs carrying none of the [`NON_CONTENT_MARKERS`].
pub fn is_content_url(src: &str) -> bool {
    let absolute = match url::Url::parse(src) {
        Ok(u) => matches!(u.scheme(), "http" | "https"),
        Err(_) => false,
    };
    absolute && !NON_CONTENT_MARKERS.iter().any(|m| src.contains(m))
}

/// Resolve candidates with the given strategies.
///
/// An empty result means no strategy matched anything usable; callers treat
/// that as a valid, empty outcome.
pub async fn resolve_with(
    page: &dyn RenderContext,
    strategies: &[SelectorStrategy],
) -> GrabResult<Vec<CandidateImage>> {
    for strategy in strategies {
        let candidates = strategy.try_extract(page).await?;
        if candidates.is_empty() {
            tracing::debug!(strategy = strategy.name, "selector strategy yielded nothing");
            continue;
        }
        tracing::info!(
            strategy = strategy.name,
            count = candidates.len(),
            "resolved image candidates"
        );
        return Ok(candidates);
    }

    tracing::info!("no selector strategy matched any content images");
    Ok(Vec::new())
}

/// Resolve candidates with [`DEFAULT_STRATEGIES`].
pub async fn resolve(page: &dyn RenderContext) -> GrabResult<Vec<CandidateImage>> {
    resolve_with(page, DEFAULT_STRATEGIES).await
}
