//! Browser capability abstraction.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). The pipeline
//! only ever talks to these traits, so tests can swap in a fake page.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GrabConfig;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Response to a resource request issued from inside the page.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A browser engine that can launch a browsing session.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Launch a browser and open the single page context used for one run.
    async fn launch(&self, config: &GrabConfig) -> Result<Box<dyn RenderContext>>;
}

/// A single browsing session: one page, one navigation context.
///
/// `execute_js` and `request` take `&self` so concurrent fetches can share
/// the page; only navigation needs exclusive access.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait for the load event, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Fetch a resource with the page's own network stack and cookies.
    async fn request(&self, url: &str) -> Result<FetchResponse>;
    /// Close the page and shut the browser down.
    async fn close(self: Box<Self>) -> Result<()>;
}
