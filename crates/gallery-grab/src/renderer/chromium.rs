//! Chromium-based renderer using chromiumoxide.

use super::{FetchResponse, NavigationResult, RenderContext, Renderer};
use crate::config::GrabConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::io as cdp_io;
use chromiumoxide::cdp::browser_protocol::io::{ReadParams, ReadReturns, StreamHandle};
use chromiumoxide::cdp::browser_protocol::network::{
    LoadNetworkResourceOptions, LoadNetworkResourcePageResult, LoadNetworkResourceParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. GALLERY_GRAB_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("GALLERY_GRAB_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.gallery-grab/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".gallery-grab/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".gallery-grab/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".gallery-grab/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".gallery-grab/chromium/chrome-linux64/chrome"),
                home.join(".gallery-grab/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches a fresh Chromium process per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumRenderer;

impl ChromiumRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self, config: &GrabConfig) -> Result<Box<dyn RenderContext>> {
        let chrome_path = match &config.chromium_path {
            Some(path) => path.clone(),
            None => find_chromium().context(
                "Chromium not found. Install Chrome or set GALLERY_GRAB_CHROMIUM_PATH.",
            )?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Default::default()
            })
            .arg(format!("--user-agent={}", config.user_agent))
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");

        builder = if config.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch Chromium")?;

        // The handler must be polled for the CDP connection to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(anyhow::Error::new(e).context("failed to create new page"));
            }
        };

        tracing::debug!(headless = config.headless, "Chromium session launched");

        Ok(Box::new(ChromiumContext {
            browser,
            page,
            handler,
        }))
    }
}

/// One Chromium process with its single page.
pub struct ChromiumContext {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// Bytes requested per `IO.read` call.
const READ_CHUNK: i64 = 256 * 1024;

/// HTTP status of a loaded resource, or an error when the request never got
/// a response.
fn resource_status(resource: &LoadNetworkResourcePageResult) -> Result<u16> {
    match resource.http_status_code {
        Some(code) => Ok(code as u16),
        None => bail!(
            "request failed: {}",
            resource
                .net_error_name
                .as_deref()
                .unwrap_or("no response")
        ),
    }
}

/// Raw bytes of one `IO.read` chunk.
fn decode_chunk(chunk: &ReadReturns) -> Result<Vec<u8>> {
    if chunk.base64_encoded.unwrap_or(false) {
        base64::engine::general_purpose::STANDARD
            .decode(&chunk.data)
            .context("stream chunk was not valid base64")
    } else {
        Ok(chunk.data.as_bytes().to_vec())
    }
}

async fn read_stream(page: &Page, handle: &StreamHandle) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let chunk = page
            .execute(ReadParams {
                handle: handle.clone(),
                offset: None,
                size: Some(READ_CHUNK),
            })
            .await
            .context("failed to read response stream")?
            .result;
        body.extend(decode_chunk(&chunk)?);
        if chunk.eof {
            return Ok(body);
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let page = &self.page;

        let load = async move {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), load).await {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Loads `url` through the browser's network stack for the page's main
    /// frame, so the session's cookies apply and page CORS/CSP rules do not.
    async fn request(&self, url: &str) -> Result<FetchResponse> {
        let frame_id = self
            .page
            .mainframe()
            .await
            .context("failed to resolve main frame")?;

        let resource = self
            .page
            .execute(LoadNetworkResourceParams {
                frame_id,
                url: url.to_string(),
                options: LoadNetworkResourceOptions::new(false, true),
            })
            .await
            .context("network resource load failed")?
            .result
            .resource;

        let status = resource_status(&resource);
        let Some(handle) = resource.stream else {
            return Ok(FetchResponse {
                status: status?,
                body: Vec::new(),
            });
        };

        let body = match &status {
            Ok(code) if (200..300).contains(code) => read_stream(&self.page, &handle).await,
            _ => Ok(Vec::new()),
        };
        if let Err(e) = self.page.execute(cdp_io::CloseParams::new(handle)).await {
            tracing::debug!("stream close failed: {e}");
        }

        Ok(FetchResponse {
            status: status?,
            body: body?,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumContext {
            mut browser,
            page,
            handler,
        } = *self;

        if let Err(e) = page.close().await {
            tracing::debug!("page close failed: {e}");
        }
        let closed = browser.close().await.context("failed to close browser");
        let _ = browser.wait().await;
        handler.abort();

        closed.map(|_| ())
    }
}
