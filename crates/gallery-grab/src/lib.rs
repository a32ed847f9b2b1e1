//! gallery-grab: render a photo gallery search page, resolve image sources
//! from the live DOM, and download them concurrently to a local directory.

pub mod bounded;
pub mod config;
pub mod fetcher;
pub mod orchestrator;
pub mod renderer;
pub mod resolver;
pub mod storage;
pub mod types;

pub use config::{resolve_save_dir, CollisionPolicy, GrabConfig};
pub use orchestrator::{download_images, search_url, Downloader};
pub use renderer::chromium::{find_chromium, ChromiumRenderer};
pub use renderer::{FetchResponse, NavigationResult, RenderContext, Renderer};
pub use resolver::{resolve, SelectorStrategy, DEFAULT_STRATEGIES};
pub use storage::ImageWriter;
pub use types::*;
