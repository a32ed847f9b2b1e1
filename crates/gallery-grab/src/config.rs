//! Runtime configuration and path resolution.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{GrabError, DEFAULT_SAVE_DIR};

/// Gallery host searched by default.
pub const DEFAULT_BASE_URL: &str = "https://unsplash.com";

/// Desktop Chrome user agent presented by the browsing context.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/122.0.0.0 Safari/537.36";

const ENV_PREFIX: &str = "GALLERY_GRAB_";

/// What to do when a destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Keep the existing file and write to `{stem}_{n}.jpg` instead.
    UniqueSuffix,
}

impl FromStr for CollisionPolicy {
    type Err = GrabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "unique-suffix" | "unique_suffix" | "unique" => Ok(Self::UniqueSuffix),
            other => Err(GrabError::Validation(format!(
                "unknown collision policy '{other}' (expected overwrite or unique-suffix)"
            ))),
        }
    }
}

/// Settings for one downloader run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    /// Scheme and host of the gallery, without trailing slash.
    pub base_url: String,
    /// Launch the browser without a window. The gallery serves its grid more
    /// reliably to a headed browser, so this is off by default.
    pub headless: bool,
    /// Explicit browser executable; discovered when `None`.
    pub chromium_path: Option<PathBuf>,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Upper bound on waiting for the search page to load.
    pub navigation_timeout_ms: u64,
    /// Extra wait after the load event so lazily rendered images appear.
    pub settle_ms: u64,
    /// Upper bound on each individual image fetch.
    pub fetch_timeout_ms: u64,
    pub collision_policy: CollisionPolicy,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: false,
            chromium_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            navigation_timeout_ms: 60_000,
            settle_ms: 5_000,
            fetch_timeout_ms: 30_000,
            collision_policy: CollisionPolicy::Overwrite,
        }
    }
}

impl GrabConfig {
    /// Defaults overlaid with `GALLERY_GRAB_*` environment variables.
    pub fn from_env() -> Result<Self, GrabError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by full variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GrabError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("BASE_URL") {
            config.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("HEADLESS") {
            config.headless = parse_bool("HEADLESS", &v)?;
        }
        if let Some(v) = get("CHROMIUM_PATH") {
            config.chromium_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = get("NAV_TIMEOUT_MS") {
            config.navigation_timeout_ms = parse_u64("NAV_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("SETTLE_MS") {
            config.settle_ms = parse_u64("SETTLE_MS", &v)?;
        }
        if let Some(v) = get("FETCH_TIMEOUT_MS") {
            config.fetch_timeout_ms = parse_u64("FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("ON_COLLISION") {
            config.collision_policy = v.parse()?;
        }

        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, GrabError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(GrabError::Validation(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got '{value}'"
        ))),
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64, GrabError> {
    value.parse().map_err(|_| {
        GrabError::Validation(format!(
            "{ENV_PREFIX}{name}: expected a number of milliseconds, got '{value}'"
        ))
    })
}

/// Resolve the save directory to an absolute path.
///
/// Empty input falls back to `images`; relative paths are joined onto the
/// current working directory. `.` and `..` are collapsed lexically, so the
/// directory need not exist yet.
pub fn resolve_save_dir(dir: &Path) -> std::io::Result<PathBuf> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(DEFAULT_SAVE_DIR)
    } else {
        dir
    };

    if dir.is_absolute() {
        Ok(normalize(dir))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(dir)))
    }
}

/// Lexical normalization of an absolute path. `..` at the root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
