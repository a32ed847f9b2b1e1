//! Core data types for search requests, candidates, fetch outcomes, and manifests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Directory used when the caller leaves `save_dir` empty.
pub const DEFAULT_SAVE_DIR: &str = "images";

/// Photo orientation filter understood by the gallery search page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    Squarish,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Squarish => "squarish",
        }
    }

    /// Parse a caller-supplied value. `None` and the empty string both mean
    /// "unset" and yield the default.
    pub fn parse_or_default(value: Option<&str>) -> GrabResult<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for Orientation {
    type Err = GrabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "landscape" => Ok(Self::Landscape),
            "portrait" => Ok(Self::Portrait),
            "squarish" => Ok(Self::Squarish),
            other => Err(GrabError::Validation(format!(
                "unknown orientation '{other}' (expected landscape, portrait or squarish)"
            ))),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// License tier filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    #[default]
    Free,
    Plus,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Plus => "plus",
        }
    }

    /// Same "empty means unset" rule as [`Orientation::parse_or_default`].
    pub fn parse_or_default(value: Option<&str>) -> GrabResult<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for LicenseType {
    type Err = GrabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "plus" => Ok(Self::Plus),
            other => Err(GrabError::Validation(format!(
                "unknown license type '{other}' (expected free or plus)"
            ))),
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated download request. Built once per invocation and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    query: String,
    count: usize,
    save_dir: PathBuf,
    orientation: Orientation,
    license_type: LicenseType,
}

impl SearchRequest {
    pub fn builder(query: impl Into<String>) -> SearchRequestBuilder {
        SearchRequestBuilder {
            query: query.into(),
            count: 1,
            save_dir: None,
            orientation: None,
            license_type: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The save directory as supplied (possibly relative).
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn license_type(&self) -> LicenseType {
        self.license_type
    }
}

/// Collects raw, caller-shaped arguments and validates them in [`build`].
///
/// [`build`]: SearchRequestBuilder::build
#[derive(Debug, Clone)]
pub struct SearchRequestBuilder {
    query: String,
    count: i64,
    save_dir: Option<String>,
    orientation: Option<String>,
    license_type: Option<String>,
}

impl SearchRequestBuilder {
    pub fn count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn save_dir(mut self, save_dir: impl Into<String>) -> Self {
        self.save_dir = Some(save_dir.into());
        self
    }

    pub fn orientation(mut self, orientation: impl Into<String>) -> Self {
        self.orientation = Some(orientation.into());
        self
    }

    pub fn license_type(mut self, license_type: impl Into<String>) -> Self {
        self.license_type = Some(license_type.into());
        self
    }

    pub fn build(self) -> GrabResult<SearchRequest> {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(GrabError::Validation("query must not be empty".to_string()));
        }

        if self.count <= 0 {
            return Err(GrabError::Validation(format!(
                "count must be a positive integer, got {}",
                self.count
            )));
        }
        let count = usize::try_from(self.count)
            .map_err(|_| GrabError::Validation(format!("count {} is too large", self.count)))?;

        let save_dir = match self.save_dir.as_deref().map(str::trim) {
            None | Some("") => PathBuf::from(DEFAULT_SAVE_DIR),
            Some(dir) => PathBuf::from(dir),
        };

        Ok(SearchRequest {
            query,
            count,
            save_dir,
            orientation: Orientation::parse_or_default(self.orientation.as_deref())?,
            license_type: LicenseType::parse_or_default(self.license_type.as_deref())?,
        })
    }
}

/// A resolved image URL awaiting retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateImage {
    pub source_url: String,
    /// Zero-based position in extraction order.
    pub ordinal_rank: usize,
}

/// Result of retrieving and persisting one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Failure { reason: String },
}

/// One outcome per candidate. Siblings never affect each other.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub candidate: CandidateImage,
    pub status: FetchStatus,
    pub payload: Option<Vec<u8>>,
    pub saved_path: Option<PathBuf>,
}

impl FetchOutcome {
    pub fn success(candidate: CandidateImage, payload: Vec<u8>, saved_path: PathBuf) -> Self {
        Self {
            candidate,
            status: FetchStatus::Success,
            payload: Some(payload),
            saved_path: Some(saved_path),
        }
    }

    pub fn failure(candidate: CandidateImage, error: &GrabError) -> Self {
        Self {
            candidate,
            status: FetchStatus::Failure {
                reason: error.to_string(),
            },
            payload: None,
            saved_path: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Success)
    }
}

/// What was actually saved. The sole value returned from a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadManifest {
    pub saved_paths: Vec<PathBuf>,
    pub requested_count: usize,
    pub actual_count: usize,
    pub save_dir: PathBuf,
    pub orientation: Orientation,
    pub license_type: LicenseType,
}

impl DownloadManifest {
    /// Build a manifest from settled outcomes, keeping candidate order and
    /// skipping failures.
    pub fn from_outcomes(
        request: &SearchRequest,
        save_dir: PathBuf,
        outcomes: impl IntoIterator<Item = FetchOutcome>,
    ) -> Self {
        let mut outcomes: Vec<FetchOutcome> = outcomes.into_iter().collect();
        outcomes.sort_by_key(|o| o.candidate.ordinal_rank);

        let saved_paths: Vec<PathBuf> = outcomes
            .into_iter()
            .filter(FetchOutcome::is_success)
            .filter_map(|o| o.saved_path)
            .take(request.count())
            .collect();

        Self {
            actual_count: saved_paths.len(),
            saved_paths,
            requested_count: request.count(),
            save_dir,
            orientation: request.orientation(),
            license_type: request.license_type(),
        }
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let paths: Vec<String> = self
            .saved_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        format!(
            "Downloaded {} images to {} (orientation={}, license={}): {}",
            self.actual_count,
            self.save_dir.display(),
            self.orientation,
            self.license_type,
            paths.join(", ")
        )
    }
}

impl fmt::Display for DownloadManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Errors that can occur while grabbing images.
///
/// `Validation`, `Launch`, `SaveDir`, `Navigation` and `Extraction` fail the
/// whole operation. `Fetch` and `Persist` only ever describe a single
/// candidate and end up inside [`FetchStatus::Failure`].
#[derive(thiserror::Error, Debug)]
pub enum GrabError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Cannot prepare save directory {path}: {source}")]
    SaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Write failed for {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience result type.
pub type GrabResult<T> = Result<T, GrabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_applies_defaults() {
        let req = SearchRequest::builder("cats").build().unwrap();
        assert_eq!(req.count(), 1);
        assert_eq!(req.save_dir(), Path::new(DEFAULT_SAVE_DIR));
        assert_eq!(req.orientation(), Orientation::Landscape);
        assert_eq!(req.license_type(), LicenseType::Free);
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let req = SearchRequest::builder("cats")
            .save_dir("")
            .orientation("")
            .license_type("  ")
            .build()
            .unwrap();
        assert_eq!(req.save_dir(), Path::new(DEFAULT_SAVE_DIR));
        assert_eq!(req.orientation(), Orientation::Landscape);
        assert_eq!(req.license_type(), LicenseType::Free);
    }

    #[test]
    fn test_non_positive_count_rejected() {
        for count in [0, -1, -100] {
            let err = SearchRequest::builder("cats").count(count).build().unwrap_err();
            assert!(matches!(err, GrabError::Validation(_)), "count {count}");
        }
    }

    #[test]
    fn test_blank_query_rejected() {
        let err = SearchRequest::builder("   ").build().unwrap_err();
        assert!(matches!(err, GrabError::Validation(_)));
    }

    #[test]
    fn test_unknown_enum_values_rejected() {
        assert!(SearchRequest::builder("cats").orientation("diagonal").build().is_err());
        assert!(SearchRequest::builder("cats").license_type("premium").build().is_err());
        assert_eq!("Portrait".parse::<Orientation>().unwrap(), Orientation::Portrait);
        assert_eq!("PLUS".parse::<LicenseType>().unwrap(), LicenseType::Plus);
    }

    #[test]
    fn test_manifest_keeps_candidate_order_and_skips_failures() {
        let req = SearchRequest::builder("cats").count(3).build().unwrap();
        let cand = |i: usize| CandidateImage {
            source_url: format!("https://img.example/photo-{i}"),
            ordinal_rank: i,
        };
        let outcomes = vec![
            FetchOutcome::success(cand(2), vec![3], PathBuf::from("/out/cats_3.jpg")),
            FetchOutcome::failure(
                cand(1),
                &GrabError::Fetch {
                    url: cand(1).source_url,
                    reason: "HTTP 404".to_string(),
                },
            ),
            FetchOutcome::success(cand(0), vec![1], PathBuf::from("/out/cats_1.jpg")),
        ];

        let manifest = DownloadManifest::from_outcomes(&req, PathBuf::from("/out"), outcomes);
        assert_eq!(manifest.actual_count, 2);
        assert_eq!(manifest.requested_count, 3);
        assert_eq!(
            manifest.saved_paths,
            vec![PathBuf::from("/out/cats_1.jpg"), PathBuf::from("/out/cats_3.jpg")]
        );
    }

    #[test]
    fn test_summary_format() {
        let manifest = DownloadManifest {
            saved_paths: vec![PathBuf::from("/out/a_1.jpg"), PathBuf::from("/out/a_2.jpg")],
            requested_count: 2,
            actual_count: 2,
            save_dir: PathBuf::from("/out"),
            orientation: Orientation::Portrait,
            license_type: LicenseType::Plus,
        };
        assert_eq!(
            manifest.summary(),
            "Downloaded 2 images to /out (orientation=portrait, license=plus): /out/a_1.jpg, /out/a_2.jpg"
        );
    }
}
