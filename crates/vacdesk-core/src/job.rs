//! Job request and pipeline protocol types.
//!
//! The scraping pipeline is an external process. Its stdin/stdout contract
//! is: arguments in, newline-delimited JSON status events out, exit code
//! zero on success. [`StatusEvent`] is the closed set of event shapes;
//! anything else on stdout is diagnostic text.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File extensions the engine recognizes as report artifacts.
pub const RECOGNIZED_EXTENSIONS: [&str; 3] = ["xlsx", "csv", "docx"];

/// Which sites the pipeline should scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    /// Primary API-backed job board.
    Hh,
    /// Secondary HTML-scraped job board.
    Gorodrabot,
    /// Both sources.
    Both,
}

impl Site {
    /// CLI argument form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hh => "hh",
            Self::Gorodrabot => "gorodrabot",
            Self::Both => "both",
        }
    }
}

/// Parameters for one scraping job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Search phrase.
    pub query: String,

    /// City name.
    pub city: String,

    /// Title filter role, if any.
    pub role: Option<String>,

    /// Pages to walk.
    pub pages: Option<u32>,

    /// Rows per page.
    pub per_page: Option<u32>,

    /// Pause between upstream requests, in seconds.
    pub pause: Option<f64>,

    /// Site selector.
    pub site: Option<Site>,

    /// Region code.
    pub area: Option<i64>,

    /// Expected row count, when known ahead of time. Used only to scale
    /// the job timeout.
    pub total_hint: Option<u32>,
}

impl JobRequest {
    /// A minimal request with just a query and city.
    #[must_use]
    pub fn new(query: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            city: city.into(),
            role: None,
            pages: None,
            per_page: None,
            pause: None,
            site: None,
            area: None,
            total_hint: None,
        }
    }

    /// Expected number of rows this request will produce, from the explicit
    /// hint or the pages × per-page configuration.
    #[must_use]
    pub fn expected_rows(&self) -> u32 {
        let paged = u32::from(self.pages.unwrap_or(1)) * self.per_page.unwrap_or(20);
        self.total_hint.unwrap_or(0).max(paged)
    }
}

/// One structured status event from the pipeline's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusEvent {
    /// The intermediate raw CSV is ready. Recorded for fast keyword
    /// post-filtering without re-running the whole pipeline.
    Csv {
        /// Path to the intermediate CSV.
        path: PathBuf,
    },
    /// A report artifact in one output format is ready.
    Report {
        /// Output format ("xlsx", "csv", "docx").
        format: String,
        /// Path to the artifact.
        path: PathBuf,
    },
    /// The pipeline finished; lists everything it produced.
    Done {
        /// All produced artifact paths.
        #[serde(default)]
        files: Vec<PathBuf>,
    },
}

/// The resolved output of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobArtifact {
    /// The final report file handed to the user.
    pub report_path: PathBuf,

    /// The intermediate CSV, when the pipeline announced one.
    pub csv_path: Option<PathBuf>,
}
