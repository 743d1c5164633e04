//! External pipeline orchestration.
//!
//! The scraping pipeline is a separate executable. This module builds its
//! argument list, runs it under a deadline scaled to the expected job
//! size, follows its newline-delimited JSON status events, and resolves
//! the final artifact. Anything on stdout that is not a status event is
//! kept as a bounded diagnostic tail for error reports.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use vacdesk_core::{JobArtifact, JobRequest, StatusEvent, UserId, RECOGNIZED_EXTENSIONS};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Report format requested from the pipeline.
const REPORT_FORMAT: &str = "xlsx";

/// Lines of diagnostic output kept for error reports.
const TAIL_LINES: usize = 20;

/// Rows covered by the base timeout before scaling kicks in.
const BASE_ROWS: u32 = 100;

/// Extra seconds of deadline per this many expected rows.
const ROWS_PER_EXTRA_SECOND: u32 = 10;

/// Hard cap on the scaled deadline, as a multiple of the base.
const MAX_TIMEOUT_FACTOR: u32 = 10;

/// Runs pipeline jobs and resolves their artifacts.
#[derive(Debug, Clone)]
pub struct JobOrchestrator {
    pipeline_path: PathBuf,
    report_dir: PathBuf,
    base_timeout: Duration,
}

impl JobOrchestrator {
    /// Create an orchestrator from the engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pipeline_path: config.pipeline_path.clone(),
            report_dir: config.report_dir.clone(),
            base_timeout: config.job_timeout,
        }
    }

    /// Run one job to completion and return its artifact.
    ///
    /// # Errors
    ///
    /// See [`JobOrchestrator::run_with_progress`].
    pub async fn run(&self, user_id: UserId, request: &JobRequest) -> Result<JobArtifact> {
        self.run_with_progress(user_id, request, |_| {}).await
    }

    /// Run one job to completion, surfacing each status event to
    /// `progress` as it arrives.
    ///
    /// The pipeline is killed (and awaited, so no zombie survives) when
    /// it outlives the scaled deadline.
    ///
    /// # Errors
    ///
    /// [`EngineError::JobTimeout`] on deadline, [`EngineError::JobFailed`]
    /// on a non-zero exit or a missing artifact, [`EngineError::Io`] when
    /// the process cannot be spawned or its output read.
    pub async fn run_with_progress(
        &self,
        user_id: UserId,
        request: &JobRequest,
        mut progress: impl FnMut(&StatusEvent),
    ) -> Result<JobArtifact> {
        let output_dir = self.report_dir.join(user_id.value().to_string());
        tokio::fs::create_dir_all(&output_dir).await?;

        let args = build_args(request, &output_dir);
        let deadline = scaled_timeout(self.base_timeout, request.expected_rows());

        tracing::info!(
            user_id = %user_id,
            query = %request.query,
            expected_rows = request.expected_rows(),
            deadline_secs = deadline.as_secs(),
            "starting pipeline"
        );

        let mut child = Command::new(&self.pipeline_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("pipeline stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("pipeline stderr not captured"))?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(TAIL_LINES)));

        // Drain stderr concurrently so the pipe can never fill and stall
        // the pipeline.
        let stderr_tail = Arc::clone(&tail);
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                push_tail(&stderr_tail, line);
            }
        });

        let mut report_path: Option<PathBuf> = None;
        let mut csv_path: Option<PathBuf> = None;
        let mut done_files: Vec<PathBuf> = Vec::new();

        let follow = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match serde_json::from_str::<StatusEvent>(&line) {
                    Ok(event) => {
                        progress(&event);
                        match event {
                            StatusEvent::Csv { path } => csv_path = Some(path),
                            StatusEvent::Report { format, path } => {
                                tracing::debug!(format = %format, path = %path.display(), "report ready");
                                // Only the requested format names the final artifact.
                                if format == REPORT_FORMAT {
                                    report_path = Some(path);
                                }
                            }
                            StatusEvent::Done { files } => done_files = files,
                        }
                    }
                    Err(_) => push_tail(&tail, line),
                }
            }
            child.wait().await
        };

        let status = match tokio::time::timeout(deadline, follow).await {
            Ok(status) => status?,
            Err(_) => {
                // Deadline hit: kill and reap before reporting.
                child.kill().await?;
                let _ = child.wait().await;
                stderr_task.abort();
                tracing::warn!(user_id = %user_id, deadline_secs = deadline.as_secs(), "pipeline timed out");
                return Err(EngineError::JobTimeout {
                    timeout_secs: deadline.as_secs(),
                    tail: drain_tail(&tail),
                });
            }
        };

        let _ = stderr_task.await;

        if !status.success() {
            let detail = match status.code() {
                Some(code) => format!("pipeline exited with code {code}"),
                None => "pipeline killed by signal".to_string(),
            };
            tracing::warn!(user_id = %user_id, %detail, "pipeline failed");
            return Err(EngineError::JobFailed {
                detail,
                tail: drain_tail(&tail),
            });
        }

        let report = resolve_artifact(report_path, &done_files, &output_dir).await;
        let Some(report_path) = report else {
            return Err(EngineError::JobFailed {
                detail: "pipeline produced no recognized artifact".to_string(),
                tail: drain_tail(&tail),
            });
        };

        tracing::info!(user_id = %user_id, report = %report_path.display(), "pipeline finished");
        Ok(JobArtifact {
            report_path,
            csv_path,
        })
    }
}

/// Assemble the pipeline's CLI arguments from a request.
fn build_args(request: &JobRequest, output_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--query".to_string(),
        request.query.clone(),
        "--city".to_string(),
        request.city.clone(),
        "--formats".to_string(),
        REPORT_FORMAT.to_string(),
        "--output".to_string(),
        output_dir.display().to_string(),
    ];

    if let Some(role) = &request.role {
        args.push("--role".to_string());
        args.push(role.clone());
    }
    if let Some(pages) = request.pages {
        args.push("--pages".to_string());
        args.push(pages.to_string());
    }
    if let Some(per_page) = request.per_page {
        args.push("--per_page".to_string());
        args.push(per_page.to_string());
    }
    if let Some(pause) = request.pause {
        args.push("--pause".to_string());
        args.push(pause.to_string());
    }
    if let Some(site) = request.site {
        args.push("--site".to_string());
        args.push(site.as_str().to_string());
    }
    if let Some(area) = request.area {
        args.push("--area".to_string());
        args.push(area.to_string());
    }

    args
}

/// Deadline scaled by expected job size: one extra second per ten rows
/// beyond the first hundred, never more than ten times the base.
fn scaled_timeout(base: Duration, expected_rows: u32) -> Duration {
    let extra_rows = expected_rows.saturating_sub(BASE_ROWS);
    let extra = Duration::from_secs(u64::from(extra_rows / ROWS_PER_EXTRA_SECOND));
    (base + extra).min(base * MAX_TIMEOUT_FACTOR)
}

/// Pick the final report: announced path first, then the done listing,
/// then the newest recognized file in the output directory.
async fn resolve_artifact(
    announced: Option<PathBuf>,
    done_files: &[PathBuf],
    output_dir: &Path,
) -> Option<PathBuf> {
    if let Some(path) = announced {
        return Some(path);
    }

    if let Some(path) = done_files.iter().rev().find(|p| is_recognized(p)) {
        return Some(path.clone());
    }

    newest_recognized_file(output_dir).await
}

fn is_recognized(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| RECOGNIZED_EXTENSIONS.contains(&ext))
}

/// Scan a directory for the most recently modified recognized file.
async fn newest_recognized_file(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !is_recognized(&path) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }

    newest.map(|(_, path)| path)
}

fn push_tail(tail: &Mutex<VecDeque<String>>, line: String) {
    if let Ok(mut tail) = tail.lock() {
        if tail.len() == TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

fn drain_tail(tail: &Mutex<VecDeque<String>>) -> Vec<String> {
    tail.lock()
        .map(|mut t| t.drain(..).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_only_set_fields() {
        let mut request = JobRequest::new("barista", "Moscow");
        let args = build_args(&request, Path::new("/tmp/out"));
        assert_eq!(
            args,
            vec![
                "--query", "barista", "--city", "Moscow", "--formats", "xlsx", "--output",
                "/tmp/out"
            ]
        );

        request.pages = Some(3);
        request.site = Some(vacdesk_core::Site::Both);
        let args = build_args(&request, Path::new("/tmp/out"));
        assert!(args.windows(2).any(|w| w == ["--pages", "3"]));
        assert!(args.windows(2).any(|w| w == ["--site", "both"]));
        assert!(!args.contains(&"--role".to_string()));
    }

    #[test]
    fn timeout_scales_with_expected_rows() {
        let base = Duration::from_secs(180);

        // Small jobs get the base deadline.
        assert_eq!(scaled_timeout(base, 20), base);
        assert_eq!(scaled_timeout(base, 100), base);

        // One extra second per ten rows past a hundred.
        assert_eq!(scaled_timeout(base, 200), base + Duration::from_secs(10));
        assert_eq!(scaled_timeout(base, 1100), base + Duration::from_secs(100));

        // Capped at ten times the base.
        assert_eq!(scaled_timeout(base, u32::MAX), base * 10);
    }

    #[test]
    fn recognized_extensions_filter() {
        assert!(is_recognized(Path::new("/out/report.xlsx")));
        assert!(is_recognized(Path::new("/out/raw.csv")));
        assert!(is_recognized(Path::new("/out/letter.docx")));
        assert!(!is_recognized(Path::new("/out/debug.log")));
        assert!(!is_recognized(Path::new("/out/noext")));
    }

    #[tokio::test]
    async fn fallback_scan_picks_newest_recognized_file() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.xlsx");
        let ignored = dir.path().join("notes.txt");
        std::fs::write(&old, b"old").unwrap();
        std::fs::write(&ignored, b"skip").unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let new = dir.path().join("new.csv");
        std::fs::write(&new, b"new").unwrap();

        let found = newest_recognized_file(dir.path()).await.unwrap();
        assert_eq!(found, new);
    }

    #[tokio::test]
    async fn announced_report_wins_over_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.xlsx"), b"x").unwrap();

        let announced = Some(PathBuf::from("/announced/report.xlsx"));
        let resolved = resolve_artifact(announced.clone(), &[], dir.path()).await;
        assert_eq!(resolved, announced);
    }
}
