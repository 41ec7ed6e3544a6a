//! yt-dlp backed source.
//!
//! Listing runs `yt-dlp -j --flat-playlist <Url>` and turns each JSON line
//! into a job. Each job's run action downloads one video and, when the
//! source has a `DestinationFolder`, moves the produced files there.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;
use vidcron_core::config::SourceConfig;
use vidcron_core::job::{Job, JobError, JobResult};
use vidcron_core::process::ProcessRunner;

use super::{JobSource, SourceContext};
use crate::error::SourceError;

/// Name of the external binary, as probed on `PATH`.
pub const BINARY: &str = "yt-dlp";

/// Prefix of every job id produced by this source.
const UNIQUE_ID_PREFIX: &str = "youtubedl";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; YandexImages/3.0; +http://yandex.com/bots)";

/// One entry of `--flat-playlist` JSON output.
#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: String,
    extractor: Option<String>,
    ie_key: Option<String>,
    title: Option<String>,
    url: Option<String>,
    /// Seconds. Missing for live streams and upcoming premieres.
    duration: Option<f64>,
}

impl PlaylistEntry {
    fn extractor(&self) -> String {
        self.extractor
            .clone()
            .or_else(|| self.ie_key.as_ref().map(|key| key.to_ascii_lowercase()))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// The `--print %()j` line emitted after a download.
#[derive(Debug, Deserialize)]
struct DownloadDetails {
    #[serde(rename = "_filename")]
    filename: String,
}

/// Everything a run action needs, shared by all jobs of one source.
#[derive(Debug)]
struct Downloader {
    binary: String,
    runner: ProcessRunner,
    destination: Option<PathBuf>,
}

/// Source that lists and downloads a yt-dlp supported collection URL.
#[derive(Debug)]
pub struct YtDlpSource {
    name: String,
    url: String,
    downloader: Arc<Downloader>,
}

impl YtDlpSource {
    /// Build from config. Fails if the `Url` property is missing or the
    /// startup probe did not find `yt-dlp`.
    pub fn new(config: &SourceConfig, ctx: &SourceContext) -> Result<Self, SourceError> {
        config.validate()?;
        let url = config.require_property("Url")?.to_string();

        let binary = ctx
            .capabilities
            .get(BINARY)
            .and_then(|probe| probe.path.as_ref())
            .ok_or_else(|| SourceError::MissingBinary(BINARY.to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            url,
            downloader: Arc::new(Downloader {
                binary: binary.to_string_lossy().into_owned(),
                runner: ctx.runner.clone(),
                destination: config.destination_folder.clone(),
            }),
        })
    }

    fn job_for(&self, entry: PlaylistEntry, video_url: String) -> Job {
        let unique_id = format!("{UNIQUE_ID_PREFIX}:{}:{}", entry.extractor(), entry.id);
        let duration = entry
            .duration
            .map(format_duration)
            .unwrap_or_else(|| "??:??".to_string());
        let title = entry.title.as_deref().unwrap_or(&entry.id);
        let display_name = format!("{title} ({duration})");

        let downloader = Arc::clone(&self.downloader);
        Job::new(unique_id, display_name, self.name.clone(), move || {
            let downloader = Arc::clone(&downloader);
            let video_url = video_url.clone();
            async move { downloader.download(&video_url).await }
        })
    }
}

#[async_trait]
impl JobSource for YtDlpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_all_jobs(&self) -> Result<Vec<Job>, SourceError> {
        tracing::info!(source = %self.name, "Retrieving all videos in source collection");
        let listing = self
            .downloader
            .runner
            .run(
                &self.downloader.binary,
                ["-j", "--flat-playlist", self.url.as_str()],
            )
            .await?;

        let mut jobs = Vec::new();
        for line in &listing.stdout {
            let entry: PlaylistEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(source = %self.name, error = %e, "Failed to deserialize yt-dlp json output");
                    continue;
                }
            };

            let video_url = match entry.url.clone() {
                Some(url) if entry.duration.is_some() && !url.contains("/shorts/") => url,
                _ => {
                    tracing::debug!(
                        source = %self.name,
                        id = %entry.id,
                        title = ?entry.title,
                        "Skipping entry without duration, url, or that is a short",
                    );
                    continue;
                }
            };

            jobs.push(self.job_for(entry, video_url));
        }

        tracing::info!(source = %self.name, count = jobs.len(), "Discovered videos");
        Ok(jobs)
    }
}

impl Downloader {
    async fn download(&self, video_url: &str) -> Result<JobResult, JobError> {
        let start = Utc::now();
        let output = self
            .runner
            .run(
                &self.binary,
                [
                    "--no-simulate",
                    "--print",
                    "%()j",
                    "--user-agent",
                    USER_AGENT,
                    "--sponsorblock-remove",
                    "sponsor",
                    video_url,
                ],
            )
            .await?;

        let details = output
            .first_line()
            .ok_or_else(|| JobError::message("Did not receive any output from yt-dlp"))?;
        tracing::info!("Video downloaded successfully");

        if let Some(destination) = &self.destination {
            let work_dir = self
                .runner
                .working_directory()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            move_downloaded_files(details, &work_dir, destination).await?;
        }

        Ok(JobResult::completed(start, Utc::now()))
    }
}

/// Move every file named `<stem>.*` from `work_dir` into `destination`.
///
/// yt-dlp reports the pre-merge filename, so the final extension is not
/// known; matching on the stem picks up the video and its sidecars. The
/// originals are deleted whether or not copying succeeded.
async fn move_downloaded_files(
    details_line: &str,
    work_dir: &Path,
    destination: &Path,
) -> Result<(), JobError> {
    let details: DownloadDetails = serde_json::from_str(details_line)?;
    let stem = Path::new(&details.filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| JobError::message(format!("Invalid filename: {}", details.filename)))?;
    let prefix = format!("{stem}.");

    let mut produced = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(&prefix) && entry.file_type().await?.is_file() {
            produced.push(entry.path());
        }
    }

    let mut copy_result = Ok(());
    for source in &produced {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = destination.join(file_name);
        tracing::debug!(from = %source.display(), to = %target.display(), "Copying downloaded file");
        if let Err(e) = tokio::fs::copy(source, &target).await {
            tracing::warn!(error = %e, "Failed moving file, file will be cleaned up");
            copy_result = Err(e);
            break;
        }
    }

    for source in &produced {
        if let Err(e) = tokio::fs::remove_file(source).await {
            tracing::warn!(path = %source.display(), error = %e, "Failed to clean up downloaded file");
        }
    }

    copy_result?;
    tracing::debug!(files = produced.len(), "Files moved successfully");
    Ok(())
}

/// `h:mm:ss` with whole seconds.
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
