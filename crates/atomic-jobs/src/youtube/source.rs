//! YouTube URL validation and audio download through `yt-dlp`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use atomic_core::{defaults, Error, Result};

use crate::command::run_cmd_with_timeout;

fn video_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:v=|/)([0-9A-Za-z_-]{11})",
            r"youtu\.be/([0-9A-Za-z_-]{11})",
            r"embed/([0-9A-Za-z_-]{11})",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// The 11-character video id in `url`, or `InvalidSource`.
///
/// Checks a few known URL shapes; this is not a URL grammar.
pub fn extract_video_id(url: &str) -> Result<String> {
    video_id_patterns()
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::InvalidSource("Invalid YouTube URL".to_string()))
}

/// Metadata of a downloaded video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub video_id: String,
    pub title: String,
    pub duration_seconds: f64,
    pub uploader: String,
    pub thumbnail: String,
    pub audio_file: PathBuf,
}

/// Downloads the audio track of a video into a directory.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn download(&self, url: &str, dir: &Path) -> Result<VideoInfo>;
}

/// [`AudioSource`] shelling out to `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    program: String,
    timeout_secs: u64,
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            timeout_secs: defaults::MEDIA_CMD_TIMEOUT_SECS,
        }
    }
}

impl YtDlpSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// `YTDLP_PATH`, else `yt-dlp` on `PATH`.
    pub fn from_env() -> Self {
        match std::env::var(defaults::ENV_YTDLP_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::new(path.trim()),
            _ => Self::default(),
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[async_trait]
impl AudioSource for YtDlpSource {
    #[instrument(skip(self, dir), fields(subsystem = "jobs", component = "yt_dlp", op = "download"))]
    async fn download(&self, url: &str, dir: &Path) -> Result<VideoInfo> {
        extract_video_id(url)?;
        let template = dir.join("%(id)s.%(ext)s");

        let stdout = run_cmd_with_timeout(
            Command::new(&self.program)
                .arg("-x")
                .args(["--audio-format", "mp3"])
                .args(["--audio-quality", "192K"])
                .args(["-f", "bestaudio/best"])
                .arg("--print-json")
                .arg("--no-warnings")
                .arg("--no-playlist")
                .arg("-o")
                .arg(&template)
                .arg(url),
            self.timeout_secs,
            Error::Request,
        )
        .await?;

        let info = parse_ytdlp_output(&stdout, dir)?;
        info!(
            video_id = %info.video_id,
            duration_seconds = info.duration_seconds,
            "Audio downloaded"
        );
        Ok(info)
    }
}

/// Parse the `--print-json` document (last JSON line of stdout).
pub fn parse_ytdlp_output(stdout: &str, dir: &Path) -> Result<VideoInfo> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .ok_or_else(|| Error::Request("yt-dlp printed no metadata".to_string()))?;
    let info: JsonValue = serde_json::from_str(line)?;

    let text = |key: &str| info.get(key).and_then(JsonValue::as_str).map(str::to_string);
    let video_id = text("id")
        .ok_or_else(|| Error::Request("yt-dlp metadata has no id".to_string()))?;

    let audio_file = info
        .get("requested_downloads")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("filepath"))
        .and_then(JsonValue::as_str)
        .map(PathBuf::from)
        .or_else(|| text("_filename").map(|f| PathBuf::from(f).with_extension("mp3")))
        .unwrap_or_else(|| dir.join(format!("{video_id}.mp3")));
    debug!(audio_file = %audio_file.display(), "Resolved audio path");

    Ok(VideoInfo {
        title: text("title").unwrap_or_else(|| video_id.clone()),
        duration_seconds: info.get("duration").and_then(JsonValue::as_f64).unwrap_or(0.0),
        uploader: text("uploader").unwrap_or_else(|| "Unknown".to_string()),
        thumbnail: text("thumbnail").unwrap_or_default(),
        video_id,
        audio_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=30",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
        ] {
            assert_eq!(extract_video_id(url).unwrap(), "dQw4w9WgXcQ", "{url}");
        }
    }

    #[test]
    fn test_extract_video_id_rejects() {
        for url in ["", "not a url", "https://example.com/short", "https://youtu.be/abc"] {
            let err = extract_video_id(url).unwrap_err();
            assert!(matches!(err, Error::InvalidSource(_)), "{url}");
        }
    }

    #[test]
    fn test_parse_output_prefers_final_filepath() {
        let stdout = r#"[download] 100%
{"id": "dQw4w9WgXcQ", "title": "Talk", "duration": 212, "uploader": "Chan", "thumbnail": "https://i.ytimg.com/x.jpg", "_filename": "/tmp/a/dQw4w9WgXcQ.webm", "requested_downloads": [{"filepath": "/tmp/a/dQw4w9WgXcQ.mp3"}]}"#;
        let info = parse_ytdlp_output(stdout, Path::new("/tmp/a")).unwrap();
        assert_eq!(info.video_id, "dQw4w9WgXcQ");
        assert_eq!(info.title, "Talk");
        assert_eq!(info.duration_seconds, 212.0);
        assert_eq!(info.uploader, "Chan");
        assert_eq!(info.audio_file, PathBuf::from("/tmp/a/dQw4w9WgXcQ.mp3"));
    }

    #[test]
    fn test_parse_output_defaults() {
        let stdout = r#"{"id": "dQw4w9WgXcQ", "title": "Talk", "_filename": "/tmp/a/dQw4w9WgXcQ.m4a"}"#;
        let info = parse_ytdlp_output(stdout, Path::new("/tmp/a")).unwrap();
        assert_eq!(info.uploader, "Unknown");
        assert_eq!(info.thumbnail, "");
        assert_eq!(info.duration_seconds, 0.0);
        assert_eq!(info.audio_file, PathBuf::from("/tmp/a/dQw4w9WgXcQ.mp3"));
    }

    #[test]
    fn test_parse_output_without_json() {
        assert!(parse_ytdlp_output("ERROR: Video unavailable", Path::new("/tmp")).is_err());
    }
}
