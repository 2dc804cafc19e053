//! Audio normalization via ffmpeg

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::ConverterConfig;
use crate::error::{Error, Result};

/// Canonical encoding extension expected by the engine
const CANONICAL_EXTENSION: &str = "wav";

/// Converts uploads into the engine's canonical audio encoding
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Convert `input` and return the path of the new file
    async fn convert(&self, input: &Path) -> Result<PathBuf>;

    /// Whether `input` must be converted before transcription
    fn needs_conversion(&self, input: &Path) -> bool {
        !input
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(CANONICAL_EXTENSION))
            .unwrap_or(false)
    }
}

/// ffmpeg-backed converter producing mono 16kHz WAV by default
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Output path next to the input: `clip.mp3` -> `clip.mp3.wav`
    fn output_path(input: &Path) -> PathBuf {
        let mut name = input.as_os_str().to_owned();
        name.push(".");
        name.push(CANONICAL_EXTENSION);
        PathBuf::from(name)
    }
}

#[async_trait]
impl FormatConverter for FfmpegConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf> {
        let output = Self::output_path(input);

        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", &self.config.channels.to_string()])
            .args(["-ar", &self.config.sample_rate.to_string()])
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::conversion(format!("failed to run {}: {}", self.config.ffmpeg_path, e)))?;

        if !status.success() {
            // ffmpeg may leave a truncated file behind
            if let Err(e) = tokio::fs::remove_file(&output).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove partial output {}: {}", output.display(), e);
                }
            }
            return Err(Error::conversion(format!(
                "ffmpeg exited with {}",
                status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            )));
        }

        Ok(output)
    }
}
