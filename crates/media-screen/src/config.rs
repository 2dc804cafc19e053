//! Configuration for the screening service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Job processing configuration
    pub processing: ProcessingConfig,
    /// Audio conversion configuration
    pub converter: ConverterConfig,
    /// Transcription engine configuration
    pub engine: EngineConfig,
    /// Disallowed-term lexicon configuration
    pub lexicon: LexiconConfig,
}

impl ScreenConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT` and `ALLOWED_ORIGINS` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PORT '{}': {}", port, e)))?;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = parse_origins(&origins);
        }
        Ok(())
    }

    /// Reject values that would make the service unusable
    pub fn validate(&self) -> Result<()> {
        if self.server.max_upload_size == 0 {
            return Err(Error::Config("server.max_upload_size must be greater than 0".into()));
        }
        if self.processing.deadline_secs == 0 {
            return Err(Error::Config("processing.deadline_secs must be greater than 0".into()));
        }
        if self.processing.retention_secs == 0 {
            return Err(Error::Config("processing.retention_secs must be greater than 0".into()));
        }
        if self.engine.chunk_secs == 0 {
            return Err(Error::Config("engine.chunk_secs must be greater than 0".into()));
        }
        if self.processing.scan_check_interval == 0 {
            return Err(Error::Config(
                "processing.scan_check_interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Allowed CORS origins (`*` allows any)
    pub allowed_origins: Vec<String>,
    /// Maximum upload size in bytes (deployment specific)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["*".to_string()],
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl ServerConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Job processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Wall-clock budget for a single job in seconds
    pub deadline_secs: u64,
    /// Age after which job records are evicted, in seconds
    pub retention_secs: u64,
    /// How long a job waits on a concurrent engine load, in seconds
    pub engine_wait_secs: u64,
    /// Segments between deadline checks and progress reports while scanning
    pub scan_check_interval: usize,
    /// Directory for staged uploads (system temp dir when unset)
    pub upload_dir: Option<PathBuf>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 60,
            retention_secs: 3600, // 1 hour
            engine_wait_secs: 60,
            scan_check_interval: 10,
            upload_dir: None,
        }
    }
}

impl ProcessingConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn engine_wait(&self) -> Duration {
        Duration::from_secs(self.engine_wait_secs)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// ffmpeg conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// ffmpeg executable
    pub ffmpeg_path: String,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u8,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// Whisper CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whisper executable
    pub command: String,
    /// Model name or path
    pub model: String,
    /// Force a language instead of auto-detection
    pub language: Option<String>,
    /// Inference device (cpu, cuda)
    pub device: String,
    /// Length of the pieces the audio is split into before transcription
    pub chunk_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "whisper".to_string(),
            model: "tiny".to_string(),
            language: None,
            device: "cpu".to_string(),
            chunk_secs: 60,
        }
    }
}

/// Lexicon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconConfig {
    /// Newline-delimited term file replacing the built-in list
    pub path: Option<PathBuf>,
    /// Terms added on top of the base list
    pub extra_terms: Vec<String>,
}
