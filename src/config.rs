//! Runtime configuration surface for the native core.
//!
//! Config is assembled programmatically (builder) or from environment
//! variables; there is no file-format loader (out of scope, see `spec.md`
//! Non-goals). Every numeric knob here is a hard upper bound enforced at the
//! boundary that owns it (connection accept loop, upload sink, cache, task
//! engine) rather than a suggestion.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub keepalive: bool,
    pub max_header_bytes: usize,
    /// Hard cap on request body size. The upload pipeline and `BodyLimit`
    /// middleware are the only things that read this; the HTTP parser
    /// itself never hard-codes a limit.
    pub max_body_bytes: u64,
    pub upload: UploadConfig,
    pub cache: CacheConfig,
    pub task: TaskConfig,
    pub di: DiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            keepalive: true,
            max_header_bytes: 16 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
            upload: UploadConfig::default(),
            cache: CacheConfig::default(),
            task: TaskConfig::default(),
            di: DiConfig::default(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Config::default())
    }

    /// Loads overrides from `CATZILLA_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var("CATZILLA_HOST") {
            cfg.host = v;
        }
        if let Ok(v) = std::env::var("CATZILLA_PORT")
            && let Ok(port) = v.parse()
        {
            cfg.port = port;
        }
        if let Ok(v) = std::env::var("CATZILLA_MAX_BODY_BYTES")
            && let Ok(n) = v.parse()
        {
            cfg.max_body_bytes = n;
        }
        cfg
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.0.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.0.port = port;
        self
    }

    pub fn max_body_bytes(mut self, n: u64) -> Self {
        self.0.max_body_bytes = n;
        self
    }

    pub fn upload(mut self, upload: UploadConfig) -> Self {
        self.0.upload = upload;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.0.cache = cache;
        self
    }

    pub fn task(mut self, task: TaskConfig) -> Self {
        self.0.task = task;
        self
    }

    pub fn build(self) -> Config {
        self.0
    }
}

/// Upload pipeline configuration (§4.4).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Files smaller than this stay in the in-memory sink; larger ones spill
    /// to disk. `None` means always disk.
    pub memory_threshold_bytes: u64,
    pub max_file_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub verify_signature: bool,
    pub fsync_on_close: bool,
    pub virus_scan: bool,
    /// Directory uploads are written to. Empty means `std::env::temp_dir()`.
    pub temp_directory: PathBuf,
    /// Size of the pieces a buffered or streamed field is split into before
    /// each is handed to the sink's `write`.
    pub chunk_size: usize,
    /// Byte count at which an in-progress upload spills from the in-memory
    /// buffer to the disk sink, independent of the final-size-based
    /// `memory_threshold_bytes` check used when the size is known upfront.
    pub stream_threshold: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            memory_threshold_bytes: 1024 * 1024,
            max_file_bytes: 100 * 1024 * 1024,
            allowed_mime_types: Vec::new(),
            verify_signature: true,
            fsync_on_close: false,
            virus_scan: false,
            temp_directory: PathBuf::new(),
            chunk_size: 64 * 1024,
            stream_threshold: 1024 * 1024,
        }
    }
}

/// Cache engine configuration (§4.7).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub default_ttl: Option<Duration>,
    pub bucket_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_ttl: Some(Duration::from_secs(300)),
            bucket_count: 1024,
        }
    }
}

/// Task engine configuration (§4.8).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub auto_scale: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: 32,
            queue_capacity: 4096,
            default_timeout: Duration::from_secs(30),
            max_retries: 3,
            auto_scale: true,
        }
    }
}

/// Placeholder for future DI-container configuration (currently empty;
/// scopes and bindings are registered programmatically).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DiConfig {}
