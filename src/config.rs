use crate::error::{ConfigErrorKind, StartupError};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 1500;
pub const DEFAULT_BANNED_WORDS: &str = "badwords.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    #[default]
    CrLf,
}

impl FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" => Ok(LineEnding::Lf),
            "crlf" => Ok(LineEnding::CrLf),
            other => Err(format!("expected \"lf\" or \"crlf\", got {other:?}")),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "chat-relay", version, about = "Single-room text chat relay")]
pub struct Cli {
    /// Port to listen on (default 1500)
    pub port: Option<u16>,

    /// File with one banned word per line (default: badwords.txt)
    pub banned_words: Option<PathBuf>,

    /// Optional TOML config file, applied before environment and arguments
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,                // e.g. "0.0.0.0"
    pub port: u16,                   // e.g. 1500
    pub banned_words_path: PathBuf,  // e.g. "badwords.txt"
    pub outbound_capacity: usize,    // frames queued per session
    pub max_line_len: usize,         // bytes per inbound line
    pub line_ending: LineEnding,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            banned_words_path: PathBuf::from(DEFAULT_BANNED_WORDS),
            outbound_capacity: 64,
            max_line_len: 4096,
            line_ending: LineEnding::CrLf,
        }
    }
}

/// Every field optional; only the ones present override.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    banned_words: Option<PathBuf>,
    outbound_capacity: Option<usize>,
    max_line_len: Option<usize>,
    line_ending: Option<LineEnding>,
}

impl Config {
    /// Defaults, then `--config` file, then `.env`/environment, then positional arguments.
    pub fn resolve(cli: &Cli) -> Result<Self, StartupError> {
        let _ = dotenvy::from_filename(".env");

        let mut cfg = Self::default();
        if let Some(path) = &cli.config {
            cfg = cfg.with_file(path)?;
        }
        let cfg = cfg.with_env(|k| std::env::var(k).ok())?;
        Ok(cfg.with_cli(cli))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StartupError> {
        Self::default().with_file(path)
    }

    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, StartupError> {
        let path = path.as_ref();
        let err = |source| StartupError::Config { path: path.to_path_buf(), source };

        let data = std::fs::read_to_string(path).map_err(|e| err(ConfigErrorKind::Read(e)))?;
        let file: FileConfig = toml::from_str(&data).map_err(|e| err(ConfigErrorKind::Parse(e)))?;

        Ok(Self {
            host: file.host.unwrap_or(self.host),
            port: file.port.unwrap_or(self.port),
            banned_words_path: file.banned_words.unwrap_or(self.banned_words_path),
            outbound_capacity: file.outbound_capacity.unwrap_or(self.outbound_capacity),
            max_line_len: file.max_line_len.unwrap_or(self.max_line_len),
            line_ending: file.line_ending.unwrap_or(self.line_ending),
        })
    }

    pub fn with_env<F>(mut self, var: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(key: &str, value: String) -> Result<T, StartupError> {
            value
                .trim()
                .parse()
                .map_err(|_| StartupError::Env(ConfigErrorKind::InvalidEnv(key.to_string(), value)))
        }

        if let Some(v) = var("RELAY_HOST") {
            self.host = v;
        }
        if let Some(v) = var("RELAY_PORT") {
            self.port = parsed("RELAY_PORT", v)?;
        }
        if let Some(v) = var("RELAY_BANNED_WORDS") {
            self.banned_words_path = PathBuf::from(v);
        }
        if let Some(v) = var("RELAY_OUTBOUND_CAPACITY") {
            self.outbound_capacity = parsed("RELAY_OUTBOUND_CAPACITY", v)?;
        }
        if let Some(v) = var("RELAY_MAX_LINE_LEN") {
            self.max_line_len = parsed("RELAY_MAX_LINE_LEN", v)?;
        }
        if let Some(v) = var("RELAY_LINE_ENDING") {
            self.line_ending = parsed("RELAY_LINE_ENDING", v)?;
        }
        Ok(self)
    }

    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(path) = &cli.banned_words {
            self.banned_words_path = path.clone();
        }
        self
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
