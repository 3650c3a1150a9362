use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_STATIC_ROOT: &str = "public";
pub const ENV_FILE: &str = ".env";

/// Process-wide settings, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
  pub api_key: String,
  pub host: String,
  pub port: u16,
  pub api_base: String,
  pub static_root: PathBuf,
  pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      host: DEFAULT_HOST.to_string(),
      port: DEFAULT_PORT,
      api_base: DEFAULT_API_BASE.to_string(),
      static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
      log_file: None,
    }
  }
}

impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AppConfig")
      .field("api_key", &if self.has_api_key() { "set" } else { "MISSING" })
      .field("host", &self.host)
      .field("port", &self.port)
      .field("api_base", &self.api_base)
      .field("static_root", &self.static_root)
      .field("log_file", &self.log_file)
      .finish()
  }
}

impl AppConfig {
  pub fn from_env() -> anyhow::Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Builds the config from an arbitrary variable source. Blank values count as unset.
  pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| {
      lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    };
    let defaults = Self::default();

    let port = match get("PORT") {
      Some(raw) => raw
        .parse::<u16>()
        .with_context(|| format!("invalid PORT value {raw:?}"))?,
      None => defaults.port,
    };

    Ok(Self {
      api_key: get("GROQ_API_KEY").unwrap_or_default(),
      host: get("HOST").unwrap_or(defaults.host),
      port,
      api_base: get("GROQ_API_BASE")
        .map(|base| base.trim_end_matches('/').to_string())
        .unwrap_or(defaults.api_base),
      static_root: get("STATIC_ROOT").map(PathBuf::from).unwrap_or(defaults.static_root),
      log_file: get("LOG_FILE").map(PathBuf::from),
    })
  }

  pub fn has_api_key(&self) -> bool {
    !self.api_key.is_empty()
  }
}

/// Merges `KEY=VALUE` lines from `path` into the process environment.
///
/// Missing files are not an error. Variables that are already set keep their
/// value, and lines that fail to parse are skipped. Returns how many entries
/// were applied.
pub fn load_env_file(path: &Path) -> anyhow::Result<usize> {
  if !path.exists() {
    return Ok(0);
  }

  let contents = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;

  let mut applied = 0;
  for (idx, line) in contents.lines().enumerate() {
    let Some((key, value)) = parse_env_line(line) else {
      if !is_blank_or_comment(line) {
        debug!("skipping malformed line {} in {}", idx + 1, path.display());
      }
      continue;
    };
    if env::var_os(&key).is_some() {
      continue;
    }
    env::set_var(&key, value);
    applied += 1;
  }
  Ok(applied)
}

/// Parses one `.env` line. Quoted values, `export` prefixes and trailing
/// comments go through dotenvy; a line it refuses (an unquoted value with
/// spaces, say) is split at the first `=` with both sides trimmed.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  if is_blank_or_comment(line) {
    return None;
  }
  let line = line.trim();

  if let Some(Ok((key, value))) = dotenvy::from_read_iter(line.as_bytes()).next() {
    let key = key.trim();
    if key.is_empty() {
      return None;
    }
    return Some((key.to_string(), value.trim().to_string()));
  }

  let (key, value) = line.split_once('=')?;
  let key = key.trim();
  if key.is_empty() || key.contains(char::is_whitespace) {
    return None;
  }
  Some((key.to_string(), value.trim().to_string()))
}

fn is_blank_or_comment(line: &str) -> bool {
  let line = line.trim();
  line.is_empty() || line.starts_with('#')
}
