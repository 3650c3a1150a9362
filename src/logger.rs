use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "groq_relay=info,tower_http=info";

/// Installs the global subscriber. Lines go to stderr and, when `log_path` is
/// given, are appended to that file as well.
pub fn init(log_path: Option<&Path>) -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let stderr_layer = fmt::layer()
    .with_timer(ChronoUtc::rfc_3339())
    .with_writer(std::io::stderr);

  let file_layer = match log_path {
    Some(path) => {
      let file = OpenOptions::new().create(true).append(true).open(path)?;
      Some(
        fmt::layer()
          .with_timer(ChronoUtc::rfc_3339())
          .with_ansi(false)
          .with_writer(Mutex::new(file)),
      )
    }
    None => None,
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(stderr_layer)
    .with(file_layer)
    .try_init()?;

  install_panic_hook();
  Ok(())
}

/// Panics inside request handlers are caught by the router; this makes sure
/// they still show up in the log with their location.
fn install_panic_hook() {
  std::panic::set_hook(Box::new(|info| {
    let location = info
      .location()
      .map(|l| format!("{}:{}", l.file(), l.line()))
      .unwrap_or_else(|| "unknown".to_string());
    let message = info
      .payload()
      .downcast_ref::<&str>()
      .map(|s| s.to_string())
      .or_else(|| info.payload().downcast_ref::<String>().cloned())
      .unwrap_or_else(|| "non-string panic payload".to_string());
    tracing::error!(target: "fatal", %location, "panic: {message}");
  }));
}
