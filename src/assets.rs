use std::io;
use std::path::{Component, Path, PathBuf};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::ApiError;

pub const ENTRY_FILE: &str = "index.html";
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const CONTENT_TYPES: &[(&str, &str)] = &[
  ("html", "text/html; charset=utf-8"),
  ("htm", "text/html; charset=utf-8"),
  ("js", "application/javascript; charset=utf-8"),
  ("mjs", "application/javascript; charset=utf-8"),
  ("css", "text/css; charset=utf-8"),
  ("json", "application/json; charset=utf-8"),
  ("png", "image/png"),
  ("jpg", "image/jpeg"),
  ("jpeg", "image/jpeg"),
  ("gif", "image/gif"),
  ("webp", "image/webp"),
  ("svg", "image/svg+xml"),
  ("ico", "image/x-icon"),
];

pub fn content_type_for(path: &Path) -> &'static str {
  let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
    return DEFAULT_CONTENT_TYPE;
  };
  CONTENT_TYPES
    .iter()
    .find(|(known, _)| known.eq_ignore_ascii_case(ext))
    .map(|(_, content_type)| *content_type)
    .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Lexically resolves a URL path to a path relative to the static root.
/// Segments are percent-decoded one at a time after splitting, so an encoded
/// separator or dot segment can never add a path level. Anything that would
/// climb above the root is refused.
pub fn relative_path(request_path: &str) -> Result<PathBuf, ApiError> {
  let trimmed = request_path.trim_start_matches('/');
  let mut relative = PathBuf::new();

  for component in Path::new(trimmed).components() {
    match component {
      Component::Normal(part) => relative.push(decode_segment(part.to_str(), request_path)?),
      Component::CurDir => {}
      Component::ParentDir => {
        if !relative.pop() {
          return Err(forbidden(request_path));
        }
      }
      Component::RootDir | Component::Prefix(_) => return Err(forbidden(request_path)),
    }
  }

  if relative.as_os_str().is_empty() {
    relative.push(ENTRY_FILE);
  }
  Ok(relative)
}

/// Serves one file from `root`. Symlinks are followed, but the final target
/// must still live under the root.
pub async fn serve(root: &Path, request_path: &str) -> Result<Response, ApiError> {
  let relative = relative_path(request_path)?;

  let root = tokio::fs::canonicalize(root)
    .await
    .map_err(|_| not_found(&relative))?;
  let target = match tokio::fs::canonicalize(root.join(&relative)).await {
    Ok(target) => target,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(not_found(&relative)),
    Err(err) => {
      debug!(error = %err, path = %relative.display(), "cannot resolve static file");
      return Err(not_found(&relative));
    }
  };

  if !target.starts_with(&root) {
    return Err(forbidden(request_path));
  }

  let metadata = tokio::fs::metadata(&target)
    .await
    .map_err(|_| not_found(&relative))?;
  if !metadata.is_file() {
    return Err(not_found(&relative));
  }

  let bytes = tokio::fs::read(&target)
    .await
    .map_err(|_| not_found(&relative))?;
  Ok(
    (
      StatusCode::OK,
      [(header::CONTENT_TYPE, content_type_for(&target))],
      bytes,
    )
      .into_response(),
  )
}

fn decode_segment(raw: Option<&str>, request_path: &str) -> Result<String, ApiError> {
  let raw = raw.ok_or_else(|| forbidden(request_path))?;
  let decoded = percent_decode_str(raw)
    .decode_utf8()
    .map_err(|_| ApiError::NotFound(format!("Not found: {request_path}")))?;
  if decoded == "." || decoded == ".." || decoded.contains(&['/', '\\', '\0'][..]) {
    return Err(forbidden(request_path));
  }
  Ok(decoded.into_owned())
}

fn forbidden(request_path: &str) -> ApiError {
  ApiError::Forbidden(format!("Forbidden: {request_path}"))
}

fn not_found(relative: &Path) -> ApiError {
  ApiError::NotFound(format!("Not found: /{}", relative.display()))
}
