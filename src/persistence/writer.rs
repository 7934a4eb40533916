use serde::Serialize;
use std::path::Path;

use crate::error::{Result, WatchError};

/// Write `value` as pretty JSON so readers never see a partial file.
///
/// The body goes to a sibling `*.json.tmp` first and is then renamed over
/// the target.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let body = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        WatchError::Persistence(format!(
            "rename {} -> {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;
    Ok(())
}
