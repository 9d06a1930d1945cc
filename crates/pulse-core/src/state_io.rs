//! Atomic writes and JSON state persistence for the durable stores.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::time_utils::current_unix_timestamp_ms;

/// Writes text using a temp file + rename so readers never observe partial data.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.exists() && path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("state"),
        std::process::id(),
        current_unix_timestamp_ms()
    );
    let temp_path = parent_dir.join(temp_name);
    std::fs::write(&temp_path, content)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to replace {} with temporary file {}",
            path.display(),
            temp_path.display()
        )
    })?;
    Ok(())
}

/// Loads a JSON state file, returning `None` when the file does not exist yet.
pub fn load_json_state<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let state = serde_json::from_str::<T>(&raw)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    Ok(Some(state))
}

/// Serializes a state value as pretty JSON and writes it atomically.
pub fn save_json_state<T: Serialize>(path: &Path, state: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(state)
        .with_context(|| format!("failed to serialize state for {}", path.display()))?;
    payload.push('\n');
    write_text_atomic(path, &payload)
}
