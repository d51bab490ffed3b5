//! JSON persistence helpers
//!
//! Writes go to a sibling temp file which is synced and renamed over the
//! target, so readers never observe a half-written record.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{SignatureError, SignatureResult};

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `value` pretty-printed and replace `path` with it
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> SignatureResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = temp_path_for(path);

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| SignatureError::write_failed(&tmp, e))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| SignatureError::write_failed(&tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| SignatureError::write_failed(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path)
        .await
        .map_err(|e| SignatureError::write_failed(path, e))
}

/// Read and parse a JSON file
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> SignatureResult<T> {
    let json = fs::read_to_string(path)
        .await
        .map_err(|e| SignatureError::read_failed(path, e))?;
    Ok(serde_json::from_str(&json)?)
}

/// Fail with `FILE_NOT_FOUND` unless `path` is an existing regular file
pub async fn require_file(path: &Path) -> SignatureResult<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(SignatureError::file_not_found(path)),
        Err(e) => Err(SignatureError::read_failed(path, e)),
    }
}

/// Read a whole file
pub async fn read_file(path: &Path) -> SignatureResult<Vec<u8>> {
    fs::read(path)
        .await
        .map_err(|e| SignatureError::read_failed(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");

        write_json(&path, &json!({"a": 1})).await.unwrap();
        let value: serde_json::Value = read_json(&path).await.unwrap();
        assert_eq!(value["a"], 1);
        assert!(!temp_path_for(&path).exists());

        // Overwrite is a full replacement
        write_json(&path, &json!({"b": 2})).await.unwrap();
        let value: serde_json::Value = read_json(&path).await.unwrap();
        assert!(value.get("a").is_none());
    }

    #[tokio::test]
    async fn test_missing_parent_reports_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent").join("record.json");

        let err = write_json(&path, &json!({})).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DirectoryNotFound);
    }

    #[tokio::test]
    async fn test_require_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        assert_eq!(
            require_file(&path).await.unwrap_err().code(),
            ErrorCode::FileNotFound
        );
        fs::write(&path, b"abc").await.unwrap();
        assert_eq!(require_file(&path).await.unwrap(), 3);
        assert!(require_file(dir.path()).await.is_err());
    }
}
