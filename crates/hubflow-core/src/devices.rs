//! Device-id source

use crate::error::{DeployError, Result};
use std::path::{Path, PathBuf};

/// Appended to the device-id file name to form the key-store path
pub const KEY_STORE_SUFFIX: &str = ".keys";

/// `<device-id-file>.keys`, next to the device-id file
pub fn keys_path(device_ids_file: &Path) -> PathBuf {
    let mut path = device_ids_file.as_os_str().to_owned();
    path.push(KEY_STORE_SUFFIX);
    PathBuf::from(path)
}

/// One device id per line, trimmed; blank lines are skipped and duplicates kept
pub fn parse_device_ids(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn load_device_ids(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeployError::InvalidInput(format!("device-id file {} does not exist", path.display()))
        } else {
            DeployError::io(path, e)
        }
    })?;
    Ok(parse_device_ids(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_path() {
        assert_eq!(
            keys_path(Path::new("/data/devices.txt")),
            PathBuf::from("/data/devices.txt.keys")
        );
        assert_eq!(keys_path(Path::new("ids")), PathBuf::from("ids.keys"));
    }

    #[test]
    fn test_parse_device_ids() {
        let ids = parse_device_ids("dev-1\n  dev-2 \r\n\n\t\ndev-1\n");
        assert_eq!(ids, vec!["dev-1", "dev-2", "dev-1"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_device_ids("").is_empty());
        assert!(parse_device_ids("\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_input_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_device_ids(&temp_dir.path().join("nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_load_device_ids() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("devices.txt");
        std::fs::write(&path, "a\nb\n").unwrap();
        assert_eq!(load_device_ids(&path).await.unwrap(), vec!["a", "b"]);
    }
}
