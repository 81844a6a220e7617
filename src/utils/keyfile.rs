//! API key file management
//!
//! On first run the server mints a random key and writes it to
//! `<data_dir>/api-key.txt`; on every subsequent run it reads the existing
//! file back rather than rotating the key under the operator.

use anyhow::{Context, Result};
use rand::RngCore;
use std::path::Path;

const KEY_BYTES: usize = 24;
const KEY_FILE_NAME: &str = "api-key.txt";

/// Load the persisted API key from `data_dir`, minting and writing a new
/// one if none exists yet.
pub async fn load_or_create(data_dir: &Path) -> Result<String> {
    let path = data_dir.join(KEY_FILE_NAME);

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let key = contents.trim().to_string();
            if key.is_empty() {
                generate_and_save(&path).await
            } else {
                Ok(key)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => generate_and_save(&path).await,
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn generate_and_save(path: &Path) -> Result<String> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }

    let key = generate_key();
    tokio::fs::write(path, &key)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    restrict_permissions(path).await;

    tracing::info!("Generated new API key at {}", path.display());
    Ok(key)
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await {
        tracing::warn!("Failed to restrict permissions on {}: {e}", path.display());
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

fn generate_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generated_key_is_hex_of_expected_length() {
        let key = generate_key();
        assert_eq!(key.len(), KEY_BYTES * 2);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn creates_then_reuses_key() {
        let dir = tempdir().unwrap();

        let first = load_or_create(dir.path()).await.unwrap();
        let second = load_or_create(dir.path()).await.unwrap();

        assert_eq!(first, second);
        assert!(dir.path().join(KEY_FILE_NAME).exists());
    }
}
