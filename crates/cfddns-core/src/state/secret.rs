// # Key File
//
// File-backed storage for the credential encryption key.
//
// The key is generated once, written base64-encoded with owner-only
// permissions and reused on every start. Losing the file makes sealed
// credentials unreadable; the operator re-enters the API key.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::crypt::{CredentialCipher, KEY_LEN};
use crate::error::{Error, Result};

/// The symmetric key backing a [`CredentialCipher`]
pub struct KeyFile {
    path: PathBuf,
    key: Vec<u8>,
}

impl std::fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFile")
            .field("path", &self.path)
            .field("key", &"<REDACTED>")
            .finish()
    }
}

impl KeyFile {
    /// Load the key at `path`, generating and writing a new one if the file
    /// does not exist
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if path.exists() {
            let key = Self::read(&path)?;
            tracing::debug!("Loaded key file {}", path.display());
            return Ok(Self { path, key });
        }

        let key = CredentialCipher::generate_key();
        Self::write(&path, &key)?;
        tracing::info!("Generated new key file {}", path.display());

        Ok(Self { path, key })
    }

    /// Build a cipher from this key
    pub fn cipher(&self) -> Result<CredentialCipher> {
        CredentialCipher::new(&self.key)
    }

    fn read(path: &Path) -> Result<Vec<u8>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::crypto(format!("Failed to read key file {}: {}", path.display(), e))
        })?;

        let key = BASE64.decode(content.trim()).map_err(|e| {
            Error::crypto(format!("Key file {} is not valid base64: {}", path.display(), e))
        })?;

        if key.len() != KEY_LEN {
            return Err(Error::crypto(format!(
                "Key file {} holds {} bytes, expected {}",
                path.display(),
                key.len(),
                KEY_LEN
            )));
        }

        Ok(key)
    }

    fn write(path: &Path, key: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        use std::io::Write;
        let mut file = options.open(path).map_err(|e| {
            Error::crypto(format!("Failed to create key file {}: {}", path.display(), e))
        })?;
        file.write_all(BASE64.encode(key).as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        Ok(())
    }
}
