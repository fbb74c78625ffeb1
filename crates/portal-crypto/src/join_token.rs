//! On-disk persistence of the cluster join token.

use std::path::Path;

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::generate_join_token;

/// A join token read from or written to a file with owner-only permissions.
pub struct JoinTokenFile {
    token: Zeroizing<String>,
}

impl std::fmt::Debug for JoinTokenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinTokenFile")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl JoinTokenFile {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }

    /// A freshly generated token.
    pub fn generate() -> Self {
        Self::new(generate_join_token())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Write the token to `path` (mode 0600), creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)?;
            file.write_all(self.token.as_bytes())?;
            file.write_all(b"\n")?;
            // An existing file keeps its old mode through `open`.
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        #[cfg(not(unix))]
        std::fs::write(path, format!("{}\n", self.token.as_str()))?;

        Ok(())
    }

    /// Read a token from `path`.
    ///
    /// On Unix, refuses files readable by group or others.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                return Err(CryptoError::InsecurePermissions {
                    path: path.display().to_string(),
                    mode,
                });
            }
        }

        let content = Zeroizing::new(std::fs::read_to_string(path)?);
        let token = content.trim();
        if token.is_empty() {
            return Err(CryptoError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("join token file {} is empty", path.display()),
            )));
        }
        Ok(Self::new(token))
    }

    /// Load the token at `path`, or generate and save a new one.
    ///
    /// Returns the token and whether it was newly created.
    pub fn load_or_generate(path: &Path) -> Result<(Self, bool), CryptoError> {
        if path.exists() {
            Ok((Self::load(path)?, false))
        } else {
            let token = Self::generate();
            token.save(path)?;
            Ok((token, true))
        }
    }
}
