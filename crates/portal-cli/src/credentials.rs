//! Node credentials file written after a successful registration.

use std::path::Path;

use portal_server::provision::Credentials;
use portal_server::server::RegisterResponse;
use serde::{Deserialize, Serialize};

/// What a node needs to re-register and reach its database.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCredentials {
    pub portal_url: String,
    pub node_uuid: String,
    pub node_name: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<Credentials>,
}

impl std::fmt::Debug for NodeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCredentials")
            .field("portal_url", &self.portal_url)
            .field("node_uuid", &self.node_uuid)
            .field("node_name", &self.node_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("db", &self.db)
            .finish()
    }
}

impl NodeCredentials {
    /// Fold a registration response into the stored credentials.
    ///
    /// Secrets only present after creation or rotation overwrite the stored
    /// ones; otherwise the previous values are kept. `None` when there is
    /// neither a previous file nor a fresh client secret.
    pub fn merge(
        previous: Option<Self>,
        portal_url: &str,
        resp: &RegisterResponse,
    ) -> Option<Self> {
        let (client_id, client_secret) = match (&resp.secrets, &previous) {
            (Some(s), _) => (s.client_id.clone(), s.client_secret.clone()),
            (None, Some(p)) => (p.client_id.clone(), p.client_secret.clone()),
            (None, None) => return None,
        };

        let db = match (&resp.db, previous.and_then(|p| p.db)) {
            (Some(fresh), _) if fresh.password.is_some() => Some(fresh.clone()),
            (Some(fresh), Some(old)) if old.names() == fresh.names() => Some(Credentials {
                rotated_at: fresh.rotated_at.or(old.rotated_at),
                ..old
            }),
            (Some(fresh), _) => Some(fresh.clone()),
            (None, old) => old,
        };

        Some(Self {
            portal_url: portal_url.to_string(),
            node_uuid: resp.node.uuid.clone(),
            node_name: resp.node.name.clone(),
            client_id,
            client_secret,
            db,
        })
    }

    pub fn load(path: &Path) -> portal_core::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            portal_core::Error::Validation(format!(
                "cannot read credentials file {}: {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write as JSON with owner-only permissions.
    pub fn save(&self, path: &Path) -> portal_core::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;

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
            file.write_all(json.as_bytes())?;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        #[cfg(not(unix))]
        std::fs::write(path, json)?;

        Ok(())
    }
}
