//! Credential loading from a private `.env` file with process-env fallback.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Secrets referenced by name from the configuration.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
    env_fallback: bool,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .field("env_fallback", &self.env_fallback)
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map, without env fallback.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self {
            vars,
            env_fallback: false,
        }
    }

    /// Credentials backed only by the process environment.
    pub fn from_env() -> Self {
        Self {
            vars: BTreeMap::new(),
            env_fallback: true,
        }
    }

    /// Look up a value, consulting the process environment when the file
    /// does not define it. Blank values count as missing.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.vars.get(key).filter(|v| !v.trim().is_empty()) {
            return Some(value.clone());
        }
        if self.env_fallback {
            return std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        }
        None
    }

    /// Returns a required credential or an error when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is neither in the file nor the environment.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.get(key)
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }
}

/// Load credentials from a `.env` path, falling back to the process
/// environment for keys it does not define.
///
/// A missing file is not an error: all lookups then go to the environment.
///
/// # Errors
///
/// Returns an error if the file is group/world-readable or cannot be parsed.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        debug!(path = %path.display(), "no credentials file, using process environment");
        return Ok(Credentials::from_env());
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials {
        vars,
        env_fallback: true,
    })
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    Ok(())
}
