//! Finding the service account for a batch run.
//!
//! Inline JSON in the `ROUTES_SERVICE_ACCOUNT` environment variable wins. Otherwise the key file
//! is read. Having neither is an error.
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SERVICE_ACCOUNT_ENV: &str = "ROUTES_SERVICE_ACCOUNT";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
}

impl Credentials {
    /// Bucket holding the GPX files and the published artifacts
    pub fn bucket(&self) -> String {
        self.storage_bucket
            .clone()
            .unwrap_or_else(|| format!("{}.appspot.com", self.project_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("ROUTES_SERVICE_ACCOUNT is not valid JSON: {0}")]
    InvalidEnvJson(#[source] serde_json::Error),

    #[error(
        "No credentials found. Set the ROUTES_SERVICE_ACCOUNT environment variable to a JSON string, or place a key file at {}",
        .key_path.display()
    )]
    Missing { key_path: PathBuf },

    #[error("Could not read key file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key file {} is not valid JSON: {source}", .path.display())]
    InvalidKeyFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Load credentials from the environment, or else `key_path`
pub fn load_credentials(key_path: &Path) -> Result<Credentials, CredentialsError> {
    credentials_from(std::env::var(SERVICE_ACCOUNT_ENV).ok(), key_path)
}

/// `env_value` is the value of [`SERVICE_ACCOUNT_ENV`], if set. An empty value counts as unset.
pub fn credentials_from(
    env_value: Option<String>,
    key_path: &Path,
) -> Result<Credentials, CredentialsError> {
    if let Some(json) = env_value.filter(|v| !v.is_empty()) {
        return serde_json::from_str(&json).map_err(CredentialsError::InvalidEnvJson);
    }
    if !key_path.exists() {
        return Err(CredentialsError::Missing {
            key_path: key_path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(key_path).map_err(|source| CredentialsError::Io {
        path: key_path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CredentialsError::InvalidKeyFile {
        path: key_path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_wins() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("serviceAccountKey.json");
        std::fs::write(&key, r#"{"project_id": "from-file"}"#).unwrap();

        let creds = credentials_from(
            Some(r#"{"project_id": "from-env", "client_email": "ci@example.com"}"#.to_string()),
            &key,
        )
        .unwrap();
        assert_eq!(creds.project_id, "from-env");
        assert_eq!(creds.bucket(), "from-env.appspot.com");

        let creds = credentials_from(None, &key).unwrap();
        assert_eq!(creds.project_id, "from-file");
    }

    #[test]
    fn bad_env_json() {
        let err = credentials_from(Some("{nope".to_string()), Path::new("/nonexistent")).unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidEnvJson(_)));
        assert!(err.to_string().contains("is not valid JSON"));
    }

    #[test]
    fn empty_env_falls_back_to_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("serviceAccountKey.json");
        std::fs::write(&key, r#"{"project_id": "from-file"}"#).unwrap();
        let creds = credentials_from(Some(String::new()), &key).unwrap();
        assert_eq!(creds.project_id, "from-file");

        let err = credentials_from(Some(String::new()), &dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, CredentialsError::Missing { .. }));
    }

    #[test]
    fn nothing_configured() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("serviceAccountKey.json");
        let err = credentials_from(None, &key).unwrap_err();
        assert!(matches!(err, CredentialsError::Missing { .. }));
        assert!(err.to_string().contains(SERVICE_ACCOUNT_ENV));
    }

    #[test]
    fn bad_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("serviceAccountKey.json");
        std::fs::write(&key, r#"{"client_email": "no project"}"#).unwrap();
        let err = credentials_from(None, &key).unwrap_err();
        assert!(matches!(err, CredentialsError::InvalidKeyFile { .. }));
    }

    #[test]
    fn explicit_bucket() {
        let creds: Credentials =
            serde_json::from_str(r#"{"project_id": "p", "storage_bucket": "b"}"#).unwrap();
        assert_eq!(creds.bucket(), "b");
    }
}
