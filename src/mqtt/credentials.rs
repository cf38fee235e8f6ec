//! Access token refresh.

use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use tracing::debug;

use super::error::BridgeError;

/// Produces a fresh access token. Called once per reconnect attempt.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn refresh(&self) -> Result<String, BridgeError>;
}

#[async_trait]
impl<F, Fut> CredentialSource for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, BridgeError>> + Send + 'static,
{
    async fn refresh(&self) -> Result<String, BridgeError> {
        (self)().await
    }
}

/// Reads the token from a file on every refresh, so an external login helper can keep
/// it current.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    path: PathBuf,
}

impl FileCredentialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn read_token(&self) -> Result<String, BridgeError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let token = content.trim();
        if token.is_empty() {
            return Err(BridgeError::Credential(format!(
                "token file {} is empty",
                self.path.display()
            )));
        }
        debug!("Read access token from {}", self.path.display());
        Ok(token.to_string())
    }
}

#[async_trait]
impl CredentialSource for FileCredentialSource {
    async fn refresh(&self) -> Result<String, BridgeError> {
        self.read_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "miraie-bridge-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_file_source_trims_token() {
        let path = temp_file("token", "  abc.def.ghi\n");
        let source = FileCredentialSource::new(&path);
        assert_eq!(source.refresh().await.unwrap(), "abc.def.ghi");
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_file_source_rejects_empty_file() {
        let path = temp_file("empty", "\n");
        let source = FileCredentialSource::new(&path);
        assert!(matches!(
            source.refresh().await,
            Err(BridgeError::Credential(_))
        ));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_closures_are_credential_sources() {
        let source = || async { Ok::<_, BridgeError>("fresh".to_string()) };
        assert_eq!(CredentialSource::refresh(&source).await.unwrap(), "fresh");
    }
}
