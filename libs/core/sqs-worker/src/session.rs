//! Lazily constructed, memoized queue client
//!
//! The first caller's connection profile decides how the client is built.
//! Later callers get the same client, whatever profile they pass.

use crate::client::QueueClient;
use crate::config::ConnectionProfile;
use crate::error::WorkerError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Creates queue clients from a connection profile
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self, profile: &ConnectionProfile)
    -> Result<Arc<dyn QueueClient>, WorkerError>;
}

/// Shared session handing out one queue client per provider
pub struct SessionProvider {
    factory: Option<Arc<dyn ClientFactory>>,
    client: OnceCell<Arc<dyn QueueClient>>,
}

impl SessionProvider {
    /// Build the client on first use through `factory`
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self {
            factory: Some(Arc::new(factory)),
            client: OnceCell::new(),
        }
    }

    /// Use an already constructed client
    pub fn with_client(client: Arc<dyn QueueClient>) -> Self {
        Self {
            factory: None,
            client: OnceCell::new_with(Some(client)),
        }
    }

    /// Get the client, constructing it on first call
    pub async fn client(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Arc<dyn QueueClient>, WorkerError> {
        self.client
            .get_or_try_init(|| async {
                let factory = self.factory.as_ref().ok_or_else(|| {
                    WorkerError::Session("no client factory configured".into())
                })?;
                debug!(region = ?profile.region, "Creating queue client");
                factory.connect(profile).await
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockQueueClient;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl ClientFactory for CountingFactory {
        async fn connect(
            &self,
            _profile: &ConnectionProfile,
        ) -> Result<Arc<dyn QueueClient>, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(WorkerError::Session("unreachable endpoint".into()));
            }
            Ok(Arc::new(MockQueueClient::new()))
        }
    }

    #[tokio::test]
    async fn test_client_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SessionProvider::new(CountingFactory {
            calls: calls.clone(),
            fail: false,
        });
        assert!(!provider.is_initialized());

        let first = provider
            .client(&ConnectionProfile::default().with_region("eu-west-1"))
            .await
            .unwrap();
        let second = provider
            .client(&ConnectionProfile::default().with_region("us-east-1"))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(provider.is_initialized());
    }

    #[tokio::test]
    async fn test_construction_failure_propagates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = SessionProvider::new(CountingFactory {
            calls: calls.clone(),
            fail: true,
        });

        let err = provider
            .client(&ConnectionProfile::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(!provider.is_initialized());
    }

    #[tokio::test]
    async fn test_with_client() {
        let client: Arc<dyn QueueClient> = Arc::new(MockQueueClient::new());
        let provider = SessionProvider::with_client(client.clone());
        let resolved = provider.client(&ConnectionProfile::default()).await.unwrap();
        assert!(Arc::ptr_eq(&client, &resolved));
    }
}
