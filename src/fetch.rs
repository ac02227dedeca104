use std::sync::Arc;

/// Origin for resource content. Must be idempotent: repeated calls for the same key return
/// equivalent content within a freshness window.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait::async_trait]
impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (**self).fetch(key).await
    }
}
