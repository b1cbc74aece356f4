use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use shared::Result;
use taleshelf::ports::ObjectStorage;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Object storage bucket kept in memory. Public URLs are `<base_url>/<path>`.
#[derive(Debug)]
pub struct MemoryObjectStorage {
    base_url: String,
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: DashMap::new(),
        }
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.get(path).map(|o| o.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        debug!(path, size = bytes.len(), "store object");
        self.objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn remove(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            self.objects.remove(path);
        }
        Ok(())
    }
}
