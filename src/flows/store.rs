//! Flow persistence

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::TradeFlow;
use crate::common::errors::{EngineError, Result};

/// Durable storage for trade flows, written after every transition
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn save(&self, flow: &TradeFlow) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<Option<TradeFlow>>;

    /// All flows, oldest first
    async fn list(&self) -> Result<Vec<TradeFlow>>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<Uuid, TradeFlow>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn save(&self, flow: &TradeFlow) -> Result<()> {
        self.flows.write().await.insert(flow.id, flow.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<TradeFlow>> {
        Ok(self.flows.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<TradeFlow>> {
        let mut flows: Vec<_> = self.flows.read().await.values().cloned().collect();
        flows.sort_by_key(|f| f.created_at);
        Ok(flows)
    }
}

/// One JSON file per flow under a directory
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash never leaves a half-written flow behind.
#[derive(Debug, Clone)]
pub struct JsonDirFlowStore {
    dir: PathBuf,
}

impl JsonDirFlowStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl FlowStore for JsonDirFlowStore {
    async fn save(&self, flow: &TradeFlow) -> Result<()> {
        let path = self.path_for(flow.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(flow)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(flow = %flow.id, stage = %flow.stage, "Flow saved");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<TradeFlow>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(|e| {
                EngineError::Persistence(format!("corrupt flow file for {}: {}", id, e))
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<TradeFlow>> {
        let mut flows = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<TradeFlow>(&bytes) {
                Ok(flow) => flows.push(flow),
                Err(e) => warn!(path = %path.display(), "Skipping unreadable flow file: {}", e),
            }
        }
        flows.sort_by_key(|f| f.created_at);
        Ok(flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::TradeSide;
    use crate::flows::types::FlowStage;

    fn flow() -> TradeFlow {
        TradeFlow::new(TradeSide::Buy, 1, "0xcurve", "0xme", 10, 5_000).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryFlowStore::new();
        let mut f = flow();
        store.save(&f).await.unwrap();

        f.advance(FlowStage::Approving).unwrap();
        store.save(&f).await.unwrap();

        assert_eq!(store.load(f.id).await.unwrap(), Some(f.clone()));
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_dir_persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("flows-{}", Uuid::new_v4()));
        let store = JsonDirFlowStore::open(&dir).await.unwrap();
        let first = flow();
        let mut second = flow();
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.save(&second).await.unwrap();
        store.save(&first).await.unwrap();
        tokio::fs::write(dir.join("notes.txt"), b"ignored").await.unwrap();

        let reopened = JsonDirFlowStore::open(&dir).await.unwrap();
        assert_eq!(reopened.load(first.id).await.unwrap(), Some(first.clone()));
        let ids: Vec<_> = reopened.list().await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_dir_corrupt_file_is_persistence_error() {
        let dir = std::env::temp_dir().join(format!("flows-{}", Uuid::new_v4()));
        let store = JsonDirFlowStore::open(&dir).await.unwrap();
        let id = Uuid::new_v4();
        tokio::fs::write(dir.join(format!("{}.json", id)), b"{not json")
            .await
            .unwrap();

        assert!(matches!(
            store.load(id).await,
            Err(EngineError::Persistence(_))
        ));
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
