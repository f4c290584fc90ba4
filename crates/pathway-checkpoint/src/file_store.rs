use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use pathway_protocol::{
    ChannelValues, CheckpointMetadata, CheckpointSnapshot, CheckpointStore, ResearchError,
    ResearchResult, ThreadId,
};
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, instrument};

/// Reads the latest checkpoint of each thread from
/// `<root>/checkpoints/<thread_id>.json`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

/// Metadata-only view; channel values are skipped while parsing.
#[derive(Deserialize)]
struct MetadataDocument {
    metadata: CheckpointMetadata,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checkpoint_path(&self, thread_id: &ThreadId) -> Result<PathBuf> {
        let raw = thread_id.as_str();
        let is_plain = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !is_plain {
            bail!("thread id {raw:?} is not a valid checkpoint file name");
        }
        Ok(self.root.join("checkpoints").join(format!("{raw}.json")))
    }

    async fn read_document(path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("failed reading checkpoint {path:?}")),
        }
    }

    /// Writes `snapshot` as the latest checkpoint of its thread.
    pub async fn save(&self, snapshot: &CheckpointSnapshot) -> ResearchResult<()> {
        self.save_inner(snapshot).await.map_err(store_error)
    }

    async fn save_inner(&self, snapshot: &CheckpointSnapshot) -> Result<()> {
        let path = self.checkpoint_path(&snapshot.metadata.thread_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create checkpoint dir {parent:?}"))?;
        }
        let temp_path = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(snapshot).context("failed serializing checkpoint")?;
        fs::write(&temp_path, payload)
            .await
            .with_context(|| format!("failed writing checkpoint {temp_path:?}"))?;
        fs::rename(&temp_path, &path)
            .await
            .with_context(|| format!("failed publishing checkpoint {path:?}"))?;
        Ok(())
    }

    async fn latest_inner(&self, thread_id: &ThreadId) -> Result<Option<ChannelValues>> {
        let path = self.checkpoint_path(thread_id)?;
        let Some(raw) = Self::read_document(&path).await? else {
            return Ok(None);
        };
        let snapshot: CheckpointSnapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("failed parsing checkpoint {path:?}"))?;
        Ok(Some(snapshot.channel_values))
    }

    async fn metadata_inner(&self, thread_id: &ThreadId) -> Result<Option<CheckpointMetadata>> {
        let path = self.checkpoint_path(thread_id)?;
        let Some(raw) = Self::read_document(&path).await? else {
            return Ok(None);
        };
        let document: MetadataDocument = serde_json::from_slice(&raw)
            .with_context(|| format!("failed parsing checkpoint metadata {path:?}"))?;
        Ok(Some(document.metadata))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    #[instrument(skip(self), fields(thread_id = %thread_id))]
    async fn get_latest_checkpoint(
        &self,
        thread_id: &ThreadId,
    ) -> ResearchResult<Option<ChannelValues>> {
        let values = self.latest_inner(thread_id).await.map_err(store_error)?;
        debug!(found = values.is_some(), "checkpoint loaded");
        Ok(values)
    }

    #[instrument(skip(self), fields(thread_id = %thread_id))]
    async fn get_metadata(
        &self,
        thread_id: &ThreadId,
    ) -> ResearchResult<Option<CheckpointMetadata>> {
        self.metadata_inner(thread_id).await.map_err(store_error)
    }
}

fn store_error(error: anyhow::Error) -> ResearchError {
    ResearchError::CheckpointStore(format!("{error:#}"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use chrono::Utc;
    use pathway_protocol::{
        ChannelValues, CheckpointId, CheckpointMetadata, CheckpointSnapshot, CheckpointSource,
        CheckpointStore, ResearchError, ResearchResult, ThreadId,
    };
    use serde_json::json;
    use tokio::fs;

    use crate::FileCheckpointStore;

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn snapshot(thread_id: &ThreadId) -> CheckpointSnapshot {
        let mut channel_values = ChannelValues::new();
        channel_values.insert("messages".to_owned(), json!([]));
        channel_values.insert("research_brief".to_owned(), json!("pivot to product"));
        CheckpointSnapshot {
            metadata: CheckpointMetadata {
                checkpoint_id: CheckpointId::new_uuid(),
                thread_id: thread_id.clone(),
                step: 1,
                source: CheckpointSource::Input,
                next: vec!["clarify_with_user".to_owned()],
                pending_question: None,
                error: None,
                updated_at: Utc::now(),
            },
            channel_values,
        }
    }

    #[tokio::test]
    async fn saved_checkpoint_is_read_back() -> ResearchResult<()> {
        let root = unique_test_root("pathway-checkpoint-roundtrip");
        let store = FileCheckpointStore::new(&root);
        let thread_id = ThreadId::new_uuid();

        assert!(store.get_metadata(&thread_id).await?.is_none());
        assert!(store.get_latest_checkpoint(&thread_id).await?.is_none());

        store.save(&snapshot(&thread_id)).await?;
        let metadata = store.get_metadata(&thread_id).await?.expect("metadata");
        assert_eq!(metadata.next, vec!["clarify_with_user".to_owned()]);
        let values = store
            .get_latest_checkpoint(&thread_id)
            .await?
            .expect("values");
        assert_eq!(values["research_brief"], "pivot to product");

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn unparsable_checkpoint_is_a_store_error() -> ResearchResult<()> {
        let root = unique_test_root("pathway-checkpoint-corrupt");
        let store = FileCheckpointStore::new(&root);
        let thread_id = ThreadId::from_string("thread-1");
        let dir = root.join("checkpoints");
        fs::create_dir_all(&dir)
            .await
            .map_err(ResearchError::checkpoint_store)?;
        fs::write(dir.join("thread-1.json"), b"[1, 2")
            .await
            .map_err(ResearchError::checkpoint_store)?;

        let err = store.get_metadata(&thread_id).await.unwrap_err();
        assert!(matches!(err, ResearchError::CheckpointStore(_)));

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn path_like_thread_ids_are_rejected() {
        let store = FileCheckpointStore::new(unique_test_root("pathway-checkpoint-path"));
        let err = store
            .get_metadata(&ThreadId::from_string("../etc/passwd"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a valid checkpoint file name"));
    }
}
