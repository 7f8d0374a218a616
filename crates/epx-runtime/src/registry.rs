use std::collections::BTreeMap;
use std::sync::Arc;

use epx_integrity::IntegrityConfig;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{spawn_session, RuntimeError, SessionHandle, SessionSnapshot};

/// Live sessions by attempt id. Owned by the composing process (daemon).
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<BTreeMap<Uuid, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and register a session. An existing attempt id returns the
    /// already-running handle untouched.
    pub async fn open(
        &self,
        attempt_id: Uuid,
        student_id: impl Into<String>,
        exam_id: Option<String>,
        cfg: IntegrityConfig,
    ) -> SessionHandle {
        let mut map = self.inner.write().await;
        map.entry(attempt_id)
            .or_insert_with(|| spawn_session(attempt_id, student_id, exam_id, cfg))
            .clone()
    }

    pub async fn get(&self, attempt_id: Uuid) -> Result<SessionHandle, RuntimeError> {
        self.inner
            .read()
            .await
            .get(&attempt_id)
            .cloned()
            .ok_or(RuntimeError::UnknownAttempt(attempt_id))
    }

    /// Drop the registry's handle. The task exits once no other handle is held.
    pub async fn remove(&self, attempt_id: Uuid) -> Option<SessionHandle> {
        self.inner.write().await.remove(&attempt_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Snapshots of every session, in attempt-id order.
    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.inner
            .read()
            .await
            .values()
            .map(SessionHandle::snapshot)
            .collect()
    }
}
