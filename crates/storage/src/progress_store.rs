use std::sync::Arc;

use collect_core::model::CollectionProgress;
use tracing::{debug, warn};

use crate::repository::{KeyValueSlot, StorageError};

/// Slot holding the serialized collection progress.
pub const PROGRESS_SLOT_KEY: &str = "collection_progress";

/// Saves and restores `CollectionProgress` as one JSON blob in a single slot.
///
/// Callers save at question-increment boundaries and on explicit pauses.
/// Two processes sharing a slot are not coordinated; the last write wins.
#[derive(Clone)]
pub struct ProgressStore {
    slots: Arc<dyn KeyValueSlot>,
    key: String,
}

impl ProgressStore {
    #[must_use]
    pub fn new(slots: Arc<dyn KeyValueSlot>) -> Self {
        Self::with_key(slots, PROGRESS_SLOT_KEY)
    }

    #[must_use]
    pub fn with_key(slots: Arc<dyn KeyValueSlot>, key: impl Into<String>) -> Self {
        Self {
            slots,
            key: key.into(),
        }
    }

    /// Overwrite the slot with `progress`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails, or the backend's error
    /// if the write fails.
    pub async fn save(&self, progress: &CollectionProgress) -> Result<(), StorageError> {
        let blob = serde_json::to_string(progress)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.slots.set(&self.key, &blob).await?;
        debug!(
            key = %self.key,
            phase = progress.current_phase,
            records = progress.collected_data.len(),
            "progress saved"
        );
        Ok(())
    }

    /// Load saved progress.
    ///
    /// Missing, unreadable, or corrupt data all yield `None` so the caller
    /// starts fresh.
    pub async fn restore(&self) -> Option<CollectionProgress> {
        let blob = match self.slots.get(&self.key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %self.key, error = %err, "progress slot unreadable");
                return None;
            }
        };

        match serde_json::from_str::<CollectionProgress>(&blob) {
            Ok(progress) if progress.current_phase >= 1 => Some(progress),
            Ok(progress) => {
                warn!(
                    key = %self.key,
                    phase = progress.current_phase,
                    "ignoring saved progress with invalid phase"
                );
                None
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "ignoring corrupt saved progress");
                None
            }
        }
    }

    /// Remove the slot.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the removal fails.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.slots.remove(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemorySlot;
    use collect_core::model::{AnswerRecord, PersonalityCode, SessionId};
    use collect_core::time::fixed_now;

    fn store() -> (ProgressStore, InMemorySlot) {
        let slot = InMemorySlot::new();
        (ProgressStore::new(Arc::new(slot.clone())), slot)
    }

    fn sample() -> CollectionProgress {
        let mut progress =
            CollectionProgress::new("Aki", Some(PersonalityCode::new("INTJ")));
        progress.current_phase = 3;
        progress.collected_data.push(AnswerRecord {
            participant_name: "Aki".into(),
            phase: 2,
            element_type: "Mind (N/S)".into(),
            cycle_number: 1,
            question_number_in_phase: 10,
            question: "Q".into(),
            answer: "A".into(),
            timestamp: fixed_now(),
            session_id: Some(SessionId::new("s-2")),
        });
        progress
    }

    #[tokio::test]
    async fn restore_on_fresh_store_is_none() {
        let (store, _) = store();
        assert!(store.restore().await.is_none());
    }

    #[tokio::test]
    async fn save_then_restore_returns_latest() {
        let (store, _) = store();
        store.save(&CollectionProgress::new("old", None)).await.unwrap();
        let progress = sample();
        store.save(&progress).await.unwrap();

        assert_eq!(store.restore().await, Some(progress));
    }

    #[tokio::test]
    async fn corrupt_blob_restores_as_none() {
        let (store, slot) = store();
        slot.set(PROGRESS_SLOT_KEY, "{not json").await.unwrap();
        assert!(store.restore().await.is_none());

        slot.set(
            PROGRESS_SLOT_KEY,
            r#"{"participant_name":"x","personality_code":null,"current_phase":0,"collected_data":[]}"#,
        )
        .await
        .unwrap();
        assert!(store.restore().await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_slot() {
        let (store, _) = store();
        store.save(&sample()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.restore().await.is_none());
        store.clear().await.unwrap();
    }
}
