use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable named string slots.
///
/// A `set` replaces the whole value in one write, so readers observe either
/// the previous value or the new one.
#[async_trait]
pub trait KeyValueSlot: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, overwriting any prior value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Simple in-memory slot implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemorySlot {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueSlot for InMemorySlot {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// Slot backend behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub slots: Arc<dyn KeyValueSlot>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let slots: Arc<dyn KeyValueSlot> = Arc::new(InMemorySlot::new());
        Self { slots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_slot_overwrites_and_removes() {
        let slot = InMemorySlot::new();
        assert_eq!(slot.get("k").await.unwrap(), None);

        slot.set("k", "one").await.unwrap();
        slot.set("k", "two").await.unwrap();
        assert_eq!(slot.get("k").await.unwrap().as_deref(), Some("two"));

        slot.remove("k").await.unwrap();
        slot.remove("k").await.unwrap();
        assert_eq!(slot.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_clones_share_slots() {
        let storage = Storage::in_memory();
        let other = storage.clone();
        storage.slots.set("k", "v").await.unwrap();
        assert_eq!(other.slots.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
