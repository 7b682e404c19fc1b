//! In-process directory table.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use bylines_shared::{BylinesError, DirectoryRecord, Fields, Result};

use crate::DirectoryStore;

/// Directory held in memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    records: Mutex<Vec<DirectoryRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of records.
    pub fn with_records(records: Vec<DirectoryRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<DirectoryRecord> {
        self.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<DirectoryRecord>>> {
        self.records
            .lock()
            .map_err(|_| BylinesError::Storage("memory directory lock poisoned".into()))
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn list_all(&self) -> Result<Vec<DirectoryRecord>> {
        Ok(self.lock()?.clone())
    }

    async fn create(&self, fields: &Fields) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.lock()?.push(DirectoryRecord {
            id: id.clone(),
            fields: fields.clone(),
        });
        Ok(id)
    }

    async fn update(&self, id: &str, fields: &Fields) -> Result<()> {
        let mut records = self.lock()?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| BylinesError::Storage(format!("record {id} not found")))?;
        record
            .fields
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_update_list() {
        let store = MemoryDirectory::new();
        let mut fields = Fields::new();
        fields.insert("reporter_name".into(), "Jane Doe".into());
        let id = store.create(&fields).await.unwrap();

        let mut patch = Fields::new();
        patch.insert("email".into(), "jane@example.com".into());
        store.update(&id, &patch).await.unwrap();

        let records = store.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field("reporter_name"), "Jane Doe");
        assert_eq!(records[0].field("email"), "jane@example.com");
        assert!(store.update("nope", &patch).await.is_err());
    }
}
