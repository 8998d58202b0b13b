//! Shared fakes for integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use ipeds_common::{PipelineError, Result};
use ipeds_pipeline::extract::LegacyReader;
use ipeds_pipeline::storage::ObjectStore;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory object store keyed by object path
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), data.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn read_text(&self, key: &str) -> Result<String> {
        let data = self.get(key).ok_or_else(|| PipelineError::not_found(self.uri(key)))?;
        String::from_utf8(data).map_err(|e| PipelineError::storage(e.to_string()))
    }

    async fn write_bytes(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn upload_file(&self, key: &str, local_path: &Path, _timeout: Duration) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn download_file(&self, key: &str, local_path: &Path, _timeout: Duration) -> Result<()> {
        let data = self.get(key).ok_or_else(|| PipelineError::not_found(self.uri(key)))?;
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn list_some(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .take(max)
            .cloned()
            .collect())
    }

    fn uri(&self, key: &str) -> String {
        format!("mem://test-bucket/{}", key)
    }
}

/// Legacy reader serving canned CSV exports
#[derive(Default)]
pub struct FakeReader {
    tables: Vec<(String, String)>,
    broken: HashMap<String, String>,
}

impl FakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, csv: &str) -> Self {
        self.tables.push((name.to_string(), csv.to_string()));
        self
    }

    /// Listed, but exporting it fails like a crashed tool
    pub fn with_broken_table(mut self, name: &str, message: &str) -> Self {
        self.tables.push((name.to_string(), String::new()));
        self.broken.insert(name.to_string(), message.to_string());
        self
    }
}

#[async_trait]
impl LegacyReader for FakeReader {
    async fn list_tables(&self, _container: &Path) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn export_table(&self, _container: &Path, table: &str) -> Result<String> {
        if let Some(message) = self.broken.get(table) {
            return Err(PipelineError::tool(message.clone()));
        }
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, csv)| csv.clone())
            .ok_or_else(|| PipelineError::tool(format!("no such table: {}", table)))
    }
}

/// Two-row institution table in `mdb-export` layout
pub fn institutions_csv() -> &'static str {
    "UNITID,INSTNM,Open Date,Tuition 2022,IS_PUBLIC\n\
     100654,\"Alabama A & M University\",1875-01-01,9857.5,true\n\
     100663,\"University of Alabama at Birmingham\",1969-06-15,,false\n"
}
