//! In-memory collaborators for unit tests.

use crate::models::{AccountCredential, RemoteFileRef};
use crate::services::file_store::{FileStore, MediaChunk};
use crate::services::tabular::TabularStore;
use crate::services::transfer::{TransferConnector, TransferSession};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
    data.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

#[derive(Default)]
pub struct FakeSheets {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub read_delay: Mutex<Option<Duration>>,
}

impl FakeSheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, name: &str, data: &[&[&str]]) -> Self {
        self.sheets
            .lock()
            .unwrap()
            .insert(name.to_string(), rows(data));
        self
    }

    pub fn sheet(&self, name: &str) -> Vec<Vec<String>> {
        self.sheets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TabularStore for FakeSheets {
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("sheets unavailable"));
        }
        self.sheets
            .lock()
            .unwrap()
            .get(sheet)
            .cloned()
            .ok_or_else(|| anyhow!("Unable to parse range: {}", sheet))
    }

    async fn update_cell(
        &self,
        sheet: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("sheets read-only"));
        }
        let mut sheets = self.sheets.lock().unwrap();
        let rows = sheets.entry(sheet.to_string()).or_default();
        while rows.len() <= row {
            rows.push(Vec::new());
        }
        let cells = &mut rows[row];
        while cells.len() <= column {
            cells.push(String::new());
        }
        cells[column] = value.to_string();
        Ok(())
    }

    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let mut titles: Vec<String> = self.sheets.lock().unwrap().keys().cloned().collect();
        titles.sort();
        Ok(titles)
    }
}

#[derive(Default)]
pub struct FakeDrive {
    files: Mutex<Vec<(RemoteFileRef, Vec<u8>)>>,
    pub lists: AtomicUsize,
    pub downloads: AtomicUsize,
    pub deleted: Mutex<Vec<String>>,
    /// Number of list calls that report nothing before files become visible
    pub hidden_for: AtomicUsize,
    pub fail_lists: AtomicBool,
    pub fail_downloads_after: Mutex<Option<usize>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, id: &str, name: &str, content: &[u8]) -> Self {
        self.files.lock().unwrap().push((
            RemoteFileRef {
                id: id.to_string(),
                name: name.to_string(),
            },
            content.to_vec(),
        ));
        self
    }
}

#[async_trait]
impl FileStore for FakeDrive {
    async fn list_files(&self, _parent_id: &str, name: &str) -> Result<Vec<RemoteFileRef>> {
        let call = self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(anyhow!("drive unavailable"));
        }
        if call < self.hidden_for.load(Ordering::SeqCst) {
            return Ok(vec![]);
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(f, _)| f.name == name)
            .map(|(f, _)| f.clone())
            .collect())
    }

    async fn download_chunk(&self, file_id: &str, offset: u64, len: u64) -> Result<MediaChunk> {
        let call = self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_downloads_after.lock().unwrap() {
            if call >= limit {
                return Err(anyhow!("connection reset"));
            }
        }
        let files = self.files.lock().unwrap();
        let (_, content) = files
            .iter()
            .find(|(f, _)| f.id == file_id)
            .ok_or_else(|| anyhow!("File not found: {}", file_id))?;
        let start = (offset as usize).min(content.len());
        let end = (start + len as usize).min(content.len());
        Ok(MediaChunk {
            data: Bytes::copy_from_slice(&content[start..end]),
            done: end >= content.len(),
        })
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(file_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeServer {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// (username, remote path, content)
    pub uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
    pub fail_connect: AtomicBool,
    pub fail_put: AtomicBool,
    pub hide_from_listing: AtomicBool,
    /// Steady upload time; the put still lands
    pub put_delay: Mutex<Option<Duration>>,
    /// The put makes no progress until the session timeout fires
    pub stall_put: AtomicBool,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub server: Arc<FakeServer>,
}

struct FakeSession {
    server: Arc<FakeServer>,
    username: String,
    timeout: Duration,
}

impl TransferConnector for FakeConnector {
    fn connect(
        &self,
        _host: &str,
        _port: u16,
        credential: &AccountCredential,
        timeout: Duration,
    ) -> Result<Box<dyn TransferSession>> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        if self.server.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("Authentication failed"));
        }
        Ok(Box::new(FakeSession {
            server: self.server.clone(),
            username: credential.username.clone(),
            timeout,
        }))
    }
}

impl TransferSession for FakeSession {
    fn put(&mut self, local: &Path, remote_path: &str) -> Result<u64> {
        if self.server.fail_put.load(Ordering::SeqCst) {
            return Err(anyhow!("Permission denied"));
        }
        if self.server.stall_put.load(Ordering::SeqCst) {
            std::thread::sleep(self.timeout);
            return Err(anyhow!("Timed out waiting on socket"));
        }
        let delay = *self.server.put_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let content = std::fs::read(local)?;
        let len = content.len() as u64;
        self.server.uploads.lock().unwrap().push((
            self.username.clone(),
            remote_path.to_string(),
            content,
        ));
        Ok(len)
    }

    fn list(&mut self, remote_dir: &str) -> Result<Vec<String>> {
        if self.server.hide_from_listing.load(Ordering::SeqCst) {
            return Ok(vec![]);
        }
        let prefix = format!("{}/", remote_dir.trim_end_matches('/'));
        Ok(self
            .server
            .uploads
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, path, _)| path.strip_prefix(&prefix).map(|n| n.to_string()))
            .collect())
    }

    fn close(&mut self) -> Result<()> {
        self.server.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
