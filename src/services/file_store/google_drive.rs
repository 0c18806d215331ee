use super::{FileStore, MediaChunk};
use crate::infrastructure::google_auth::AccessTokenSource;
use crate::models::RemoteFileRef;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE};
use serde::Deserialize;
use std::sync::Arc;

/// Drive API v3 client
pub struct GoogleDriveStore {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
    api_base: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
}

/// Escapes a literal for use inside a single-quoted Drive query string
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Query for non-trashed files with an exact name in one folder
pub fn exact_name_query(parent_id: &str, name: &str) -> String {
    format!(
        "'{}' in parents and name = '{}' and trashed = false",
        escape_query_literal(parent_id),
        escape_query_literal(name)
    )
}

/// Parses `bytes start-end/total`. Total is `None` when the server sends `*`.
pub fn parse_content_range(header: &str) -> Option<(u64, u64, Option<u64>)> {
    let spec = header.trim().strip_prefix("bytes ")?;
    let (range, total) = spec.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?, total))
}

/// A `200 OK` to a ranged request carries the whole file. Only the part at
/// and after `offset` is new to the caller.
pub fn remainder_of_full_body(data: Bytes, offset: u64) -> Result<MediaChunk> {
    let total = data.len() as u64;
    if offset > total {
        return Err(anyhow!(
            "Drive sent {} bytes for a range starting at {}",
            total,
            offset
        ));
    }
    Ok(MediaChunk {
        data: data.slice(offset as usize..),
        done: true,
    })
}

impl GoogleDriveStore {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenSource>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FileStore for GoogleDriveStore {
    async fn list_files(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteFileRef>> {
        let token = self.tokens.access_token().await?;
        let query = exact_name_query(parent_id, name);
        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Drive list failed ({}): {}", status, body));
        }

        let list: FileList = response.json().await?;
        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFileRef {
                id: f.id,
                name: f.name,
            })
            .collect())
    }

    async fn download_chunk(&self, file_id: &str, offset: u64, len: u64) -> Result<MediaChunk> {
        let token = self.tokens.access_token().await?;
        let last = offset + len.max(1) - 1;
        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .header(RANGE, format!("bytes={}-{}", offset, last))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::PARTIAL_CONTENT => {
                let range = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range);
                if let Some((start, _, _)) = range {
                    if start != offset {
                        return Err(anyhow!(
                            "Drive answered range at {} for a request at {}",
                            start,
                            offset
                        ));
                    }
                }
                let data = response.bytes().await?;
                let done = match range {
                    Some((_, end, Some(total))) => end + 1 >= total,
                    _ => (data.len() as u64) < len,
                };
                Ok(MediaChunk { data, done })
            }
            // Server ignored the range and sent everything
            StatusCode::OK => {
                if offset > 0 {
                    tracing::warn!("Drive ignored the range for {} at offset {}", file_id, offset);
                }
                remainder_of_full_body(response.bytes().await?, offset)
            }
            // Empty file, or offset already at the end
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(MediaChunk {
                data: Bytes::new(),
                done: true,
            }),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Drive download failed ({}): {}", status, body))
            }
        }
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Drive delete failed ({}): {}", status, body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_name_query_escapes_quotes() {
        assert_eq!(
            exact_name_query("folder1", "it's.csv"),
            "'folder1' in parents and name = 'it\\'s.csv' and trashed = false"
        );
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-1023/4096"),
            Some((0, 1023, Some(4096)))
        );
        assert_eq!(parse_content_range("bytes 10-19/*"), Some((10, 19, None)));
        assert_eq!(parse_content_range("items 0-1/2"), None);
        assert_eq!(parse_content_range("bytes x-1/2"), None);
    }

    #[test]
    fn test_full_body_after_offset_keeps_only_the_remainder() {
        let chunk = remainder_of_full_body(Bytes::from_static(b"0123456789"), 4).unwrap();
        assert_eq!(&chunk.data[..], b"456789");
        assert!(chunk.done);

        let whole = remainder_of_full_body(Bytes::from_static(b"0123"), 0).unwrap();
        assert_eq!(&whole.data[..], b"0123");

        assert!(remainder_of_full_body(Bytes::from_static(b"0123"), 9).is_err());
    }
}
