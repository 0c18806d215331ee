use crate::config::StatusColumns;
use crate::models::UploadStatus;
use crate::services::error::RelayError;
use crate::services::tabular::{SheetTable, TabularStore};
use crate::services::with_timeout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Status written to this 0-based sheet row
    Updated { row: usize },
    /// No row for the filename; nothing written
    NoMatchingRow,
}

/// Writes terminal outcomes back to the status sheet
pub struct StatusRecorder {
    store: Arc<dyn TabularStore>,
    sheet: String,
    columns: StatusColumns,
    timeout: Duration,
    /// Serializes creation of the error-message column
    header_lock: Mutex<()>,
}

impl StatusRecorder {
    pub fn new(
        store: Arc<dyn TabularStore>,
        sheet: impl Into<String>,
        columns: StatusColumns,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            sheet: sheet.into(),
            columns,
            timeout,
            header_lock: Mutex::new(()),
        }
    }

    pub fn label(&self, status: UploadStatus) -> &str {
        match status {
            UploadStatus::Pending => &self.columns.pending_label,
            UploadStatus::UploadComplete => &self.columns.complete_label,
            UploadStatus::Error => &self.columns.error_label,
        }
    }

    async fn read_table(&self) -> anyhow::Result<SheetTable> {
        let rows = with_timeout(self.timeout, "Sheets read", self.store.read_rows(&self.sheet)).await?;
        Ok(SheetTable::new(rows))
    }

    async fn write(&self, row: usize, column: usize, value: &str) -> anyhow::Result<()> {
        with_timeout(
            self.timeout,
            "Sheets update",
            self.store.update_cell(&self.sheet, row, column, value),
        )
        .await
    }

    /// Returns the sheet and the error column index, appending the column
    /// header if it is missing. The header is re-read under the lock so
    /// concurrent first writers append it only once.
    async fn table_with_error_column(&self) -> anyhow::Result<(SheetTable, usize)> {
        let table = self.read_table().await?;
        if let Some(col) = table.column(&self.columns.error_message) {
            return Ok((table, col));
        }

        let _guard = self.header_lock.lock().await;
        let table = self.read_table().await?;
        if let Some(col) = table.column(&self.columns.error_message) {
            return Ok((table, col));
        }

        let col = table.header().len();
        self.write(0, col, &self.columns.error_message).await?;
        tracing::info!(
            "Added column '{}' to sheet '{}'",
            self.columns.error_message,
            self.sheet
        );
        Ok((table, col))
    }

    /// Updates the status row for `filename` in place
    pub async fn record(
        &self,
        filename: &str,
        status: UploadStatus,
        error_message: Option<&str>,
    ) -> Result<RecordOutcome, RelayError> {
        let recording = |e: anyhow::Error| RelayError::Recording(e.to_string());

        let (table, error_col) = self.table_with_error_column().await.map_err(recording)?;
        let name_col = table.column(&self.columns.filename).ok_or_else(|| {
            RelayError::Recording(format!("列 '{}' がありません", self.columns.filename))
        })?;
        let status_col = table.column(&self.columns.status).ok_or_else(|| {
            RelayError::Recording(format!("列 '{}' がありません", self.columns.status))
        })?;

        let Some(row) = table
            .records()
            .find(|(_, r)| SheetTable::cell(r, name_col).trim() == filename)
            .map(|(i, _)| i)
        else {
            return Ok(RecordOutcome::NoMatchingRow);
        };

        self.write(row, status_col, self.label(status))
            .await
            .map_err(recording)?;
        self.write(row, error_col, error_message.unwrap_or(""))
            .await
            .map_err(recording)?;

        Ok(RecordOutcome::Updated { row })
    }

    /// Records and never fails: a recording problem must not replace the
    /// transfer outcome already decided.
    pub async fn record_or_log(
        &self,
        filename: &str,
        status: UploadStatus,
        error_message: Option<&str>,
    ) -> Option<RecordOutcome> {
        match self.record(filename, status, error_message).await {
            Ok(RecordOutcome::NoMatchingRow) => {
                tracing::warn!(
                    "No status row for '{}' in sheet '{}'; status not recorded",
                    filename,
                    self.sheet
                );
                Some(RecordOutcome::NoMatchingRow)
            }
            Ok(outcome) => {
                tracing::info!("📝 Recorded {:?} for {}", status, filename);
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("❌ {} (file: {}, status: {:?})", e, filename, status);
                None
            }
        }
    }
}
