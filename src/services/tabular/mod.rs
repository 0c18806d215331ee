use anyhow::Result;
use async_trait::async_trait;

pub mod google_sheets;

/// Spreadsheet-like store holding the account and status sheets
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// All rows of a sheet, header row first
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>>;

    /// Writes one cell. `row` and `column` are 0-based, matching `read_rows`.
    async fn update_cell(&self, sheet: &str, row: usize, column: usize, value: &str)
    -> Result<()>;

    /// Titles of all sheets in the spreadsheet
    async fn sheet_titles(&self) -> Result<Vec<String>>;
}

/// Rows of one sheet with columns addressed by header name
#[derive(Debug, Clone, Default)]
pub struct SheetTable {
    rows: Vec<Vec<String>>,
}

impl SheetTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Index of the first column whose trimmed header equals `name`
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header().iter().position(|h| h.trim() == name)
    }

    /// Data rows with their 0-based sheet row index
    pub fn records(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, row)| (i, row.as_slice()))
    }

    /// Cell text, empty for cells past the end of a short row
    pub fn cell<'a>(row: &'a [String], column: usize) -> &'a str {
        row.get(column).map(|s| s.as_str()).unwrap_or("")
    }
}
