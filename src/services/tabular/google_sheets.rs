use super::TabularStore;
use crate::infrastructure::google_auth::AccessTokenSource;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Sheets API v4 client scoped to one spreadsheet
pub struct GoogleSheetsStore {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
    api_base: String,
    spreadsheet_id: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

/// Column letters for a 0-based index: 0 → A, 25 → Z, 26 → AA
pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Sheet name quoted for use in an A1 range
pub fn quote_sheet(sheet: &str) -> String {
    format!("'{}'", sheet.replace('\'', "''"))
}

/// A1 reference of a single cell, both indices 0-based
pub fn a1_cell(sheet: &str, row: usize, column: usize) -> String {
    format!("{}!{}{}", quote_sheet(sheet), column_letters(column), row + 1)
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl GoogleSheetsStore {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn AccessTokenSource>,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.api_base,
            self.spreadsheet_id,
            utf8_percent_encode(range, NON_ALPHANUMERIC)
        )
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("Sheets {} failed ({}): {}", what, status, body))
    }
}

#[async_trait]
impl TabularStore for GoogleSheetsStore {
    async fn read_rows(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(self.values_url(&quote_sheet(sheet)))
            .bearer_auth(token)
            .send()
            .await?;
        let range: ValueRange = Self::check(response, "read").await?.json().await?;

        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_cell(
        &self,
        sheet: &str,
        row: usize,
        column: usize,
        value: &str,
    ) -> Result<()> {
        let token = self.tokens.access_token().await?;
        let range = a1_cell(sheet, row, column);
        let response = self
            .http
            .put(self.values_url(&range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [[value]],
            }))
            .send()
            .await?;
        Self::check(response, "update").await?;
        Ok(())
    }

    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(format!(
                "{}/spreadsheets/{}",
                self.api_base, self.spreadsheet_id
            ))
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(token)
            .send()
            .await?;
        let spreadsheet: Spreadsheet = Self::check(response, "metadata").await?.json().await?;
        Ok(spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn test_a1_cell_quotes_sheet_name() {
        assert_eq!(a1_cell("アップロード管理", 0, 2), "'アップロード管理'!C1");
        assert_eq!(a1_cell("Bob's", 4, 0), "'Bob''s'!A5");
    }

    #[test]
    fn test_cell_text_stringifies_non_strings() {
        assert_eq!(cell_text(json!("x")), "x");
        assert_eq!(cell_text(json!(12)), "12");
        assert_eq!(cell_text(Value::Null), "");
    }
}
