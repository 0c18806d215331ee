use crate::config::AccountColumns;
use crate::services::tabular::{SheetTable, TabularStore};
use anyhow::{Context, Result};

const MASK: &str = "********";

/// What `check-accounts` prints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSheetReport {
    pub sheet_titles: Vec<String>,
    pub header: Vec<String>,
    /// Data rows with the password column masked
    pub rows: Vec<Vec<String>>,
}

/// Reads the spreadsheet layout and the account sheet for a connectivity check
pub async fn check_accounts(
    store: &dyn TabularStore,
    sheet: &str,
    columns: &AccountColumns,
) -> Result<AccountSheetReport> {
    let sheet_titles = store
        .sheet_titles()
        .await
        .context("Failed to list sheets")?;
    let table = SheetTable::new(
        store
            .read_rows(sheet)
            .await
            .with_context(|| format!("Failed to read sheet '{}'", sheet))?,
    );
    let password_col = table.column(&columns.password);

    let rows = table
        .records()
        .map(|(_, row)| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    if Some(i) == password_col && !cell.is_empty() {
                        MASK.to_string()
                    } else {
                        cell.clone()
                    }
                })
                .collect()
        })
        .collect();

    Ok(AccountSheetReport {
        sheet_titles,
        header: table.header().to_vec(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeSheets;

    #[tokio::test]
    async fn test_passwords_are_masked() {
        let store = FakeSheets::new()
            .with_sheet(
                "アカウント管理",
                &[
                    &["アカウント名", "FTP用ユーザー名", "FTP用パスワード"],
                    &["LIMITEST", "limi_user", "secret"],
                    &["EMPTY", "", ""],
                ],
            )
            .with_sheet("アップロード管理", &[&["ファイル名"]]);

        let report = check_accounts(&store, "アカウント管理", &AccountColumns::default())
            .await
            .unwrap();

        assert_eq!(report.sheet_titles.len(), 2);
        assert_eq!(report.rows[0], vec!["LIMITEST", "limi_user", "********"]);
        assert_eq!(report.rows[1][2], "");
        assert!(!format!("{:?}", report).contains("secret"));
    }

    #[tokio::test]
    async fn test_missing_sheet_is_an_error() {
        let store = FakeSheets::new();
        let err = check_accounts(&store, "アカウント管理", &AccountColumns::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("アカウント管理"));
    }
}
