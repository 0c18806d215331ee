use crate::config::AccountColumns;
use crate::models::AccountCredential;
use crate::services::error::RelayError;
use crate::services::tabular::{SheetTable, TabularStore};
use crate::services::with_timeout;
use crate::utils::normalize::normalize_account_name;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Looks up SFTP credentials for an account in the account sheet.
/// Nothing is cached: every call reads the sheet as it is now.
pub struct AccountResolver {
    store: Arc<dyn TabularStore>,
    sheet: String,
    alias_sheet: Option<String>,
    columns: AccountColumns,
    timeout: Duration,
}

fn require_column(table: &SheetTable, sheet: &str, name: &str) -> Result<usize, RelayError> {
    table.column(name).ok_or_else(|| {
        RelayError::StoreIo(format!("シート '{}' に列 '{}' がありません", sheet, name))
    })
}

impl AccountResolver {
    pub fn new(
        store: Arc<dyn TabularStore>,
        sheet: impl Into<String>,
        alias_sheet: Option<String>,
        columns: AccountColumns,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            sheet: sheet.into(),
            alias_sheet,
            columns,
            timeout,
        }
    }

    async fn read_table(&self, sheet: &str) -> Result<SheetTable, RelayError> {
        let rows = with_timeout(self.timeout, "Sheets read", self.store.read_rows(sheet))
            .await
            .map_err(RelayError::store_io)?;
        Ok(SheetTable::new(rows))
    }

    /// Normalized display name → normalized canonical account name
    async fn load_aliases(&self, sheet: &str) -> Result<HashMap<String, String>, RelayError> {
        let table = self.read_table(sheet).await?;
        let display = require_column(&table, sheet, &self.columns.alias_display)?;
        let account = require_column(&table, sheet, &self.columns.alias_account)?;

        Ok(table
            .records()
            .filter_map(|(_, row)| {
                let from = normalize_account_name(SheetTable::cell(row, display));
                let to = normalize_account_name(SheetTable::cell(row, account));
                (!from.is_empty() && !to.is_empty()).then_some((from, to))
            })
            .collect())
    }

    /// `Ok(None)` when no row matches; store failures are errors.
    pub async fn resolve(&self, account: &str) -> Result<Option<AccountCredential>, RelayError> {
        let mut key = normalize_account_name(account);
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(alias_sheet) = &self.alias_sheet {
            let aliases = self.load_aliases(alias_sheet).await?;
            if let Some(canonical) = aliases.get(&key) {
                tracing::debug!("Account alias '{}' → '{}'", key, canonical);
                key = canonical.clone();
            }
        }

        let table = self.read_table(&self.sheet).await?;
        let name_col = require_column(&table, &self.sheet, &self.columns.account)?;
        let user_col = require_column(&table, &self.sheet, &self.columns.username)?;
        let pass_col = require_column(&table, &self.sheet, &self.columns.password)?;

        let found = table.records().find_map(|(_, row)| {
            let username = SheetTable::cell(row, user_col).trim();
            let matches = normalize_account_name(SheetTable::cell(row, name_col)) == key;
            (matches && !username.is_empty()).then(|| AccountCredential {
                username: username.to_string(),
                password: SheetTable::cell(row, pass_col).to_string(),
            })
        });

        match &found {
            Some(credential) => {
                tracing::info!("🔑 Account '{}' resolved to user {}", key, credential.username)
            }
            None => tracing::warn!("Account '{}' not found in sheet '{}'", key, self.sheet),
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::FakeSheets;
    use std::sync::atomic::Ordering;

    const SHEET: &str = "アカウント管理";

    fn accounts() -> FakeSheets {
        FakeSheets::new().with_sheet(
            SHEET,
            &[
                &["アカウント名", "FTP用ユーザー名", "FTP用パスワード", "備考"],
                &["LIMITEST", "limi_user", "limi_pass", ""],
                &["楽天\u{3000}本店", "honten", "pw2", ""],
                &["空アカウント", "", "pw3", ""],
            ],
        )
    }

    fn resolver(store: Arc<FakeSheets>, alias_sheet: Option<&str>) -> AccountResolver {
        AccountResolver::new(
            store,
            SHEET,
            alias_sheet.map(|s| s.to_string()),
            AccountColumns::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_resolves_exact_account() {
        let resolver = resolver(Arc::new(accounts()), None);
        let cred = resolver.resolve("LIMITEST").await.unwrap().unwrap();
        assert_eq!(cred.username, "limi_user");
        assert_eq!(cred.password, "limi_pass");
    }

    #[tokio::test]
    async fn test_whitespace_variants_resolve_to_same_credential() {
        let resolver = resolver(Arc::new(accounts()), None);
        let plain = resolver.resolve("LIMITEST").await.unwrap();
        for variant in [" LIMITEST", "LIMITEST\u{3000}", "\tＬＩＭＩＴＥＳＴ "] {
            assert_eq!(resolver.resolve(variant).await.unwrap(), plain, "{variant:?}");
        }
        let honten = resolver.resolve(" 楽天 本店 ").await.unwrap().unwrap();
        assert_eq!(honten.username, "honten");
    }

    #[tokio::test]
    async fn test_case_sensitive_and_not_found_is_none() {
        let resolver = resolver(Arc::new(accounts()), None);
        assert!(resolver.resolve("limitest").await.unwrap().is_none());
        assert!(resolver.resolve("UNKNOWN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_row_without_username_does_not_match() {
        let resolver = resolver(Arc::new(accounts()), None);
        assert!(resolver.resolve("空アカウント").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alias_applied_before_comparison() {
        let store = accounts().with_sheet(
            "別名",
            &[&["表示名", "アカウント名"], &["Rakuten Main", "楽天 本店"]],
        );
        let resolver = resolver(Arc::new(store), Some("別名"));
        let cred = resolver.resolve("Rakuten　Main").await.unwrap().unwrap();
        assert_eq!(cred.username, "honten");
        // Names without an alias still resolve directly
        assert!(resolver.resolve("LIMITEST").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_not_found() {
        let store = Arc::new(accounts());
        store.fail_reads.store(true, Ordering::SeqCst);
        let err = resolver(store, None).resolve("LIMITEST").await.unwrap_err();
        assert!(matches!(err, RelayError::StoreIo(_)));
    }

    #[tokio::test]
    async fn test_missing_header_is_store_error() {
        let store = FakeSheets::new().with_sheet(SHEET, &[&["名前"], &["LIMITEST"]]);
        let err = resolver(Arc::new(store), None)
            .resolve("LIMITEST")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::StoreIo(_)));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(accounts());
        *store.read_delay.lock().unwrap() = Some(Duration::from_millis(200));
        let resolver = AccountResolver::new(
            store,
            SHEET,
            None,
            AccountColumns::default(),
            Duration::from_millis(20),
        );
        let err = resolver.resolve("LIMITEST").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
