use crate::error::ConfigError;
use crate::types::Account;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Parses a newline-delimited account list, dropping blank entries.
pub fn parse_accounts(contents: &str) -> Vec<Account> {
    contents.lines().filter_map(Account::parse).collect()
}

/// Loads the tracked accounts. A missing or empty list is a configuration
/// error; the poll loop never starts without accounts.
pub fn load_accounts(path: &Path) -> Result<Vec<Account>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::FileNotFound {
            path: path.display().to_string(),
        },
        ErrorKind::PermissionDenied => ConfigError::PermissionDenied {
            path: path.display().to_string(),
        },
        _ => ConfigError::InvalidValue {
            field: "accounts_file".to_string(),
            value: format!("{} ({})", path.display(), e),
        },
    })?;

    let accounts = parse_accounts(&contents);
    if accounts.is_empty() {
        return Err(ConfigError::ValidationFailed {
            reason: format!("no accounts listed in {}", path.display()),
        });
    }

    debug!("Loaded {} accounts from {}", accounts.len(), path.display());
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn names(accounts: &[Account]) -> Vec<&str> {
        accounts.iter().map(Account::as_str).collect()
    }

    #[test]
    fn test_parse_strips_commas_whitespace_and_blank_lines() {
        let accounts = parse_accounts("alice,\n bob \n\n");
        assert_eq!(names(&accounts), vec!["alice", "bob"]);
    }

    #[test]
    fn test_parse_keeps_order() {
        let accounts = parse_accounts("zed\r\namy,\n  ,\nmo");
        assert_eq!(names(&accounts), vec!["zed", "amy", "mo"]);
    }

    #[test]
    fn test_load_missing_file() {
        let path = env::temp_dir().join(format!("postwatch_accounts_{}.txt", uuid::Uuid::new_v4()));
        let result = load_accounts(&path);
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_empty_file_is_rejected() {
        let path = env::temp_dir().join(format!("postwatch_accounts_{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "\n , \n").unwrap();

        let result = load_accounts(&path);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_accounts_file() {
        let path = env::temp_dir().join(format!("postwatch_accounts_{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "alice,\n bob \n\n").unwrap();

        let accounts = load_accounts(&path).expect("accounts should load");
        assert_eq!(names(&accounts), vec!["alice", "bob"]);

        std::fs::remove_file(&path).unwrap();
    }
}
