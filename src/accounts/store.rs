//! Credential storage behind a small key-value interface

use crate::storage::write_atomic;
use crate::{LocalshiftError, Result};
use bcrypt::Version;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// A stored credential record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAccount {
    pub hash: String,
    pub admin: bool,
}

/// Key-value store of accounts keyed by username
pub trait AccountStore {
    /// All accounts, ordered by username
    fn entries(&self) -> Result<BTreeMap<String, StoredAccount>>;

    /// Insert or overwrite one account
    fn put(&self, username: &str, account: StoredAccount) -> Result<()>;

    /// Delete one account, returning whether it existed
    fn delete(&self, username: &str) -> Result<bool>;

    fn get(&self, username: &str) -> Result<Option<StoredAccount>> {
        Ok(self.entries()?.remove(username))
    }
}

/// How passwords are turned into stored hashes
pub trait PasswordScheme {
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Salted bcrypt in the `$2y$` form written by `htpasswd -B`
#[derive(Debug, Clone, Copy)]
pub struct BcryptScheme {
    cost: u32,
}

impl BcryptScheme {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptScheme {
    fn default() -> Self {
        // Unoptimised test builds would spend seconds per hash at the default cost
        if cfg!(test) {
            Self::new(4)
        } else {
            Self::new(bcrypt::DEFAULT_COST)
        }
    }
}

impl PasswordScheme for BcryptScheme {
    fn hash(&self, password: &str) -> Result<String> {
        let parts = bcrypt::hash_with_result(password, self.cost)?;
        Ok(parts.format_for_version(Version::TwoY))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

/// Flat credential file, one `username:hash:admin|user` line per account
///
/// Every write also re-renders a plain `username:hash` htpasswd export for
/// the cluster to read.
#[derive(Debug, Clone)]
pub struct FileAccountStore {
    path: PathBuf,
    htpasswd: Option<PathBuf>,
}

impl FileAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            htpasswd: None,
        }
    }

    /// Also keep an htpasswd rendering of the accounts at `path`
    pub fn with_htpasswd_export(mut self, path: impl Into<PathBuf>) -> Self {
        self.htpasswd = Some(path.into());
        self
    }

    fn save(&self, accounts: &BTreeMap<String, StoredAccount>) -> Result<()> {
        let mut db = String::new();
        let mut htpasswd = String::new();
        for (username, account) in accounts {
            let role = if account.admin { "admin" } else { "user" };
            db.push_str(&format!("{}:{}:{}\n", username, account.hash, role));
            htpasswd.push_str(&format!("{}:{}\n", username, account.hash));
        }

        write_atomic(&self.path, db.as_bytes())?;

        if let Some(export) = &self.htpasswd {
            if let Some(parent) = export.parent() {
                fs::create_dir_all(parent).map_err(LocalshiftError::storage(parent))?;
            }
            write_atomic(export, htpasswd.as_bytes())?;
        }
        Ok(())
    }

    fn parse_line(&self, number: usize, line: &str) -> Result<(String, StoredAccount)> {
        let corrupt = |reason: &str| LocalshiftError::CorruptState {
            path: self.path.clone(),
            reason: format!("line {}: {}", number + 1, reason),
        };

        let (username, rest) = line.split_once(':').ok_or_else(|| corrupt("missing hash"))?;
        let (hash, role) = rest.rsplit_once(':').ok_or_else(|| corrupt("missing role"))?;
        let admin = match role {
            "admin" => true,
            "user" => false,
            _ => return Err(corrupt("role must be admin or user")),
        };
        if username.is_empty() || hash.is_empty() {
            return Err(corrupt("empty username or hash"));
        }

        Ok((
            username.to_string(),
            StoredAccount {
                hash: hash.to_string(),
                admin,
            },
        ))
    }
}

impl AccountStore for FileAccountStore {
    fn entries(&self) -> Result<BTreeMap<String, StoredAccount>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(LocalshiftError::storage(&self.path)(e)),
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| self.parse_line(number, line.trim()))
            .collect()
    }

    fn put(&self, username: &str, account: StoredAccount) -> Result<()> {
        let mut accounts = self.entries()?;
        accounts.insert(username.to_string(), account);
        self.save(&accounts)
    }

    fn delete(&self, username: &str) -> Result<bool> {
        let mut accounts = self.entries()?;
        let existed = accounts.remove(username).is_some();
        if existed {
            self.save(&accounts)?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bcrypt_scheme() {
        let scheme = BcryptScheme::default();
        let hash = scheme.hash("developer").unwrap();

        assert!(hash.starts_with("$2y$"));
        assert!(scheme.verify("developer", &hash));
        assert!(!scheme.verify("other", &hash));
        // Salted: the same password never hashes the same way twice
        assert_ne!(scheme.hash("developer").unwrap(), hash);
        assert!(!scheme.verify("developer", "{SHA}Pay85TLM1I8n+mLpkwZ7PDXwlPc="));
    }

    #[test]
    fn test_file_store_round_trip_and_export() {
        let tmp = TempDir::new().unwrap();
        let export = tmp.path().join("master/users.htpasswd");
        let store = FileAccountStore::new(tmp.path().join("accounts"))
            .with_htpasswd_export(&export);

        store
            .put("developer", StoredAccount { hash: "$2y$04$abc".to_string(), admin: true })
            .unwrap();
        store
            .put("alice", StoredAccount { hash: "$2y$04$def".to_string(), admin: false })
            .unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("accounts")).unwrap(),
            "alice:$2y$04$def:user\ndeveloper:$2y$04$abc:admin\n"
        );
        assert_eq!(
            fs::read_to_string(&export).unwrap(),
            "alice:$2y$04$def\ndeveloper:$2y$04$abc\n"
        );

        assert!(store.get("developer").unwrap().unwrap().admin);
        assert!(store.delete("alice").unwrap());
        assert!(!store.delete("alice").unwrap());
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_rejects_corrupt_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("accounts");
        fs::write(&path, "developer:$2y$04$abc:root\n").unwrap();

        let store = FileAccountStore::new(&path);
        assert!(matches!(
            store.entries(),
            Err(LocalshiftError::CorruptState { .. })
        ));
    }
}
