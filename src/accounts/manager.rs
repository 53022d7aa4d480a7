//! User accounts of one profile

use crate::accounts::store::{AccountStore, BcryptScheme, FileAccountStore, PasswordScheme, StoredAccount};
use crate::storage::paths::ProfileHandle;
use crate::{LocalshiftError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Account created on a profile's first start
pub const DEFAULT_USER: &str = "developer";

const GENERATED_PASSWORD_LEN: usize = 16;

/// Public view of an account; the stored hash is never exposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub username: String,
    pub admin: bool,
}

/// Manages the credential database of one profile
pub struct UserAccountManager<S: AccountStore = FileAccountStore, H: PasswordScheme = BcryptScheme> {
    store: S,
    scheme: H,
}

impl UserAccountManager {
    /// Manager over the profile's credential file and its htpasswd export
    pub fn for_profile(handle: &ProfileHandle) -> Self {
        let store = FileAccountStore::new(handle.accounts_file())
            .with_htpasswd_export(handle.htpasswd_file());
        Self::new(store, BcryptScheme::default())
    }
}

impl<S: AccountStore, H: PasswordScheme> UserAccountManager<S, H> {
    pub fn new(store: S, scheme: H) -> Self {
        Self { store, scheme }
    }

    /// Create the default account with a generated password on first initialization
    ///
    /// Returns the password when the account was created, `None` when it
    /// already existed. Also makes sure at least one administrator exists.
    pub fn bootstrap_default_account(&self) -> Result<Option<String>> {
        let accounts = self.store.entries()?;

        if let Some(existing) = accounts.get(DEFAULT_USER) {
            if !accounts.values().any(|a| a.admin) {
                self.store.put(
                    DEFAULT_USER,
                    StoredAccount {
                        hash: existing.hash.clone(),
                        admin: true,
                    },
                )?;
            }
            return Ok(None);
        }

        let password = generate_password();
        self.store.put(
            DEFAULT_USER,
            StoredAccount {
                hash: self.scheme.hash(&password)?,
                admin: true,
            },
        )?;
        tracing::info!("Created default account {}", DEFAULT_USER);
        Ok(Some(password))
    }

    pub fn add(&self, username: &str, password: &str, admin: bool) -> Result<UserAccount> {
        validate_username(username)?;
        if self.store.get(username)?.is_some() {
            return Err(LocalshiftError::DuplicateUser(username.to_string()));
        }

        self.store.put(
            username,
            StoredAccount {
                hash: self.scheme.hash(password)?,
                admin,
            },
        )?;
        Ok(UserAccount {
            username: username.to_string(),
            admin,
        })
    }

    pub fn list(&self) -> Result<Vec<UserAccount>> {
        Ok(self
            .store
            .entries()?
            .into_iter()
            .map(|(username, account)| UserAccount {
                username,
                admin: account.admin,
            })
            .collect())
    }

    pub fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let account = self
            .store
            .get(username)?
            .ok_or_else(|| LocalshiftError::UnknownUser(username.to_string()))?;

        self.store.put(
            username,
            StoredAccount {
                hash: self.scheme.hash(password)?,
                admin: account.admin,
            },
        )
    }

    /// Remove an account, returning what it was; the last administrator cannot go
    pub fn remove(&self, username: &str) -> Result<UserAccount> {
        let accounts = self.store.entries()?;
        let account = accounts
            .get(username)
            .ok_or_else(|| LocalshiftError::UnknownUser(username.to_string()))?;

        if account.admin && accounts.values().filter(|a| a.admin).count() == 1 {
            return Err(LocalshiftError::LastAdmin(username.to_string()));
        }

        self.store.delete(username)?;
        Ok(UserAccount {
            username: username.to_string(),
            admin: account.admin,
        })
    }

    /// Check a password against the stored hash
    pub fn verify(&self, username: &str, password: &str) -> Result<bool> {
        Ok(self
            .store
            .get(username)?
            .map(|account| self.scheme.verify(password, &account.hash))
            .unwrap_or(false))
    }
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Usernames end up as htpasswd keys
fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.chars().any(|c| c == ':' || c.is_whitespace()) {
        return Err(LocalshiftError::InvalidUserName(username.to_string()));
    }
    Ok(())
}
