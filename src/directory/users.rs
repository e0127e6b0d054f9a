//! User accounts and credential checks.

use dashmap::{DashMap, mapref::entry::Entry};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{DirectoryError, Result, validate_name};
use crate::role::Role;

const SALT_LEN: usize = 16;

/// Public view of an account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub role: Role,
    pub parental_control: bool,
}

/// Store of user accounts.
pub trait UserDirectory: Send + Sync {
    /// Check `secret` for `name` and return the account's role.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidCredentials`] for an unknown user or
    /// a wrong secret; the two are not distinguished.
    fn authenticate(&self, name: &str, secret: &str) -> Result<Role>;

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UserExists`] if the name is taken and
    /// [`DirectoryError::InvalidName`] if it is not a single token.
    fn create_user(&self, name: &str, secret: &str, role: Role) -> Result<UserRecord>;

    /// Remove an account.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownUser`] if there is no such account.
    fn delete_user(&self, name: &str) -> Result<()>;

    /// Change an account's role.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownUser`] if there is no such account.
    fn set_role(&self, name: &str, role: Role) -> Result<()>;

    /// Replace an account's secret.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownUser`] if there is no such account.
    fn set_secret(&self, name: &str, secret: &str) -> Result<()>;

    /// Switch content filtering for an account.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownUser`] if there is no such account.
    fn set_parental_control(&self, name: &str, enabled: bool) -> Result<()>;

    fn lookup(&self, name: &str) -> Option<UserRecord>;

    /// All account names, sorted.
    fn user_names(&self) -> Vec<String>;
}

struct Account {
    salt: [u8; SALT_LEN],
    digest: [u8; 32],
    role: Role,
    parental_control: bool,
}

fn hash_secret(salt: &[u8; SALT_LEN], secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    let mut digest = [0_u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

impl Account {
    fn new(secret: &str, role: Role) -> Self {
        let salt: [u8; SALT_LEN] = rand::random();
        Self {
            salt,
            digest: hash_secret(&salt, secret),
            role,
            parental_control: false,
        }
    }

    fn matches(&self, secret: &str) -> bool { hash_secret(&self.salt, secret) == self.digest }

    fn record(&self, name: &str) -> UserRecord {
        UserRecord {
            name: name.to_owned(),
            role: self.role,
            parental_control: self.parental_control,
        }
    }
}

/// [`UserDirectory`] kept in memory with salted SHA-256 secrets.
#[derive(Default)]
pub struct MemoryUserDirectory {
    accounts: DashMap<String, Account>,
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn with_account<T>(&self, name: &str, f: impl FnOnce(&mut Account) -> T) -> Result<T> {
        self.accounts
            .get_mut(name)
            .map(|mut account| f(&mut account))
            .ok_or_else(|| DirectoryError::UnknownUser(name.to_owned()))
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn authenticate(&self, name: &str, secret: &str) -> Result<Role> {
        match self.accounts.get(name) {
            Some(account) if account.matches(secret) => Ok(account.role),
            _ => {
                debug!(user = name, "authentication failed");
                Err(DirectoryError::InvalidCredentials)
            }
        }
    }

    fn create_user(&self, name: &str, secret: &str, role: Role) -> Result<UserRecord> {
        validate_name(name)?;
        match self.accounts.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(DirectoryError::UserExists(name.to_owned())),
            Entry::Vacant(vacant) => {
                let account = Account::new(secret, role);
                let record = account.record(name);
                vacant.insert(account);
                Ok(record)
            }
        }
    }

    fn delete_user(&self, name: &str) -> Result<()> {
        self.accounts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::UnknownUser(name.to_owned()))
    }

    fn set_role(&self, name: &str, role: Role) -> Result<()> {
        self.with_account(name, |account| account.role = role)
    }

    fn set_secret(&self, name: &str, secret: &str) -> Result<()> {
        self.with_account(name, |account| {
            account.salt = rand::random();
            account.digest = hash_secret(&account.salt, secret);
        })
    }

    fn set_parental_control(&self, name: &str, enabled: bool) -> Result<()> {
        self.with_account(name, |account| account.parental_control = enabled)
    }

    fn lookup(&self, name: &str) -> Option<UserRecord> {
        self.accounts.get(name).map(|account| account.record(name))
    }

    fn user_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.accounts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
