//! Collaborators holding the authoritative user, group and message records.
//!
//! Sessions and the router only see these through the traits below, so a
//! deployment can back them with a database. The in-memory implementations
//! keep everything in [`dashmap::DashMap`]s and are what the binary and the
//! tests use.

use thiserror::Error;

mod filter;
mod groups;
mod notify;
mod store;
mod users;

pub use filter::{ContentFilter, WordListFilter};
pub use groups::{GroupDirectory, MemoryGroupDirectory};
pub use notify::{LogNotificationSink, NotificationSink};
pub use store::{
    MemoryMessageStore,
    MessageDraft,
    MessageFilter,
    MessageId,
    MessageStore,
    RecallRef,
    StoredMessage,
};
pub use users::{MemoryUserDirectory, UserDirectory, UserRecord};

/// Failures reported by the directories.
///
/// None of these end a session; they are reported back to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("user {0} already exists")]
    UserExists(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("unknown message {0}")]
    UnknownMessage(String),
    #[error("only the author can recall a message")]
    NotAuthor,
}

/// Result alias for directory operations.
pub type Result<T, E = DirectoryError> = std::result::Result<T, E>;

/// Names are non-empty and free of whitespace so they survive as single
/// tokens in query replies.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(DirectoryError::InvalidName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("")]
    #[case("two words")]
    #[case("tab\there")]
    fn rejects_names_that_are_not_single_tokens(#[case] name: &str) {
        assert_eq!(
            validate_name(name),
            Err(DirectoryError::InvalidName(name.to_owned()))
        );
    }

    #[test]
    fn accepts_plain_names() {
        assert!(validate_name("agencyOne").is_ok());
    }
}
