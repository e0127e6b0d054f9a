//! History of routed messages.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;

use super::{DirectoryError, Result};

/// Stable identifier of a stored message, written as `#<n>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// A message as handed to [`MessageStore::append`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDraft {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    /// Direct recipient, if any.
    pub receiver: Option<String>,
    /// Target group, if any.
    pub group: Option<String>,
    /// Every user the message was delivered to.
    pub recipients: Vec<String>,
    pub text: String,
}

/// A message held by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub receiver: Option<String>,
    pub group: Option<String>,
    pub recipients: Vec<String>,
    pub text: String,
    pub recalled: bool,
}

impl StoredMessage {
    fn from_draft(id: MessageId, draft: MessageDraft) -> Self {
        Self {
            id,
            timestamp: draft.timestamp,
            sender: draft.sender,
            receiver: draft.receiver,
            group: draft.group,
            recipients: draft.recipients,
            text: draft.text,
            recalled: false,
        }
    }

    fn matches(&self, filter: &MessageFilter) -> bool {
        match filter {
            MessageFilter::Sender(name) => self.sender == *name,
            MessageFilter::Receiver(name) => self.recipients.iter().any(|r| r == name),
            MessageFilter::Group(group) => self.group.as_deref() == Some(group.as_str()),
            MessageFilter::Content(needle) => self.text.contains(needle.as_str()),
            MessageFilter::Date(day) => self.timestamp.date_naive() == *day,
        }
    }
}

/// One line per message, as sent back for history queries.
impl fmt::Display for StoredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} -> ",
            self.id,
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.sender
        )?;
        match (&self.receiver, &self.group) {
            (Some(receiver), _) => f.write_str(receiver)?,
            (None, Some(group)) => write!(f, "group {group}")?,
            (None, None) => f.write_str("*")?,
        }
        write!(f, ": {}", self.text)
    }
}

/// Selection applied by [`MessageStore::query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageFilter {
    Sender(String),
    /// Messages delivered to the user, directly or through a group.
    Receiver(String),
    Group(String),
    /// Messages whose text contains the substring.
    Content(String),
    /// Messages stored on the given UTC day.
    Date(NaiveDate),
}

/// Which of a sender's messages to recall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecallRef {
    Latest,
    /// The n-th most recent message, `0` being the latest.
    Nth(usize),
    Id(MessageId),
}

/// Append-only message history with recall.
pub trait MessageStore: Send + Sync {
    fn append(&self, draft: MessageDraft) -> MessageId;

    /// Messages matching `filter` that have not been recalled, oldest first.
    fn query(&self, filter: &MessageFilter) -> Vec<StoredMessage>;

    /// Mark one of `sender`'s messages as recalled and return it.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownMessage`] if nothing matches and
    /// [`DirectoryError::NotAuthor`] if the message belongs to someone else.
    fn recall(&self, sender: &str, reference: RecallRef) -> Result<StoredMessage>;
}

/// [`MessageStore`] kept in memory.
#[derive(Default)]
pub struct MemoryMessageStore {
    next_id: AtomicU64,
    messages: DashMap<MessageId, StoredMessage>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn collect(&self, keep: impl Fn(&StoredMessage) -> bool) -> Vec<StoredMessage> {
        let mut found: Vec<_> = self
            .messages
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|message| message.id);
        found
    }

    fn nth_latest(&self, sender: &str, n: usize) -> Result<MessageId> {
        let mine = self.collect(|m| !m.recalled && m.sender == sender);
        mine.iter()
            .rev()
            .nth(n)
            .map(|message| message.id)
            .ok_or_else(|| DirectoryError::UnknownMessage(n.to_string()))
    }
}

impl MessageStore for MemoryMessageStore {
    fn append(&self, draft: MessageDraft) -> MessageId {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.messages
            .insert(id, StoredMessage::from_draft(id, draft));
        id
    }

    fn query(&self, filter: &MessageFilter) -> Vec<StoredMessage> {
        self.collect(|message| !message.recalled && message.matches(filter))
    }

    fn recall(&self, sender: &str, reference: RecallRef) -> Result<StoredMessage> {
        let id = match reference {
            RecallRef::Id(id) => id,
            RecallRef::Latest => self.nth_latest(sender, 0)?,
            RecallRef::Nth(n) => self.nth_latest(sender, n)?,
        };

        let mut message = self
            .messages
            .get_mut(&id)
            .filter(|message| !message.recalled)
            .ok_or_else(|| DirectoryError::UnknownMessage(id.to_string()))?;
        if message.sender != sender {
            return Err(DirectoryError::NotAuthor);
        }
        message.recalled = true;
        Ok(message.clone())
    }
}
