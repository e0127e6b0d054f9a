//! Canonical error and result types for the crate.
//!
//! Every failure a session tick can observe is a [`SessionError`]. Fatal
//! errors end the session; the rest are reported to the client as a
//! `NAK` frame whose text is the error's `Display` output.

use std::io;

use thiserror::Error;

use crate::{
    codec::FramingError,
    directory::DirectoryError,
    message::MessageType,
    session::AlreadyConnected,
    wiretap::WiretapError,
};

/// Failed login attempts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing user name")]
    MissingName,
    #[error("missing secret")]
    MissingSecret,
    #[error("not signed in")]
    NotSignedIn,
    #[error(transparent)]
    AlreadyConnected(#[from] AlreadyConnected),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Commands that were refused or could not be carried out.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("already signed in")]
    AlreadySignedIn,
    #[error("{0} is only sent by the server")]
    ServerOnly(MessageType),
    #[error("unknown recipient {0}")]
    UnknownRecipient(String),
    #[error("{0} is not accepting messages right now")]
    RecipientBusy(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("not a member of group {0}")]
    NotMember(String),
    #[error("unknown query {0:?}")]
    UnknownQuery(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Wiretap(#[from] WiretapError),
}

impl RouteError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self { Self::InvalidArgument(reason.into()) }
}

/// Any failure seen while ticking a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The inbound byte stream is malformed.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// The channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] io::Error),
    /// The peer closed the channel.
    #[error("stream closed")]
    StreamClosed,
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    #[error("command failed: {0}")]
    Route(#[from] RouteError),
}

impl SessionError {
    /// Returns `true` when the session must terminate.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Framing(_) | Self::Channel(_) | Self::StreamClosed
        )
    }

    /// Text sent back to the client for non-fatal errors.
    #[must_use]
    pub fn reply_text(&self) -> String {
        match self {
            Self::Authentication(err) => err.to_string(),
            Self::Route(err) => err.to_string(),
            other => other.to_string(),
        }
    }
}

/// Canonical result alias used by session code.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
