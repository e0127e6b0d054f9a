//! Protocol messages exchanged between clients and the server.
//!
//! A [`Message`] is a [`MessageType`] tag plus up to three optional string
//! fields: sender, receiver and text. Messages are immutable once built and
//! are only created through the named constructors below, each of which fixes
//! the fields that are meaningful for its type. The decoder in
//! [`crate::codec`] is the one other constructor and keeps fields verbatim.
//!
//! The canonical text form produced by [`fmt::Display`] is
//! `<TYPE> <len> <sender> <len> <receiver> <len> <text>` where every length
//! counts bytes and a missing field is written as the sentinel `--`.

use std::{fmt, str::FromStr};

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{
    codec::{CodecError, MessageCodec, NULL_SENTINEL},
    role::Role,
};

macro_rules! message_types {
    ($($(#[$doc:meta])* $variant:ident => $code:literal,)+) => {
        /// Closed set of message types understood by the protocol.
        ///
        /// The three-letter codes are the compatibility surface of the wire
        /// protocol and must never change.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($(#[$doc])* $variant,)+
        }

        impl MessageType {
            /// Every message type, in protocol declaration order.
            pub const ALL: &'static [MessageType] = &[$(MessageType::$variant,)+];

            /// Three-letter wire code for this type.
            #[must_use]
            pub fn code(self) -> &'static str {
                match self {
                    $(MessageType::$variant => $code,)+
                }
            }

            /// Look up a type by its wire code.
            #[must_use]
            pub fn from_code(code: &[u8]) -> Option<Self> {
                match code {
                    $(c if c == $code.as_bytes() => Some(MessageType::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

message_types! {
    /// Login attempt carrying the user name.
    Hello => "HLO",
    /// Request for the list of available commands, and its reply.
    Help => "HLP",
    /// Positive reply from the server.
    Acknowledge => "ACK",
    /// Negative reply from the server, optionally with a reason.
    NoAcknowledge => "NAK",
    /// Client logout request; echoed by the server once logout completes.
    Quit => "BYE",
    /// Text delivered to every connected user.
    Broadcast => "BCT",
    /// Text delivered to one user.
    Direct => "DIR",
    /// Text delivered to every member of a group.
    Group => "GRP",
    /// Query against the directories, and each result line.
    Retrieve => "RET",
    /// Change of the caller's own secret.
    Update => "UPD",
    /// Removal of a user or group.
    Delete => "DEL",
    /// Join a group.
    Join => "JIN",
    /// Leave a group.
    Leave => "LVE",
    /// Agency request to tap a user.
    WiretapUser => "WTU",
    /// Agency request to tap a group.
    WiretapGroup => "WTG",
    /// Approval of pending wiretap requests.
    Approve => "APR",
    /// Rejection of pending wiretap requests.
    Reject => "RJT",
    /// Sign in with name and secret.
    Signin => "SIN",
    /// Create an account with name and secret.
    Signup => "SUP",
    /// Change of a user's role.
    Role => "RLE",
    /// Retraction of a previously sent message.
    Recall => "RCL",
    /// Toggle of content filtering for a user.
    ParentControl => "PCL",
    /// Toggle of server-side traffic logging.
    Logger => "LOG",
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

/// A single protocol frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    sender: Option<String>,
    receiver: Option<String>,
    text: Option<String>,
}

fn owned(value: Option<&str>) -> Option<String> { value.map(str::to_owned) }

impl Message {
    fn new(
        kind: MessageType,
        sender: Option<&str>,
        receiver: Option<&str>,
        text: Option<&str>,
    ) -> Self {
        Self {
            kind,
            sender: owned(sender),
            receiver: owned(receiver),
            text: owned(text),
        }
    }

    /// Rebuild a message from decoded wire fields without interpretation.
    pub(crate) fn from_wire(
        kind: MessageType,
        sender: Option<String>,
        receiver: Option<String>,
        text: Option<String>,
    ) -> Self {
        Self {
            kind,
            sender,
            receiver,
            text,
        }
    }

    /// Login attempt for `name`, with an optional secret.
    #[must_use]
    pub fn hello(name: &str, secret: Option<&str>) -> Self {
        Self::new(MessageType::Hello, Some(name), None, secret)
    }

    /// Sign in as `name` using `secret`.
    #[must_use]
    pub fn signin(name: &str, secret: &str) -> Self {
        Self::new(MessageType::Signin, Some(name), None, Some(secret))
    }

    /// Create the account `name` protected by `secret`.
    #[must_use]
    pub fn signup(name: &str, secret: &str) -> Self {
        Self::new(MessageType::Signup, Some(name), None, Some(secret))
    }

    /// Positive reply addressed to `name`, with an optional note.
    #[must_use]
    pub fn acknowledge(name: &str, note: Option<&str>) -> Self {
        Self::new(MessageType::Acknowledge, Some(name), None, note)
    }

    /// Negative reply, with an optional human-readable reason.
    #[must_use]
    pub fn no_acknowledge(reason: Option<&str>) -> Self {
        Self::new(MessageType::NoAcknowledge, None, None, reason)
    }

    /// Logout request from `name`, or the server's logout confirmation.
    #[must_use]
    pub fn quit(name: &str) -> Self { Self::new(MessageType::Quit, Some(name), None, None) }

    /// Help request from `sender`.
    #[must_use]
    pub fn help(sender: &str) -> Self { Self::new(MessageType::Help, Some(sender), None, None) }

    /// Help reply listing the commands available to `receiver`.
    #[must_use]
    pub fn help_reply(receiver: &str, commands: &str) -> Self {
        Self::new(MessageType::Help, None, Some(receiver), Some(commands))
    }

    #[must_use]
    pub fn broadcast(sender: &str, text: &str) -> Self {
        Self::new(MessageType::Broadcast, Some(sender), None, Some(text))
    }

    #[must_use]
    pub fn direct(sender: &str, receiver: &str, text: &str) -> Self {
        Self::new(MessageType::Direct, Some(sender), Some(receiver), Some(text))
    }

    #[must_use]
    pub fn group(sender: &str, group: &str, text: &str) -> Self {
        Self::new(MessageType::Group, Some(sender), Some(group), Some(text))
    }

    /// Directory query such as `USERS` or `GROUP friends`.
    #[must_use]
    pub fn retrieve(sender: &str, query: &str) -> Self {
        Self::new(MessageType::Retrieve, Some(sender), None, Some(query))
    }

    /// One line of a query result, addressed to `receiver`.
    #[must_use]
    pub fn retrieve_result(receiver: &str, line: &str) -> Self {
        Self::new(MessageType::Retrieve, None, Some(receiver), Some(line))
    }

    /// Replace the sender's secret with `secret`.
    #[must_use]
    pub fn update(sender: &str, secret: &str) -> Self {
        Self::new(MessageType::Update, Some(sender), None, Some(secret))
    }

    /// Delete the sender's own account (`target == None`) or the object named
    /// by `target` (`USER <name>` or `GROUP <name>`).
    #[must_use]
    pub fn delete(sender: &str, target: Option<&str>) -> Self {
        Self::new(MessageType::Delete, Some(sender), None, target)
    }

    #[must_use]
    pub fn join(sender: &str, group: &str) -> Self {
        Self::new(MessageType::Join, Some(sender), None, Some(group))
    }

    #[must_use]
    pub fn leave(sender: &str, group: &str) -> Self {
        Self::new(MessageType::Leave, Some(sender), None, Some(group))
    }

    /// Agency request to tap the user `target`.
    #[must_use]
    pub fn wiretap_user(sender: &str, target: &str, note: Option<&str>) -> Self {
        Self::new(MessageType::WiretapUser, Some(sender), Some(target), note)
    }

    /// Agency request to tap the group `target`.
    #[must_use]
    pub fn wiretap_group(sender: &str, target: &str, note: Option<&str>) -> Self {
        Self::new(MessageType::WiretapGroup, Some(sender), Some(target), note)
    }

    /// Approve the wiretap requests matched by `selector`, optionally limited
    /// to those submitted by `agency`.
    #[must_use]
    pub fn approve(sender: &str, agency: Option<&str>, selector: &str) -> Self {
        Self::new(MessageType::Approve, Some(sender), agency, Some(selector))
    }

    /// Reject the wiretap requests matched by `selector`.
    #[must_use]
    pub fn reject(sender: &str, agency: Option<&str>, selector: &str) -> Self {
        Self::new(MessageType::Reject, Some(sender), agency, Some(selector))
    }

    /// Set the role of `target` to `role`.
    #[must_use]
    pub fn role(sender: &str, target: &str, role: Role) -> Self {
        Self::new(MessageType::Role, Some(sender), Some(target), Some(role.as_str()))
    }

    /// Recall one of the sender's messages; `reference` defaults to the latest.
    #[must_use]
    pub fn recall(sender: &str, reference: Option<&str>) -> Self {
        Self::new(MessageType::Recall, Some(sender), None, reference)
    }

    /// Switch content filtering for `target` (`on`, `off`, or toggle).
    #[must_use]
    pub fn parent_control(sender: &str, target: &str, setting: Option<&str>) -> Self {
        Self::new(MessageType::ParentControl, Some(sender), Some(target), setting)
    }

    /// Switch traffic logging (`on`, `off`, or toggle).
    #[must_use]
    pub fn logger(sender: &str, setting: Option<&str>) -> Self {
        Self::new(MessageType::Logger, Some(sender), None, setting)
    }

    #[must_use]
    pub fn kind(&self) -> MessageType { self.kind }

    #[must_use]
    pub fn sender(&self) -> Option<&str> { self.sender.as_deref() }

    #[must_use]
    pub fn receiver(&self) -> Option<&str> { self.receiver.as_deref() }

    #[must_use]
    pub fn text(&self) -> Option<&str> { self.text.as_deref() }

    /// Copy of this message attributed to `sender`. The type is preserved.
    #[must_use]
    pub fn with_sender(&self, sender: &str) -> Self {
        Self {
            sender: Some(sender.to_owned()),
            ..self.clone()
        }
    }

    /// Copy of this message with `text` replaced. The type is preserved.
    #[must_use]
    pub fn with_text(&self, text: Option<String>) -> Self {
        Self {
            text,
            ..self.clone()
        }
    }

    /// Returns `true` for the logout message.
    #[must_use]
    pub fn is_quit(&self) -> bool { self.kind == MessageType::Quit }

    pub(crate) fn fields(&self) -> [Option<&str>; 3] {
        [self.sender(), self.receiver(), self.text()]
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.code())?;
        for field in self.fields() {
            let value = field.unwrap_or(NULL_SENTINEL);
            write!(f, " {} {value}", value.len())?;
        }
        Ok(())
    }
}

impl FromStr for Message {
    type Err = CodecError;

    /// Parse exactly one frame in canonical form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut codec = MessageCodec::default();
        let mut buf = BytesMut::from(s.as_bytes());
        codec
            .decode_eof(&mut buf)?
            .ok_or(CodecError::Framing(crate::codec::FramingError::Truncated {
                have: s.len(),
            }))
    }
}
