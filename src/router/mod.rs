//! Command dispatch for signed-in sessions.
//!
//! [`CommandRouter`] checks every inbound message against the access table in
//! [`policy`], rewrites the sender to the session's identity and then applies
//! the command: fanning messages out to other sessions, querying or mutating
//! the directories, or driving the wiretap workflow.
//!
//! ```text
//! Message --access_for--> refused (NAK)
//!    |
//!    +--> delivery (BCT/DIR/GRP) --> recipients' queues --> agency mirrors
//!    +--> retrieve (RET)         --> RET lines + closing ACK
//!    +--> admin / account        --> directories, wiretaps, ACK
//! ```
//!
//! Failures are returned as [`RouteError`]s; the session turns them into
//! `NAK` replies and carries on.

use std::sync::Arc;

use tracing::debug;

use crate::{
    context::ServerContext,
    error::{AuthError, RouteError},
    message::{Message, MessageType},
    role::Role,
    session::ConnectionId,
};

mod admin;
mod delivery;
pub mod policy;
mod retrieve;

pub use policy::{Access, access_for, commands_for};
pub use retrieve::Query;

/// The signed-in session issuing a command.
#[derive(Clone, Copy, Debug)]
pub struct Caller<'a> {
    pub name: &'a str,
    pub connection: ConnectionId,
    pub role: Role,
}

/// What the caller's session should do after a command was applied.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Frames to send back to the caller, in order.
    pub replies: Vec<Message>,
    /// The session must stop reading and drain.
    pub disconnect: bool,
}

impl Outcome {
    pub(crate) fn reply(message: Message) -> Self {
        Self {
            replies: vec![message],
            disconnect: false,
        }
    }

    pub(crate) fn replies(replies: Vec<Message>) -> Self {
        Self {
            replies,
            disconnect: false,
        }
    }

    pub(crate) fn disconnect(message: Message) -> Self {
        Self {
            replies: vec![message],
            disconnect: true,
        }
    }
}

/// Identity established by a successful handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Login {
    pub name: String,
    pub role: Role,
    /// The account was created by this handshake.
    pub created: bool,
}

/// Applies client commands to the shared [`ServerContext`].
#[derive(Clone)]
pub struct CommandRouter {
    ctx: Arc<ServerContext>,
}

impl CommandRouter {
    #[must_use]
    pub fn new(ctx: Arc<ServerContext>) -> Self { Self { ctx } }

    #[must_use]
    pub fn context(&self) -> &Arc<ServerContext> { &self.ctx }

    /// Validate a handshake frame from a session that has not signed in.
    ///
    /// `HLO` and `SIN` carry the name as sender and the secret as text; `SUP`
    /// creates a `user` account first.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotSignedIn`] for frames that are not handshakes,
    /// and the directory's error when the credentials are refused.
    pub fn handshake(&self, message: &Message) -> Result<Login, AuthError> {
        if access_for(message.kind()) != Access::Handshake {
            return Err(AuthError::NotSignedIn);
        }
        let name = message
            .sender()
            .filter(|name| !name.is_empty())
            .ok_or(AuthError::MissingName)?;
        let secret = message.text().ok_or(AuthError::MissingSecret)?;

        if message.kind() == MessageType::Signup {
            let record = self.ctx.users.create_user(name, secret, Role::User)?;
            self.ctx.notify(&format!("new user {name}"));
            return Ok(Login {
                name: record.name,
                role: record.role,
                created: true,
            });
        }
        let role = self.ctx.users.authenticate(name, secret)?;
        Ok(Login {
            name: name.to_owned(),
            role,
            created: false,
        })
    }

    /// Apply `message` on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] when the command is refused or fails. Nothing
    /// has been delivered in that case.
    pub fn dispatch(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let kind = message.kind();
        match access_for(kind) {
            Access::Handshake => return Err(RouteError::AlreadySignedIn),
            Access::ServerOnly => return Err(RouteError::ServerOnly(kind)),
            Access::Requires(min) if !caller.role.permits(min) => {
                debug!(user = caller.name, %kind, role = %caller.role, "permission denied");
                return Err(RouteError::PermissionDenied);
            }
            Access::Requires(_) => {}
        }

        let message = message.with_sender(caller.name);
        match kind {
            MessageType::Quit => Ok(Outcome::disconnect(Message::quit(caller.name))),
            MessageType::Help => Ok(self.help(caller)),
            MessageType::Broadcast => self.broadcast(caller, &message),
            MessageType::Direct => self.direct(caller, &message),
            MessageType::Group => self.group(caller, &message),
            MessageType::Retrieve => self.retrieve(caller, &message),
            MessageType::Update => self.update(caller, &message),
            MessageType::Delete => self.delete(caller, &message),
            MessageType::Join => self.join(caller, &message),
            MessageType::Leave => self.leave(caller, &message),
            MessageType::Recall => self.recall(caller, &message),
            MessageType::WiretapUser | MessageType::WiretapGroup => {
                self.wiretap(caller, &message)
            }
            MessageType::Approve | MessageType::Reject => self.decide(caller, &message),
            MessageType::Role => self.change_role(caller, &message),
            MessageType::ParentControl => self.parent_control(caller, &message),
            MessageType::Logger => self.logger(caller, &message),
            // Refused by the access check above.
            MessageType::Hello
            | MessageType::Signin
            | MessageType::Signup
            | MessageType::Acknowledge
            | MessageType::NoAcknowledge => Ok(Outcome::default()),
        }
    }

    fn help(&self, caller: Caller<'_>) -> Outcome {
        let commands = commands_for(caller.role)
            .iter()
            .map(|kind| kind.code())
            .collect::<Vec<_>>()
            .join(" ");
        Outcome::reply(Message::help_reply(caller.name, &commands))
    }
}

/// Text field of `message`, or an [`RouteError::InvalidArgument`] naming
/// `what` when it is missing or blank.
fn required_text<'m>(message: &'m Message, what: &str) -> Result<&'m str, RouteError> {
    message
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| RouteError::invalid(format!("missing {what}")))
}

/// Receiver field of `message`, or an [`RouteError::InvalidArgument`].
fn required_receiver<'m>(message: &'m Message, what: &str) -> Result<&'m str, RouteError> {
    message
        .receiver()
        .filter(|receiver| !receiver.is_empty())
        .ok_or_else(|| RouteError::invalid(format!("missing {what}")))
}

/// Parse an `on`/`off` switch; `None` toggles `current`.
fn switch(setting: Option<&str>, current: bool) -> Result<bool, RouteError> {
    match setting.map(str::trim) {
        None | Some("") => Ok(!current),
        Some(value) if value.eq_ignore_ascii_case("on") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("off") => Ok(false),
        Some(other) => Err(RouteError::invalid(format!("expected on or off, got {other}"))),
    }
}

fn on_off(enabled: bool) -> &'static str { if enabled { "on" } else { "off" } }
