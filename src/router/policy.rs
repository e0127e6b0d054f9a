//! Who may issue which command.

use crate::{message::MessageType, role::Role};

/// Access rule attached to a message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Only valid before the session has signed in.
    Handshake,
    /// Sent by the server, never accepted from a client.
    ServerOnly,
    /// Accepted from signed-in users holding at least this role.
    Requires(Role),
}

/// Access rule for `kind`.
#[must_use]
pub fn access_for(kind: MessageType) -> Access {
    use MessageType as T;
    match kind {
        T::Hello | T::Signin | T::Signup => Access::Handshake,
        T::Acknowledge | T::NoAcknowledge => Access::ServerOnly,
        T::Help
        | T::Quit
        | T::Broadcast
        | T::Direct
        | T::Group
        | T::Retrieve
        | T::Update
        | T::Delete
        | T::Join
        | T::Leave
        | T::Recall => Access::Requires(Role::User),
        T::WiretapUser | T::WiretapGroup => Access::Requires(Role::Agency),
        T::Approve | T::Reject | T::Role | T::ParentControl | T::Logger => {
            Access::Requires(Role::Admin)
        }
    }
}

/// Commands a user holding `role` may issue once signed in, in protocol order.
#[must_use]
pub fn commands_for(role: Role) -> Vec<MessageType> {
    MessageType::ALL
        .iter()
        .copied()
        .filter(|kind| matches!(access_for(*kind), Access::Requires(min) if role.permits(min)))
        .collect()
}
