//! Authorization levels and the shared role cell used by live sessions.

use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU8, Ordering},
};

use thiserror::Error;

/// Authorization level of a user.
///
/// Ordering is significant: `User < Agency < Admin < God`. A command whose
/// minimum role is `Agency` may be issued by agencies, admins and gods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    #[default]
    User,
    Agency,
    Admin,
    God,
}

impl Role {
    /// All roles in ascending order.
    pub const ALL: [Role; 4] = [Role::User, Role::Agency, Role::Admin, Role::God];

    /// Lower-case name used on the wire (for example in `RLE` frames).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agency => "agency",
            Role::Admin => "admin",
            Role::God => "god",
        }
    }

    /// Returns `true` when this role meets or exceeds `required`.
    #[must_use]
    pub fn permits(self, required: Role) -> bool { self >= required }

    fn to_u8(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Agency => 1,
            Role::Admin => 2,
            Role::God => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Role::User,
            1 => Role::Agency,
            2 => Role::Admin,
            _ => Role::God,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when a role name cannot be parsed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRole(s.to_owned()))
    }
}

/// Role shared between a session and the router.
///
/// The owning session reads it on every dispatch; the router writes it when an
/// administrator issues a role change for a connected user.
#[derive(Debug)]
pub struct RoleCell(AtomicU8);

impl RoleCell {
    #[must_use]
    pub fn new(role: Role) -> Self { Self(AtomicU8::new(role.to_u8())) }

    #[must_use]
    pub fn get(&self) -> Role { Role::from_u8(self.0.load(Ordering::Acquire)) }

    pub fn set(&self, role: Role) { self.0.store(role.to_u8(), Ordering::Release); }
}

impl Default for RoleCell {
    fn default() -> Self { Self::new(Role::User) }
}
