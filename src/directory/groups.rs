//! Named groups and their members.

use std::collections::BTreeSet;

use dashmap::DashMap;

use super::{DirectoryError, Result, validate_name};

/// Store of groups.
pub trait GroupDirectory: Send + Sync {
    /// Create an empty group. Returns `false` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidName`] if the name is not a single
    /// token.
    fn create(&self, group: &str) -> Result<bool>;

    /// Add `user` to `group`, creating the group when absent. Returns `false`
    /// if the user was already a member.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidName`] if the group name is invalid.
    fn join(&self, group: &str, user: &str) -> Result<bool>;

    /// Remove `user` from `group`. Returns `false` if the user was not a
    /// member.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownGroup`] if there is no such group.
    fn leave(&self, group: &str, user: &str) -> Result<bool>;

    /// Remove a group.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownGroup`] if there is no such group.
    fn delete(&self, group: &str) -> Result<()>;

    /// Members of `group`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownGroup`] if there is no such group.
    fn members(&self, group: &str) -> Result<Vec<String>>;

    /// All group names, sorted.
    fn groups(&self) -> Vec<String>;

    fn exists(&self, group: &str) -> bool;

    fn is_member(&self, group: &str, user: &str) -> bool;

    /// Drop `user` from every group.
    fn forget_user(&self, user: &str);
}

/// [`GroupDirectory`] kept in memory.
#[derive(Default)]
pub struct MemoryGroupDirectory {
    groups: DashMap<String, BTreeSet<String>>,
}

impl MemoryGroupDirectory {
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

fn unknown(group: &str) -> DirectoryError { DirectoryError::UnknownGroup(group.to_owned()) }

impl GroupDirectory for MemoryGroupDirectory {
    fn create(&self, group: &str) -> Result<bool> {
        validate_name(group)?;
        if self.groups.contains_key(group) {
            return Ok(false);
        }
        Ok(self.groups.insert(group.to_owned(), BTreeSet::new()).is_none())
    }

    fn join(&self, group: &str, user: &str) -> Result<bool> {
        validate_name(group)?;
        Ok(self
            .groups
            .entry(group.to_owned())
            .or_default()
            .insert(user.to_owned()))
    }

    fn leave(&self, group: &str, user: &str) -> Result<bool> {
        self.groups
            .get_mut(group)
            .map(|mut members| members.remove(user))
            .ok_or_else(|| unknown(group))
    }

    fn delete(&self, group: &str) -> Result<()> {
        self.groups
            .remove(group)
            .map(|_| ())
            .ok_or_else(|| unknown(group))
    }

    fn members(&self, group: &str) -> Result<Vec<String>> {
        self.groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .ok_or_else(|| unknown(group))
    }

    fn groups(&self) -> Vec<String> {
        let mut names: Vec<_> = self.groups.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn exists(&self, group: &str) -> bool { self.groups.contains_key(group) }

    fn is_member(&self, group: &str, user: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.contains(user))
    }

    fn forget_user(&self, user: &str) {
        for mut members in self.groups.iter_mut() {
            members.remove(user);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_creates_group_and_is_idempotent() {
        let groups = MemoryGroupDirectory::new();
        assert_eq!(groups.join("friends", "alice"), Ok(true));
        assert_eq!(groups.join("friends", "alice"), Ok(false));
        assert_eq!(groups.members("friends"), Ok(vec!["alice".to_owned()]));
        assert_eq!(groups.create("friends"), Ok(false));
    }

    #[test]
    fn leave_is_idempotent() {
        let groups = MemoryGroupDirectory::new();
        groups.join("friends", "alice").expect("join");
        assert_eq!(groups.leave("friends", "alice"), Ok(true));
        assert_eq!(groups.leave("friends", "alice"), Ok(false));
        assert!(groups.exists("friends"));
    }

    #[test]
    fn unknown_groups_are_reported() {
        let groups = MemoryGroupDirectory::new();
        assert_eq!(groups.members("none"), Err(unknown("none")));
        assert_eq!(groups.delete("none"), Err(unknown("none")));
        assert!(!groups.is_member("none", "alice"));
    }

    #[test]
    fn forgotten_users_leave_every_group() {
        let groups = MemoryGroupDirectory::new();
        groups.join("a", "alice").expect("join");
        groups.join("b", "alice").expect("join");
        groups.join("b", "bob").expect("join");
        groups.forget_user("alice");
        assert!(!groups.is_member("a", "alice"));
        assert_eq!(groups.members("b"), Ok(vec!["bob".to_owned()]));
        assert_eq!(groups.groups(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
