//! Shared server state handed to every session and the router.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::{
    directory::{
        ContentFilter,
        GroupDirectory,
        LogNotificationSink,
        MemoryGroupDirectory,
        MemoryMessageStore,
        MemoryUserDirectory,
        MessageStore,
        NotificationSink,
        UserDirectory,
        WordListFilter,
    },
    session::{ConnectionId, SessionRegistry},
    wiretap::WiretapWorkflow,
};

/// Everything sessions share: directories, the live session registry, the
/// wiretap ledger and the traffic-logging switch.
///
/// Built once at startup and passed around behind an [`Arc`].
pub struct ServerContext {
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) groups: Arc<dyn GroupDirectory>,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
    pub(crate) filter: Arc<dyn ContentFilter>,
    pub(crate) registry: SessionRegistry,
    pub(crate) wiretaps: WiretapWorkflow,
    traffic_log: AtomicBool,
    next_connection: AtomicU64,
}

impl ServerContext {
    /// Start building a context; unset collaborators default to the in-memory
    /// implementations.
    #[must_use]
    pub fn builder() -> ServerContextBuilder { ServerContextBuilder::default() }

    /// Context backed entirely by in-memory collaborators.
    #[must_use]
    pub fn in_memory() -> Self { Self::builder().build() }

    #[must_use]
    pub fn users(&self) -> &dyn UserDirectory { self.users.as_ref() }

    #[must_use]
    pub fn groups(&self) -> &dyn GroupDirectory { self.groups.as_ref() }

    #[must_use]
    pub fn store(&self) -> &dyn MessageStore { self.store.as_ref() }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry { &self.registry }

    #[must_use]
    pub fn wiretaps(&self) -> &WiretapWorkflow { &self.wiretaps }

    /// Returns `true` while traffic logging is switched on.
    #[must_use]
    pub fn traffic_log(&self) -> bool { self.traffic_log.load(Ordering::Relaxed) }

    pub fn set_traffic_log(&self, enabled: bool) { self.traffic_log.store(enabled, Ordering::Relaxed); }

    pub(crate) fn notify(&self, text: &str) { self.notifier.notify(text); }

    /// Allocate the identifier for a newly accepted connection.
    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Builder for [`ServerContext`].
#[derive(Default)]
pub struct ServerContextBuilder {
    users: Option<Arc<dyn UserDirectory>>,
    groups: Option<Arc<dyn GroupDirectory>>,
    store: Option<Arc<dyn MessageStore>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    filter: Option<Arc<dyn ContentFilter>>,
    traffic_log: bool,
}

impl ServerContextBuilder {
    #[must_use]
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    #[must_use]
    pub fn groups(mut self, groups: Arc<dyn GroupDirectory>) -> Self {
        self.groups = Some(groups);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Arc<dyn ContentFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Start with traffic logging switched on.
    #[must_use]
    pub fn traffic_log(mut self, enabled: bool) -> Self {
        self.traffic_log = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> ServerContext {
        ServerContext {
            users: self
                .users
                .unwrap_or_else(|| Arc::new(MemoryUserDirectory::new())),
            groups: self
                .groups
                .unwrap_or_else(|| Arc::new(MemoryGroupDirectory::new())),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryMessageStore::new())),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotificationSink)),
            filter: self
                .filter
                .unwrap_or_else(|| Arc::new(WordListFilter::default())),
            registry: SessionRegistry::default(),
            wiretaps: WiretapWorkflow::new(),
            traffic_log: AtomicBool::new(self.traffic_log),
            next_connection: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    #[test]
    fn connection_ids_are_unique() {
        let ctx = ServerContext::in_memory();
        let first = ctx.next_connection_id();
        let second = ctx.next_connection_id();
        assert_ne!(first, second);
    }

    #[test]
    fn builder_keeps_supplied_collaborators() {
        let users = Arc::new(MemoryUserDirectory::new());
        users
            .create_user("root", "pw", Role::God)
            .expect("create user");
        let ctx = ServerContext::builder()
            .users(users)
            .traffic_log(true)
            .build();
        assert_eq!(ctx.users().authenticate("root", "pw"), Ok(Role::God));
        assert!(ctx.traffic_log());
        ctx.set_traffic_log(false);
        assert!(!ctx.traffic_log());
    }
}
