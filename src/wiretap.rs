//! Agency wiretap requests and the approval workflow.
//!
//! An agency asks to tap a user or group; the request stays pending until an
//! administrator approves or rejects it. Approved taps make the router mirror
//! matching traffic to the agency. Requests are keyed by `(requester, target)`
//! and carry a stable [`RequestId`] so administrators can select them without
//! depending on list positions.
//!
//! ```text
//! PENDING --approve--> APPROVED
//!    |
//!    +-----reject----> REJECTED (a new request replaces it)
//! ```

use std::{
    collections::BTreeSet,
    fmt,
    str::FromStr,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use thiserror::Error;

use crate::{
    message::{Message, MessageType},
    role::Role,
};

/// Stable identifier of a wiretap request, written as `#<n>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// What a request taps.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TapTarget {
    User(String),
    Group(String),
}

impl TapTarget {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            TapTarget::User(name) | TapTarget::Group(name) => name,
        }
    }
}

impl fmt::Display for TapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapTarget::User(name) => write!(f, "user {name}"),
            TapTarget::Group(name) => write!(f, "group {name}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for TapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TapStatus::Pending => "pending",
            TapStatus::Approved => "approved",
            TapStatus::Rejected => "rejected",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WiretapRequest {
    pub id: RequestId,
    pub requester: String,
    pub target: TapTarget,
    pub status: TapStatus,
    pub note: Option<String>,
}

impl fmt::Display for WiretapRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} [{}]",
            self.id, self.requester, self.target, self.status
        )?;
        if let Some(note) = &self.note {
            write!(f, " {note}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WiretapError {
    #[error("invalid selector {0:?}")]
    InvalidSelector(String),
    #[error("no matching wiretap request")]
    NoMatchingRequest,
    #[error("unknown wiretap target {0}")]
    UnknownTarget(String),
    #[error("wiretap request {0} is already approved")]
    AlreadyApproved(RequestId),
}

/// Which requests an approval or rejection applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Every pending request.
    All,
    /// The request with this id.
    Id(RequestId),
    /// Position in the creation-ordered list of pending requests.
    Index(usize),
}

impl FromStr for Selector {
    type Err = WiretapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || WiretapError::InvalidSelector(s.to_owned());
        if s == "*" {
            return Ok(Selector::All);
        }
        if let Some(id) = s.strip_prefix('#') {
            return id
                .parse()
                .map(|id| Selector::Id(RequestId(id)))
                .map_err(|_| invalid());
        }
        s.parse().map(Selector::Index).map_err(|_| invalid())
    }
}

/// Result of [`WiretapWorkflow::request`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Created(WiretapRequest),
    /// A pending or approved request for the same pair already existed.
    Existing(WiretapRequest),
}

impl RequestOutcome {
    #[must_use]
    pub fn request(&self) -> &WiretapRequest {
        match self {
            RequestOutcome::Created(request) | RequestOutcome::Existing(request) => request,
        }
    }
}

#[derive(Default)]
struct Ledger {
    next_id: u64,
    requests: Vec<WiretapRequest>,
}

/// Shared store of wiretap requests.
#[derive(Default)]
pub struct WiretapWorkflow {
    ledger: RwLock<Ledger>,
}

impl WiretapWorkflow {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// File a request from `requester` to tap `target`.
    ///
    /// A pending or approved request for the same pair is returned unchanged;
    /// a rejected one is replaced by a fresh pending request.
    pub fn request(
        &self,
        requester: &str,
        target: TapTarget,
        note: Option<&str>,
    ) -> RequestOutcome {
        let mut ledger = self.write();
        if let Some(existing) = ledger
            .requests
            .iter()
            .find(|r| r.requester == requester && r.target == target)
            && existing.status != TapStatus::Rejected
        {
            return RequestOutcome::Existing(existing.clone());
        }
        ledger
            .requests
            .retain(|r| !(r.requester == requester && r.target == target));
        ledger.next_id += 1;
        let request = WiretapRequest {
            id: RequestId(ledger.next_id),
            requester: requester.to_owned(),
            target,
            status: TapStatus::Pending,
            note: note.map(str::to_owned),
        };
        ledger.requests.push(request.clone());
        RequestOutcome::Created(request)
    }

    /// Approve the selected pending requests, optionally limited to those
    /// filed by `agency`. Returns the requests whose status changed.
    ///
    /// # Errors
    ///
    /// Returns [`WiretapError::NoMatchingRequest`] when an id or index
    /// selects nothing approvable.
    pub fn approve(
        &self,
        agency: Option<&str>,
        selector: Selector,
    ) -> Result<Vec<WiretapRequest>, WiretapError> {
        self.transition(agency, selector, TapStatus::Approved)
    }

    /// Reject the selected pending requests. Returns the requests whose status
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`WiretapError::AlreadyApproved`] when an id selects an
    /// approved request and [`WiretapError::NoMatchingRequest`] when the
    /// selector matches nothing.
    pub fn reject(
        &self,
        agency: Option<&str>,
        selector: Selector,
    ) -> Result<Vec<WiretapRequest>, WiretapError> {
        self.transition(agency, selector, TapStatus::Rejected)
    }

    fn transition(
        &self,
        agency: Option<&str>,
        selector: Selector,
        to: TapStatus,
    ) -> Result<Vec<WiretapRequest>, WiretapError> {
        let mut ledger = self.write();
        let filed_by = |r: &WiretapRequest| agency.is_none_or(|a| r.requester == a);
        let indices: Vec<usize> = match selector {
            Selector::All => ledger
                .requests
                .iter()
                .enumerate()
                .filter(|(_, r)| r.status == TapStatus::Pending && filed_by(*r))
                .map(|(i, _)| i)
                .collect(),
            Selector::Index(n) => {
                let index = ledger
                    .requests
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.status == TapStatus::Pending && filed_by(*r))
                    .map(|(i, _)| i)
                    .nth(n)
                    .ok_or(WiretapError::NoMatchingRequest)?;
                vec![index]
            }
            Selector::Id(id) => {
                let index = ledger
                    .requests
                    .iter()
                    .position(|r| r.id == id && filed_by(r))
                    .ok_or(WiretapError::NoMatchingRequest)?;
                match (ledger.requests[index].status, to) {
                    (TapStatus::Pending, _) => vec![index],
                    (current, wanted) if current == wanted => Vec::new(),
                    (TapStatus::Approved, _) => return Err(WiretapError::AlreadyApproved(id)),
                    (TapStatus::Rejected, _) => return Err(WiretapError::NoMatchingRequest),
                }
            }
        };

        Ok(indices
            .into_iter()
            .map(|i| {
                let request = &mut ledger.requests[i];
                request.status = to;
                request.clone()
            })
            .collect())
    }

    /// Requests visible to `viewer`: every pending or approved request for
    /// administrators, the viewer's own requests otherwise.
    #[must_use]
    pub fn visible_to(&self, viewer: &str, role: Role) -> Vec<WiretapRequest> {
        self.read()
            .requests
            .iter()
            .filter(|r| {
                if role.permits(Role::Admin) {
                    r.status != TapStatus::Rejected
                } else {
                    r.requester == viewer
                }
            })
            .cloned()
            .collect()
    }

    /// Agencies that should receive a mirrored copy of `message`, sorted and
    /// without duplicates.
    #[must_use]
    pub fn mirror_recipients(&self, message: &Message) -> Vec<String> {
        let sender = message.sender();
        let (direct, group) = match message.kind() {
            MessageType::Direct => (message.receiver(), None),
            MessageType::Group => (None, message.receiver()),
            _ => (None, None),
        };
        self.read()
            .requests
            .iter()
            .filter(|r| r.status == TapStatus::Approved)
            .filter(|r| match &r.target {
                TapTarget::User(name) => {
                    sender == Some(name.as_str()) || direct == Some(name.as_str())
                }
                TapTarget::Group(name) => group == Some(name.as_str()),
            })
            .map(|r| r.requester.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Drop every request filed by or targeting the user `name`.
    pub fn forget_user(&self, name: &str) {
        self.write().requests.retain(|r| {
            r.requester != name && r.target != TapTarget::User(name.to_owned())
        });
    }

    /// Drop every request targeting the group `name`.
    pub fn forget_group(&self, name: &str) {
        self.write()
            .requests
            .retain(|r| r.target != TapTarget::Group(name.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn user(name: &str) -> TapTarget { TapTarget::User(name.to_owned()) }

    #[fixture]
    fn workflow() -> WiretapWorkflow {
        let workflow = WiretapWorkflow::new();
        workflow.request("agencyOne", user("oma"), None);
        workflow.request("agencyTwo", TapTarget::Group("friends".into()), Some("case 7"));
        workflow
    }

    #[rstest]
    #[case("*", Selector::All)]
    #[case("#12", Selector::Id(RequestId::new(12)))]
    #[case(" 3 ", Selector::Index(3))]
    fn parses_selectors(#[case] input: &str, #[case] expected: Selector) {
        assert_eq!(input.parse::<Selector>(), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("#x")]
    #[case("-1")]
    fn rejects_bad_selectors(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Selector>(),
            Err(WiretapError::InvalidSelector(_))
        ));
    }

    #[rstest]
    fn re_requesting_returns_existing(workflow: WiretapWorkflow) {
        let again = workflow.request("agencyOne", user("oma"), None);
        assert!(matches!(again, RequestOutcome::Existing(ref r) if r.id == RequestId::new(1)));
        assert_eq!(workflow.visible_to("admin", Role::Admin).len(), 2);
    }

    #[rstest]
    fn approving_twice_is_a_no_op(workflow: WiretapWorkflow) {
        let changed = workflow
            .approve(None, Selector::Id(RequestId::new(1)))
            .expect("approve");
        assert_eq!(changed.len(), 1);
        let again = workflow
            .approve(None, Selector::Id(RequestId::new(1)))
            .expect("approve again");
        assert!(again.is_empty());

        let direct = Message::direct("oma", "bob", "hi");
        assert_eq!(workflow.mirror_recipients(&direct), vec!["agencyOne"]);
    }

    #[rstest]
    fn index_selects_within_pending_list(workflow: WiretapWorkflow) {
        let changed = workflow
            .approve(Some("agencyTwo"), Selector::Index(0))
            .expect("approve");
        assert_eq!(changed[0].requester, "agencyTwo");
        assert_eq!(
            workflow.approve(Some("agencyTwo"), Selector::Index(0)),
            Err(WiretapError::NoMatchingRequest)
        );
    }

    #[rstest]
    fn approved_requests_cannot_be_rejected(workflow: WiretapWorkflow) {
        workflow.approve(None, Selector::All).expect("approve all");
        assert_eq!(
            workflow.reject(None, Selector::Id(RequestId::new(2))),
            Err(WiretapError::AlreadyApproved(RequestId::new(2)))
        );
    }

    #[rstest]
    fn rejected_requests_are_hidden_and_replaceable(workflow: WiretapWorkflow) {
        workflow
            .reject(Some("agencyOne"), Selector::All)
            .expect("reject");
        let admin_view = workflow.visible_to("admin", Role::God);
        assert_eq!(admin_view.len(), 1);
        let own = workflow.visible_to("agencyOne", Role::Agency);
        assert_eq!(own[0].status, TapStatus::Rejected);

        let fresh = workflow.request("agencyOne", user("oma"), None);
        assert!(matches!(fresh, RequestOutcome::Created(ref r) if r.id == RequestId::new(3)));
    }

    #[rstest]
    fn mirrors_once_per_agency(workflow: WiretapWorkflow) {
        workflow.request("agencyOne", user("bob"), None);
        workflow.request("agencyOne", TapTarget::Group("friends".into()), None);
        workflow.approve(None, Selector::All).expect("approve all");

        let direct = Message::direct("oma", "bob", "hi");
        assert_eq!(workflow.mirror_recipients(&direct), vec!["agencyOne"]);

        let group = Message::group("carol", "friends", "hey");
        assert_eq!(
            workflow.mirror_recipients(&group),
            vec!["agencyOne", "agencyTwo"]
        );

        let unrelated = Message::broadcast("carol", "hello");
        assert!(workflow.mirror_recipients(&unrelated).is_empty());
    }

    #[rstest]
    fn pending_taps_do_not_mirror(workflow: WiretapWorkflow) {
        let direct = Message::direct("bob", "oma", "hi");
        assert!(workflow.mirror_recipients(&direct).is_empty());
    }

    #[rstest]
    fn forgetting_a_user_drops_their_requests(workflow: WiretapWorkflow) {
        workflow.forget_user("oma");
        workflow.forget_group("friends");
        assert!(workflow.visible_to("admin", Role::Admin).is_empty());
    }
}
