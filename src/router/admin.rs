//! Account, group, moderation and wiretap commands.

use tracing::info;

use super::{Caller, CommandRouter, Outcome, on_off, required_receiver, required_text, switch};
use crate::{
    directory::{DirectoryError, MessageId, RecallRef},
    error::RouteError,
    message::{Message, MessageType},
    push::PushPolicy,
    role::Role,
    wiretap::{RequestOutcome, Selector, TapTarget, WiretapError},
};

fn ack(caller: Caller<'_>, note: &str) -> Outcome {
    Outcome::reply(Message::acknowledge(caller.name, Some(note)))
}

fn recall_ref(text: Option<&str>) -> Result<RecallRef, RouteError> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(RecallRef::Latest);
    };
    let bad = || RouteError::invalid(format!("bad message reference {text}"));
    match text.strip_prefix('#') {
        Some(id) => id.parse().map(|id| RecallRef::Id(MessageId::new(id))).map_err(|_| bad()),
        None => text.parse().map(RecallRef::Nth).map_err(|_| bad()),
    }
}

impl CommandRouter {
    pub(super) fn update(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let secret = message
            .text()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| RouteError::invalid("missing secret"))?;
        self.ctx.users.set_secret(caller.name, secret)?;
        Ok(ack(caller, "secret updated"))
    }

    /// `DEL` with no text deletes the caller's own account and ends the
    /// session; `USER <name>` and `GROUP <name>` are administrator commands.
    pub(super) fn delete(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let Some(target) = message.text().map(str::trim).filter(|t| !t.is_empty()) else {
            self.remove_user(caller.name)?;
            return Ok(Outcome::disconnect(Message::quit(caller.name)));
        };
        let (kind, name) = target
            .split_once(char::is_whitespace)
            .map(|(kind, name)| (kind.to_ascii_uppercase(), name.trim()))
            .ok_or_else(|| RouteError::invalid(format!("bad delete target {target}")))?;
        if !caller.role.permits(Role::Admin) {
            return Err(RouteError::PermissionDenied);
        }
        match kind.as_str() {
            "USER" if name == caller.name => {
                self.remove_user(name)?;
                Ok(Outcome::disconnect(Message::quit(caller.name)))
            }
            "USER" => {
                self.outranks(caller, name)?;
                self.remove_user(name)?;
                if let Some(peer) = self.ctx.registry.get(name) {
                    self.ctx.registry.remove(name, peer.connection);
                    let _ = peer
                        .handle
                        .try_push(Message::quit(name), PushPolicy::WarnAndDropIfFull);
                }
                info!(user = name, by = caller.name, "user deleted");
                Ok(ack(caller, &format!("deleted user {name}")))
            }
            "GROUP" => {
                self.ctx.groups.delete(name)?;
                self.ctx.wiretaps.forget_group(name);
                info!(group = name, by = caller.name, "group deleted");
                Ok(ack(caller, &format!("deleted group {name}")))
            }
            _ => Err(RouteError::invalid(format!("bad delete target {target}"))),
        }
    }

    fn remove_user(&self, name: &str) -> Result<(), RouteError> {
        self.ctx.users.delete_user(name)?;
        self.ctx.groups.forget_user(name);
        self.ctx.wiretaps.forget_user(name);
        Ok(())
    }

    /// Refuse to act on users whose role is above the caller's.
    fn outranks(&self, caller: Caller<'_>, target: &str) -> Result<(), RouteError> {
        let record = self
            .ctx
            .users
            .lookup(target)
            .ok_or_else(|| DirectoryError::UnknownUser(target.to_owned()))?;
        if record.role > caller.role {
            return Err(RouteError::PermissionDenied);
        }
        Ok(())
    }

    pub(super) fn join(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let group = required_text(message, "group")?;
        let note = if self.ctx.groups.join(group, caller.name)? {
            format!("joined {group}")
        } else {
            format!("already in {group}")
        };
        Ok(ack(caller, &note))
    }

    pub(super) fn leave(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let group = required_text(message, "group")?;
        let note = if self.ctx.groups.leave(group, caller.name)? {
            format!("left {group}")
        } else {
            format!("not in {group}")
        };
        Ok(ack(caller, &note))
    }

    pub(super) fn recall(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let reference = recall_ref(message.text())?;
        let recalled = self.ctx.store.recall(caller.name, reference)?;
        Ok(ack(caller, &format!("recalled {}", recalled.id)))
    }

    pub(super) fn wiretap(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let name = required_receiver(message, "wiretap target")?;
        let target = if message.kind() == MessageType::WiretapUser {
            self.ctx.users.lookup(name).is_some().then(|| TapTarget::User(name.to_owned()))
        } else {
            self.ctx.groups.exists(name).then(|| TapTarget::Group(name.to_owned()))
        }
        .ok_or_else(|| WiretapError::UnknownTarget(name.to_owned()))?;

        let outcome = self.ctx.wiretaps.request(caller.name, target, message.text());
        let request = outcome.request();
        if let RequestOutcome::Created(request) = &outcome {
            info!(id = %request.id, agency = caller.name, target = %request.target, "wiretap requested");
            self.ctx.notify(&format!("new wiretap request {request}"));
        }
        Ok(ack(caller, &format!("wiretap request {} {}", request.id, request.status)))
    }

    /// `APR`/`RJT`: apply a selector to the wiretap ledger and tell each
    /// affected agency.
    pub(super) fn decide(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let selector: Selector = required_text(message, "selector")?.parse()?;
        let agency = message.receiver().filter(|agency| !agency.is_empty());
        let approving = message.kind() == MessageType::Approve;
        let changed = if approving {
            self.ctx.wiretaps.approve(agency, selector)?
        } else {
            self.ctx.wiretaps.reject(agency, selector)?
        };

        let verb = if approving { "approved" } else { "rejected" };
        for request in &changed {
            info!(id = %request.id, by = caller.name, verb, "wiretap decided");
            self.ctx
                .notify(&format!("wiretap request {} {verb} by {}", request.id, caller.name));
            if let Some(peer) = self.ctx.registry.get(&request.requester) {
                let target = request.target.to_string();
                let frame = if approving {
                    Message::approve(caller.name, Some(&request.requester), &target)
                } else {
                    Message::reject(caller.name, Some(&request.requester), &target)
                };
                let _ = peer.handle.try_push(frame, PushPolicy::WarnAndDropIfFull);
            }
        }
        Ok(ack(caller, &format!("{verb} {} requests", changed.len())))
    }

    pub(super) fn change_role(
        &self,
        caller: Caller<'_>,
        message: &Message,
    ) -> Result<Outcome, RouteError> {
        let target = required_receiver(message, "user")?;
        let role: Role = required_text(message, "role")?
            .parse()
            .map_err(|err| RouteError::invalid(format!("{err}")))?;
        if role > caller.role {
            return Err(RouteError::PermissionDenied);
        }
        self.outranks(caller, target)?;
        self.ctx.users.set_role(target, role)?;
        if let Some(peer) = self.ctx.registry.get(target) {
            peer.role.set(role);
            let _ = peer.handle.try_push(
                Message::role(caller.name, target, role),
                PushPolicy::WarnAndDropIfFull,
            );
        }
        info!(user = target, %role, by = caller.name, "role changed");
        Ok(ack(caller, &format!("{target} is now {role}")))
    }

    pub(super) fn parent_control(
        &self,
        caller: Caller<'_>,
        message: &Message,
    ) -> Result<Outcome, RouteError> {
        let target = required_receiver(message, "user")?;
        let record = self
            .ctx
            .users
            .lookup(target)
            .ok_or_else(|| DirectoryError::UnknownUser(target.to_owned()))?;
        let enabled = switch(message.text(), record.parental_control)?;
        self.ctx.users.set_parental_control(target, enabled)?;
        Ok(ack(caller, &format!("parental control {} for {target}", on_off(enabled))))
    }

    pub(super) fn logger(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let enabled = switch(message.text(), self.ctx.traffic_log())?;
        self.ctx.set_traffic_log(enabled);
        info!(enabled, by = caller.name, "traffic logging switched");
        Ok(ack(caller, &format!("traffic logging {}", on_off(enabled))))
    }
}
