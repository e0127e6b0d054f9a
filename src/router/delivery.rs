//! Broadcast, direct and group delivery.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info};

use super::{Caller, CommandRouter, Outcome, required_receiver};
use crate::{
    directory::MessageDraft,
    error::RouteError,
    message::{Message, MessageType},
    metrics,
    push::{PushError, PushPolicy},
    role::Role,
    session::Peer,
};

fn required_body(message: &Message) -> Result<&str, RouteError> {
    message
        .text()
        .ok_or_else(|| RouteError::invalid("missing text"))
}

impl CommandRouter {
    pub(super) fn broadcast(
        &self,
        caller: Caller<'_>,
        message: &Message,
    ) -> Result<Outcome, RouteError> {
        required_body(message)?;
        let peers = self
            .ctx
            .registry
            .active_handles()
            .into_iter()
            .filter(|(name, _)| name != caller.name);
        let recipients = self.fan_out(message, peers);
        self.finish(caller, message, None, None, recipients);
        Ok(Outcome::default())
    }

    pub(super) fn direct(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let receiver = required_receiver(message, "recipient")?;
        required_body(message)?;
        let unknown = || RouteError::UnknownRecipient(receiver.to_owned());
        let peer = self.ctx.registry.get(receiver).ok_or_else(unknown)?;
        match self.deliver(receiver, &peer, message, PushPolicy::ReturnErrorIfFull) {
            Ok(()) => {}
            Err(PushError::QueueFull) => {
                return Err(RouteError::RecipientBusy(receiver.to_owned()));
            }
            Err(_) => return Err(unknown()),
        }
        self.finish(
            caller,
            message,
            Some(receiver),
            None,
            vec![receiver.to_owned()],
        );
        Ok(Outcome::default())
    }

    pub(super) fn group(&self, caller: Caller<'_>, message: &Message) -> Result<Outcome, RouteError> {
        let group = required_receiver(message, "group")?;
        required_body(message)?;
        if !self.ctx.groups.exists(group) {
            return Err(RouteError::UnknownGroup(group.to_owned()));
        }
        if !caller.role.permits(Role::Admin) && !self.ctx.groups.is_member(group, caller.name) {
            return Err(RouteError::NotMember(group.to_owned()));
        }
        let members: HashSet<String> = self.ctx.groups.members(group)?.into_iter().collect();
        let peers = self
            .ctx
            .registry
            .active_handles()
            .into_iter()
            .filter(|(name, _)| name != caller.name && members.contains(name));
        let recipients = self.fan_out(message, peers);
        self.finish(caller, message, None, Some(group), recipients);
        Ok(Outcome::default())
    }

    /// Push `message` to every peer, returning the names it reached.
    fn fan_out(
        &self,
        message: &Message,
        peers: impl Iterator<Item = (String, Peer)>,
    ) -> Vec<String> {
        let mut reached: Vec<String> = peers
            .filter(|(name, peer)| {
                self.deliver(name, peer, message, PushPolicy::WarnAndDropIfFull)
                    .is_ok()
            })
            .map(|(name, _)| name)
            .collect();
        reached.sort();
        reached
    }

    /// Push `message` to one peer, scrubbing the text when the recipient has
    /// parental control switched on.
    fn deliver(
        &self,
        name: &str,
        peer: &Peer,
        message: &Message,
        policy: PushPolicy,
    ) -> Result<(), PushError> {
        let frame = self.scrub_for(name, message);
        peer.handle.try_push(frame, policy).inspect_err(|error| {
            debug!(recipient = name, %error, "message not delivered");
        })
    }

    pub(super) fn scrub_for(&self, name: &str, message: &Message) -> Message {
        let filtered = self
            .ctx
            .users
            .lookup(name)
            .is_some_and(|record| record.parental_control);
        match message.text() {
            Some(text) if filtered => message.with_text(Some(self.ctx.filter.filter(text))),
            _ => message.clone(),
        }
    }

    /// Log, store and mirror a delivered message.
    fn finish(
        &self,
        caller: Caller<'_>,
        message: &Message,
        receiver: Option<&str>,
        group: Option<&str>,
        recipients: Vec<String>,
    ) {
        let text = message.text().unwrap_or_default();
        if self.ctx.traffic_log() {
            info!(
                target: "chatwire::traffic",
                kind = %message.kind(),
                sender = caller.name,
                receiver = receiver.or(group),
                recipients = recipients.len(),
                text,
                "routed message"
            );
        }
        let id = self.ctx.store.append(MessageDraft {
            timestamp: Utc::now(),
            sender: caller.name.to_owned(),
            receiver: receiver.map(str::to_owned),
            group: group.map(str::to_owned),
            recipients,
            text: text.to_owned(),
        });
        debug!(%id, kind = %message.kind(), sender = caller.name, "message stored");
        self.mirror(caller, message);
    }

    /// Copy `message` to every agency holding an approved tap on it, unless
    /// that agency already took part in the exchange.
    fn mirror(&self, caller: Caller<'_>, message: &Message) {
        let direct_receiver = match message.kind() {
            MessageType::Direct => message.receiver(),
            _ => None,
        };
        for agency in self.ctx.wiretaps.mirror_recipients(message) {
            if agency == caller.name || direct_receiver == Some(agency.as_str()) {
                continue;
            }
            if let Some(peer) = self.ctx.registry.get(&agency)
                && peer
                    .handle
                    .try_push(message.clone(), PushPolicy::WarnAndDropIfFull)
                    .is_ok()
            {
                metrics::inc_mirrors();
            }
        }
    }
}
