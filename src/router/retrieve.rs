//! `RET` sub-queries.

use std::str::FromStr;

use chrono::NaiveDate;

use super::{Caller, CommandRouter, Outcome, required_text};
use crate::{
    directory::{MessageFilter, StoredMessage},
    error::RouteError,
    message::Message,
    role::Role,
};

/// A parsed `RET` query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    Users,
    Online,
    Groups,
    Group(String),
    GroupMessages(String),
    SentMessages,
    ReceivedMessages,
    Wiretaps,
    Sender(String),
    Receiver(String),
    Content(String),
    Date(NaiveDate),
}

impl Query {
    /// Lowest role allowed to run the query.
    #[must_use]
    pub fn min_role(&self) -> Role {
        match self {
            Query::Users
            | Query::Online
            | Query::Groups
            | Query::Group(_)
            | Query::GroupMessages(_)
            | Query::SentMessages
            | Query::ReceivedMessages => Role::User,
            Query::Wiretaps => Role::Agency,
            Query::Sender(_) | Query::Receiver(_) | Query::Content(_) | Query::Date(_) => {
                Role::Admin
            }
        }
    }
}

fn argument(keyword: &str, arg: &str) -> Result<String, RouteError> {
    if arg.is_empty() {
        return Err(RouteError::invalid(format!("{keyword} needs an argument")));
    }
    Ok(arg.to_owned())
}

/// Parses `<KEYWORD> [argument]`. The keyword is case-insensitive; the
/// argument is the rest of the text, trimmed.
impl FromStr for Query {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (keyword, arg) = s
            .split_once(char::is_whitespace)
            .map_or((s, ""), |(keyword, arg)| (keyword, arg.trim()));
        let query = match keyword.to_ascii_uppercase().as_str() {
            "USERS" => Query::Users,
            "ONLINE" => Query::Online,
            "GROUPS" => Query::Groups,
            "GROUP" => Query::Group(argument(keyword, arg)?),
            "GROUP_MESSAGES" => Query::GroupMessages(argument(keyword, arg)?),
            "SEND_MESSAGES" => Query::SentMessages,
            "RECEIVE_MESSAGES" => Query::ReceivedMessages,
            "WIRETAPS" | "REQUESTS" => Query::Wiretaps,
            "SENDER" => Query::Sender(argument(keyword, arg)?),
            "RECEIVER" => Query::Receiver(argument(keyword, arg)?),
            "CONTENT" => Query::Content(argument(keyword, arg)?),
            "DATE" => {
                let day = argument(keyword, arg)?;
                Query::Date(
                    NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                        .map_err(|_| RouteError::invalid(format!("bad date {day}")))?,
                )
            }
            _ => return Err(RouteError::UnknownQuery(s.to_owned())),
        };
        Ok(query)
    }
}

fn history(messages: Vec<StoredMessage>) -> Vec<String> {
    messages.iter().map(ToString::to_string).collect()
}

impl CommandRouter {
    pub(super) fn retrieve(
        &self,
        caller: Caller<'_>,
        message: &Message,
    ) -> Result<Outcome, RouteError> {
        let query: Query = required_text(message, "query")?.parse()?;
        if !caller.role.permits(query.min_role()) {
            return Err(RouteError::PermissionDenied);
        }
        let lines = self.run_query(caller, query)?;

        let mut replies: Vec<Message> = lines
            .iter()
            .map(|line| {
                let reply = Message::retrieve_result(caller.name, line);
                self.scrub_for(caller.name, &reply)
            })
            .collect();
        let summary = format!("{} results", lines.len());
        replies.push(Message::acknowledge(caller.name, Some(&summary)));
        Ok(Outcome::replies(replies))
    }

    fn run_query(&self, caller: Caller<'_>, query: Query) -> Result<Vec<String>, RouteError> {
        let store = &self.ctx.store;
        let lines = match query {
            Query::Users => self.ctx.users.user_names(),
            Query::Online => self.ctx.registry.active_names(),
            Query::Groups => self.ctx.groups.groups(),
            Query::Group(group) => self.ctx.groups.members(&group)?,
            Query::GroupMessages(group) => {
                if !self.ctx.groups.exists(&group) {
                    return Err(RouteError::UnknownGroup(group));
                }
                if !caller.role.permits(Role::Admin)
                    && !self.ctx.groups.is_member(&group, caller.name)
                {
                    return Err(RouteError::NotMember(group));
                }
                history(store.query(&MessageFilter::Group(group)))
            }
            Query::SentMessages => {
                history(store.query(&MessageFilter::Sender(caller.name.to_owned())))
            }
            Query::ReceivedMessages => {
                history(store.query(&MessageFilter::Receiver(caller.name.to_owned())))
            }
            Query::Wiretaps => self
                .ctx
                .wiretaps
                .visible_to(caller.name, caller.role)
                .iter()
                .map(ToString::to_string)
                .collect(),
            Query::Sender(user) => history(store.query(&MessageFilter::Sender(user))),
            Query::Receiver(user) => history(store.query(&MessageFilter::Receiver(user))),
            Query::Content(needle) => history(store.query(&MessageFilter::Content(needle))),
            Query::Date(day) => history(store.query(&MessageFilter::Date(day))),
        };
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("USERS", Query::Users)]
    #[case("online", Query::Online)]
    #[case("GROUP friends", Query::Group("friends".into()))]
    #[case("group_messages  friends ", Query::GroupMessages("friends".into()))]
    #[case("REQUESTS", Query::Wiretaps)]
    #[case("CONTENT hello there", Query::Content("hello there".into()))]
    #[case(
        "DATE 2024-03-01",
        Query::Date(NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"))
    )]
    fn parses_queries(#[case] input: &str, #[case] expected: Query) {
        assert_eq!(input.parse::<Query>(), Ok(expected));
    }

    #[test]
    fn unknown_keyword_is_reported() {
        assert_eq!(
            "FRIENDS".parse::<Query>(),
            Err(RouteError::UnknownQuery("FRIENDS".into()))
        );
    }

    #[rstest]
    #[case("GROUP")]
    #[case("SENDER   ")]
    #[case("DATE yesterday")]
    fn missing_or_bad_arguments_are_invalid(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Query>(),
            Err(RouteError::InvalidArgument(_))
        ));
    }

    #[test]
    fn admin_queries_need_admin() {
        assert_eq!(Query::Sender("bob".into()).min_role(), Role::Admin);
        assert_eq!(Query::Wiretaps.min_role(), Role::Agency);
        assert_eq!(Query::SentMessages.min_role(), Role::User);
    }
}
