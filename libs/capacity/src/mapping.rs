//! `queue-mappings` tokens.
//!
//! The property is a comma separated list such as
//! `u:alice:tenant-a,g:analysts:tenant-b,u:bob:tenant-a`. Only `u:` tokens are
//! managed here; anything else is carried through verbatim.

use std::fmt;

use yarnbroker_id::{QueueName, UserName};

/// A single `u:<user>:<queue>` binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueMapping {
    pub user: UserName,
    pub queue: QueueName,
}

impl QueueMapping {
    pub fn new(user: UserName, queue: QueueName) -> Self {
        Self { user, queue }
    }

    /// Parses a user mapping token. Group mappings, wildcard mappings and
    /// malformed tokens yield `None`.
    pub fn parse_token(token: &str) -> Option<Self> {
        let mut parts = token.trim().splitn(3, ':');
        if parts.next()? != "u" {
            return None;
        }
        let user = UserName::parse(parts.next()?).ok()?;
        let queue = QueueName::parse(parts.next()?).ok()?;
        Some(Self { user, queue })
    }

    fn matches(&self, user: Option<&UserName>, queue: &QueueName) -> bool {
        &self.queue == queue && user.is_none_or(|u| &self.user == u)
    }
}

impl fmt::Display for QueueMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u:{}:{}", self.user, self.queue)
    }
}

/// The ordered token list of a `queue-mappings` property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMappings {
    tokens: Vec<String>,
}

impl QueueMappings {
    pub fn parse(value: &str) -> Self {
        let tokens = value
            .split(',')
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .collect();
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All user bindings, skipping tokens that are not `u:` mappings.
    pub fn user_mappings(&self) -> impl Iterator<Item = QueueMapping> + '_ {
        self.tokens.iter().filter_map(|t| QueueMapping::parse_token(t))
    }

    pub fn contains(&self, mapping: &QueueMapping) -> bool {
        self.user_mappings().any(|m| &m == mapping)
    }

    /// Appends a binding unless an identical one is already present.
    pub fn add(&mut self, mapping: &QueueMapping) {
        if !self.contains(mapping) {
            self.tokens.push(mapping.to_string());
        }
    }

    /// Drops the bindings of `user` to `queue`, or of every user to `queue`
    /// when `user` is `None`. Returns how many tokens were removed.
    pub fn remove(&mut self, user: Option<&UserName>, queue: &QueueName) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|t| {
            QueueMapping::parse_token(t).is_none_or(|m| !m.matches(user, queue))
        });
        before - self.tokens.len()
    }
}

impl fmt::Display for QueueMappings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(s: &str) -> UserName {
        UserName::parse(s).unwrap()
    }

    fn queue(s: &str) -> QueueName {
        QueueName::parse(s).unwrap()
    }

    #[test]
    fn test_parse_token() {
        let m = QueueMapping::parse_token("u:alice:tenant-a").unwrap();
        assert_eq!(m.user, user("alice"));
        assert_eq!(m.queue, queue("tenant-a"));

        assert!(QueueMapping::parse_token("g:analysts:tenant-a").is_none());
        assert!(QueueMapping::parse_token("u:alice").is_none());
        assert!(QueueMapping::parse_token("u:%user:%user").is_none());
    }

    #[test]
    fn test_empty_property() {
        let m = QueueMappings::parse("");
        assert!(m.is_empty());
        assert_eq!(m.to_string(), "");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut m = QueueMappings::parse("u:alice:q1");
        let binding = QueueMapping::new(user("alice"), queue("q1"));
        m.add(&binding);
        assert_eq!(m.to_string(), "u:alice:q1");

        m.add(&QueueMapping::new(user("bob"), queue("q1")));
        assert_eq!(m.to_string(), "u:alice:q1,u:bob:q1");
    }

    #[test]
    fn test_remove_user_keeps_others() {
        let mut m = QueueMappings::parse("u:alice:q1,g:ops:q1,u:bob:q1,u:alice:q2");
        let removed = m.remove(Some(&user("alice")), &queue("q1"));
        assert_eq!(removed, 1);
        assert_eq!(m.to_string(), "g:ops:q1,u:bob:q1,u:alice:q2");
    }

    #[test]
    fn test_remove_queue_drops_all_users() {
        let mut m = QueueMappings::parse("u:alice:q1,g:ops:q1,u:bob:q1,u:alice:q2");
        let removed = m.remove(None, &queue("q1"));
        assert_eq!(removed, 2);
        assert_eq!(m.to_string(), "g:ops:q1,u:alice:q2");
    }

    #[test]
    fn test_queue_name_must_match_exactly() {
        // A suffix match must not remove "u:alice:xq1".
        let mut m = QueueMappings::parse("u:alice:xq1,u:alice:q1");
        m.remove(None, &queue("q1"));
        assert_eq!(m.to_string(), "u:alice:xq1");
    }
}
