//! Name definitions for broker resources.

use crate::{define_name, IdError};

/// Upper bound for any name; keeps property keys and secret paths sane.
pub const MAX_NAME_LEN: usize = 255;

fn check_len(kind: &'static str, s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if s.len() > MAX_NAME_LEN {
        return Err(IdError::TooLong {
            kind,
            len: s.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

fn check_printable(kind: &'static str, s: &str) -> Result<(), IdError> {
    check_len(kind, s)?;
    match s.chars().find(|c| c.is_whitespace() || c.is_control()) {
        Some(ch) => Err(IdError::InvalidCharacter { kind, ch }),
        None => Ok(()),
    }
}

/// Queue names become a segment of `yarn.scheduler.capacity.root.<name>.*`.
fn check_queue(kind: &'static str, s: &str) -> Result<(), IdError> {
    check_len(kind, s)?;
    match s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        Some(ch) => Err(IdError::InvalidCharacter { kind, ch }),
        None => Ok(()),
    }
}

/// User names become the middle field of a `u:<user>:<queue>` token.
fn check_mapping_token(kind: &'static str, s: &str) -> Result<(), IdError> {
    check_printable(kind, s)?;
    match s.chars().find(|c| *c == ':' || *c == ',') {
        Some(ch) => Err(IdError::InvalidCharacter { kind, ch }),
        None => Ok(()),
    }
}

// =============================================================================
// Broker catalog and instances
// =============================================================================

define_name!(InstanceId, "instance id", check_printable);
define_name!(ServiceId, "service id", check_printable);
define_name!(PlanId, "plan id", check_printable);

// =============================================================================
// Capacity scheduler
// =============================================================================

define_name!(QueueName, "queue name", check_queue);
define_name!(UserName, "user name", check_mapping_token);

impl QueueName {
    /// Name of the shared pool queue every tenant queue is carved out of.
    pub const DEFAULT: &'static str = "default";

    /// Synthesizes a fresh, globally unique queue name.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns true if this is the shared `default` queue.
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}
