//! # yarnbroker-id
//!
//! Validated identifier and name types for the broker.
//!
//! ## Design Principles
//!
//! - Instance, service and plan ids are caller-supplied; we only validate them
//! - Queue and user names end up inside YARN property keys and
//!   `queue-mappings` tokens, so they use a restricted charset
//! - Types are distinct so an instance id can never be passed as a queue name
//!
//! ## Charsets
//!
//! | Type          | Allowed                                   |
//! |---------------|-------------------------------------------|
//! | `InstanceId`  | any printable, non-whitespace characters  |
//! | `ServiceId`   | any printable, non-whitespace characters  |
//! | `PlanId`      | any printable, non-whitespace characters  |
//! | `QueueName`   | `[A-Za-z0-9_-]`                           |
//! | `UserName`    | printable, no whitespace, `:` or `,`      |

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
