//! Conversation Membership Resolver

pub mod resolver;

pub use resolver::{InMemoryMembership, MemberRole, MembershipError, MembershipResolver};

use crate::errors::EngineError;

impl From<MembershipError> for EngineError {
    fn from(err: MembershipError) -> Self {
        EngineError::Membership(err.to_string())
    }
}
