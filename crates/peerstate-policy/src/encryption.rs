//! Per-path encryption rules.
//!
//! The first rule whose pattern matches an outgoing operation and which
//! names at least one recipient decides the encryption group. The signed
//! operation token is then sealed with that group's secret.

use std::fmt;

use tracing::debug;

use peerstate_core::{
    seal_token, Action, EncryptionGroup, Iv, Operation, RetryCondition, Sealing,
    SecretResolution, SecretResolver,
};

use crate::error::Result;
use crate::pattern::{PathMatch, PathPattern};

/// Everything a recipient producer can look at.
#[derive(Debug)]
pub struct EncryptionContext<'a, T> {
    /// The document before the operation.
    pub document: &'a T,
    /// The outgoing operation.
    pub operation: &'a Operation,
    /// Parameters captured from the operation path.
    pub params: &'a PathMatch,
}

/// Result of running an outgoing action through the encryption rules.
#[derive(Debug, Clone)]
pub enum SealOutcome {
    /// No rule asked for encryption; the action is unchanged.
    Plain(Action),
    /// The operation token was sealed for a group.
    Sealed(Action),
    /// The group secret is still being provisioned.
    Retry(RetryCondition),
    /// This party may not hold the group secret.
    Denied,
}

type Producer<T> = Box<dyn Fn(&EncryptionContext<'_, T>) -> Option<Vec<String>> + Send + Sync>;

struct EncryptionRule<T> {
    pattern: PathPattern,
    producer: Producer<T>,
}

/// An ordered table of path pattern → recipient producer.
pub struct EncryptionRules<T> {
    rules: Vec<EncryptionRule<T>>,
}

impl<T> Default for EncryptionRules<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EncryptionRules<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.pattern.as_str()))
            .finish()
    }
}

impl<T> EncryptionRules<T> {
    /// An empty table. Nothing is encrypted.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. `producer` returns the recipient identifiers, or
    /// `None`/an empty list to leave the decision to later rules.
    pub fn rule<F>(mut self, pattern: &str, producer: F) -> Result<Self>
    where
        F: Fn(&EncryptionContext<'_, T>) -> Option<Vec<String>> + Send + Sync + 'static,
    {
        self.rules.push(EncryptionRule {
            pattern: PathPattern::parse(pattern)?,
            producer: Box::new(producer),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The recipients named by the first matching rule with a non-empty answer.
    pub fn recipients(&self, document: &T, operation: &Operation) -> Option<Vec<String>> {
        self.rules.iter().find_map(|rule| {
            let params = rule.pattern.matches(operation.path())?;
            let ctx = EncryptionContext {
                document,
                operation,
                params: &params,
            };
            (rule.producer)(&ctx).filter(|ids| !ids.is_empty())
        })
    }

    /// Seal `action` if a rule names recipients for `operation`.
    ///
    /// The secret is always resolved with no key id, so the sender's own copy
    /// of the group secret is used and recorded on the action.
    pub fn seal(
        &self,
        document: &T,
        action: Action,
        operation: &Operation,
        sender_id: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<SealOutcome> {
        let Some(recipients) = self.recipients(document, operation) else {
            return Ok(SealOutcome::Plain(action));
        };

        let group = EncryptionGroup::canonical(&recipients, sender_id);
        debug!(path = operation.path(), group = %group, "encrypting operation");

        let key = match resolver.resolve_secret(&group, None) {
            SecretResolution::Key(key) => key,
            SecretResolution::Retry(condition) => return Ok(SealOutcome::Retry(condition)),
            SecretResolution::Denied => return Ok(SealOutcome::Denied),
        };

        let iv = Iv::generate();
        let operation_token = seal_token(&action.operation_token, &key.secret, &iv)?;

        Ok(SealOutcome::Sealed(Action {
            sender_token: action.sender_token,
            operation_token,
            sealing: Some(Sealing {
                encryption_group: group,
                iv,
                secret_key_id: Some(key.id),
            }),
        }))
    }
}
