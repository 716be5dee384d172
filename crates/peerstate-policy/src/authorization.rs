//! Per-path authorization rules.
//!
//! An operation is checked together with every leaf operation it implies
//! (see [`flatten`]). Each entry is judged by the rules whose pattern matches
//! its path; any denied entry denies the whole operation, and the final
//! entry must be explicitly allowed.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use peerstate_core::{flatten, OpKind, Operation};

use crate::error::Result;
use crate::pattern::{PathMatch, PathPattern};

/// What a single rule says about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
    /// The rule has no opinion; earlier verdicts stand.
    Abstain,
}

impl From<bool> for Verdict {
    fn from(allowed: bool) -> Self {
        if allowed {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

impl From<Option<bool>> for Verdict {
    fn from(verdict: Option<bool>) -> Self {
        verdict.map_or(Verdict::Abstain, Verdict::from)
    }
}

/// How matching rules are combined for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationMode {
    /// The last matching non-abstaining rule decides.
    #[default]
    LastMatchWins,
    /// All matching non-abstaining rules must agree.
    Strict,
}

/// Everything a rule predicate can look at.
#[derive(Debug)]
pub struct RuleContext<'a, T> {
    /// Identifier of the authenticated sender.
    pub sender_id: &'a str,
    /// The document before the operation.
    pub document: &'a T,
    /// The entry being judged (the operation or one of its leaves).
    pub operation: &'a Operation,
    /// Parameters captured from the entry path.
    pub params: &'a PathMatch,
}

/// Why an operation was not authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// `move` and `copy` have no source-path authorization.
    UnsupportedOperation(OpKind),
    /// A rule denied the entry at `path`.
    Rejected { path: String },
    /// No rule allowed the final entry at `path`.
    NotGranted { path: String },
    /// Matching rules disagreed about `path` (strict mode only).
    Conflict { path: String },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::UnsupportedOperation(kind) => write!(f, "unsupported operation: {kind}"),
            Denial::Rejected { path } => write!(f, "rejected at {path}"),
            Denial::NotGranted { path } => write!(f, "not granted at {path}"),
            Denial::Conflict { path } => write!(f, "conflicting rules at {path}"),
        }
    }
}

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    Authorized(Operation),
    Denied(Denial),
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Authorization::Authorized(_))
    }
}

type Predicate<T> = Box<dyn Fn(&RuleContext<'_, T>) -> Verdict + Send + Sync>;

struct AuthorizationRule<T> {
    pattern: PathPattern,
    predicate: Predicate<T>,
}

/// An ordered table of path pattern → predicate.
///
/// ```
/// use peerstate_policy::AuthorizationRules;
/// use serde_json::Value;
///
/// let rules = AuthorizationRules::<Value>::new()
///     .rule("/public/:userId", |ctx| ctx.params.get("userId") == Some(ctx.sender_id))
///     .unwrap();
/// assert_eq!(rules.len(), 1);
/// ```
pub struct AuthorizationRules<T> {
    rules: Vec<AuthorizationRule<T>>,
    mode: AuthorizationMode,
}

impl<T> Default for AuthorizationRules<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AuthorizationRules<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRules")
            .field(
                "patterns",
                &self.rules.iter().map(|r| r.pattern.as_str()).collect::<Vec<_>>(),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

impl<T> AuthorizationRules<T> {
    /// An empty table. It authorizes nothing.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            mode: AuthorizationMode::default(),
        }
    }

    /// Set the evaluation mode.
    pub fn with_mode(mut self, mode: AuthorizationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append a rule. Rules are evaluated in the order they are added.
    pub fn rule<F, R>(mut self, pattern: &str, predicate: F) -> Result<Self>
    where
        F: Fn(&RuleContext<'_, T>) -> R + Send + Sync + 'static,
        R: Into<Verdict>,
    {
        self.rules.push(AuthorizationRule {
            pattern: PathPattern::parse(pattern)?,
            predicate: Box::new(move |ctx| predicate(ctx).into()),
        });
        Ok(self)
    }

    pub fn mode(&self) -> AuthorizationMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decide whether `sender_id` may apply `operation` to `document`.
    ///
    /// Fails only if the document cannot be represented as JSON.
    pub fn authorize(
        &self,
        document: &T,
        sender_id: &str,
        operation: &Operation,
    ) -> Result<Authorization>
    where
        T: Serialize,
    {
        let kind = operation.kind();
        if matches!(kind, OpKind::Move | OpKind::Copy) {
            return Ok(Authorization::Denied(Denial::UnsupportedOperation(kind)));
        }

        // Only `remove` needs the current document to find its leaves.
        let leaves = if kind == OpKind::Remove {
            flatten(operation, &serde_json::to_value(document)?)
        } else {
            flatten(operation, &Value::Null)
        };

        let mut last = Verdict::Abstain;
        for entry in std::iter::once(operation).chain(leaves.iter()) {
            last = match self.judge(document, sender_id, entry) {
                Ok(verdict) => verdict,
                Err(denial) => return Ok(Authorization::Denied(denial)),
            };
            if last == Verdict::Deny {
                return Ok(Authorization::Denied(Denial::Rejected {
                    path: entry.path().to_string(),
                }));
            }
        }

        if last == Verdict::Allow {
            Ok(Authorization::Authorized(operation.clone()))
        } else {
            let path = leaves.last().unwrap_or(operation).path().to_string();
            Ok(Authorization::Denied(Denial::NotGranted { path }))
        }
    }

    /// The combined verdict of every rule matching `entry`.
    fn judge(
        &self,
        document: &T,
        sender_id: &str,
        entry: &Operation,
    ) -> std::result::Result<Verdict, Denial> {
        let mut verdict = Verdict::Abstain;
        for rule in &self.rules {
            let Some(params) = rule.pattern.matches(entry.path()) else {
                continue;
            };
            let ctx = RuleContext {
                sender_id,
                document,
                operation: entry,
                params: &params,
            };
            let next = (rule.predicate)(&ctx);
            if next == Verdict::Abstain {
                continue;
            }
            if self.mode == AuthorizationMode::Strict
                && verdict != Verdict::Abstain
                && verdict != next
            {
                return Err(Denial::Conflict {
                    path: entry.path().to_string(),
                });
            }
            verdict = next;
        }
        Ok(verdict)
    }
}
