// ============================================================================
// Rollback Rules
// ============================================================================
//
// Decides whether a failure escaping a unit of work rolls its transaction
// back. Failures are described by a FailureKind: a name, a class (checked
// business failures commit, unchecked system failures roll back) and an
// optional parent kind. Rules match a kind or any of its ancestors.
//
// ============================================================================

use crate::core::TxError;

/// Default rollback behavior of a failure family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Anticipated business failure; the transaction still commits
    Checked,
    /// System failure; the transaction rolls back
    Unchecked,
}

/// Named failure type in a single-inheritance hierarchy
///
/// ```
/// use memtx::{FailureKind, RollbackDecision, RollbackRules};
///
/// const NOT_ENOUGH_MONEY: FailureKind =
///     FailureKind::extends("NotEnoughMoney", &FailureKind::CHECKED);
///
/// let rules = RollbackRules::default();
/// assert_eq!(rules.decide(Some(&NOT_ENOUGH_MONEY)), RollbackDecision::Commit);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FailureKind {
    name: &'static str,
    class: FailureClass,
    parent: Option<&'static FailureKind>,
}

impl FailureKind {
    /// Root of all checked failures
    pub const CHECKED: FailureKind = FailureKind::root("Exception", FailureClass::Checked);

    /// Root of all unchecked failures; itself a kind of [`Self::CHECKED`]
    pub const UNCHECKED: FailureKind = FailureKind {
        name: "RuntimeException",
        class: FailureClass::Unchecked,
        parent: Some(&FailureKind::CHECKED),
    };

    /// Unrecoverable failures outside the checked hierarchy
    pub const FATAL: FailureKind = FailureKind::root("Error", FailureClass::Unchecked);

    /// Failures raised by the transaction infrastructure itself
    pub const TRANSACTION: FailureKind =
        FailureKind::extends("TransactionException", &FailureKind::UNCHECKED);

    /// A kind without parent
    pub const fn root(name: &'static str, class: FailureClass) -> Self {
        Self {
            name,
            class,
            parent: None,
        }
    }

    /// A kind that inherits the class of `parent`
    pub const fn extends(name: &'static str, parent: &'static FailureKind) -> Self {
        Self {
            name,
            class: parent.class,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn class(&self) -> FailureClass {
        self.class
    }

    pub fn parent(&self) -> Option<&'static FailureKind> {
        self.parent
    }

    pub fn is_unchecked(&self) -> bool {
        self.class == FailureClass::Unchecked
    }

    /// This kind followed by its ancestors, nearest first
    pub fn lineage(&self) -> impl Iterator<Item = &FailureKind> {
        std::iter::successors(Some(self), |kind| kind.parent)
    }

    /// Whether this kind is `other` or descends from it
    pub fn is_a(&self, other: &FailureKind) -> bool {
        self.lineage().any(|kind| kind == other)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Failures that know their [`FailureKind`]
pub trait ClassifiedFailure {
    fn failure_kind(&self) -> FailureKind;
}

impl ClassifiedFailure for TxError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::TRANSACTION
    }
}

/// Outcome of the rollback-rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDecision {
    Commit,
    Rollback,
}

impl std::fmt::Display for RollbackDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackDecision::Commit => write!(f, "COMMIT"),
            RollbackDecision::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

/// Explicit overrides on top of the checked/unchecked default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackRules {
    rollback_for: Vec<FailureKind>,
    no_rollback_for: Vec<FailureKind>,
}

impl RollbackRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll back on `kind` and its descendants
    pub fn rollback_for(mut self, kind: FailureKind) -> Self {
        self.rollback_for.push(kind);
        self
    }

    /// Commit on `kind` and its descendants
    pub fn no_rollback_for(mut self, kind: FailureKind) -> Self {
        self.no_rollback_for.push(kind);
        self
    }

    pub fn decide(&self, failure: Option<&FailureKind>) -> RollbackDecision {
        decide(failure, &self.rollback_for, &self.no_rollback_for)
    }
}

/// Decide the transaction outcome for a unit of work that ended with
/// `failure` (`None` for normal completion)
///
/// `rollback_for` is consulted before `no_rollback_for`; a kind matching
/// neither falls back to its class.
pub fn decide(
    failure: Option<&FailureKind>,
    rollback_for: &[FailureKind],
    no_rollback_for: &[FailureKind],
) -> RollbackDecision {
    let Some(kind) = failure else {
        return RollbackDecision::Commit;
    };

    if rollback_for.iter().any(|rule| kind.is_a(rule)) {
        return RollbackDecision::Rollback;
    }

    if no_rollback_for.iter().any(|rule| kind.is_a(rule)) {
        return RollbackDecision::Commit;
    }

    if kind.is_unchecked() {
        RollbackDecision::Rollback
    } else {
        RollbackDecision::Commit
    }
}
