use super::PropagationMode;
use crate::core::{Result, TxError};

/// What `begin` has to do for a propagation mode in the current context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationDecision {
    /// Start a physical transaction, suspending the current one first if
    /// `suspend_current` is set
    NewPhysical { suspend_current: bool },
    /// Take part in the current physical transaction
    JoinExisting,
    /// Create a savepoint inside the current physical transaction
    Savepoint,
    /// Run without a transaction, suspending the current one first if
    /// `suspend_current` is set
    NonTransactional { suspend_current: bool },
}

impl PropagationDecision {
    pub fn suspends_current(&self) -> bool {
        matches!(
            self,
            PropagationDecision::NewPhysical {
                suspend_current: true
            } | PropagationDecision::NonTransactional {
                suspend_current: true
            }
        )
    }
}

impl std::fmt::Display for PropagationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropagationDecision::NewPhysical {
                suspend_current: false,
            } => write!(f, "NEW_PHYSICAL"),
            PropagationDecision::NewPhysical {
                suspend_current: true,
            } => write!(f, "SUSPEND_AND_NEW_PHYSICAL"),
            PropagationDecision::JoinExisting => write!(f, "JOIN_EXISTING"),
            PropagationDecision::Savepoint => write!(f, "SAVEPOINT"),
            PropagationDecision::NonTransactional {
                suspend_current: false,
            } => write!(f, "NON_TRANSACTIONAL"),
            PropagationDecision::NonTransactional {
                suspend_current: true,
            } => write!(f, "SUSPEND_AND_NON_TRANSACTIONAL"),
        }
    }
}

/// Map a propagation mode and the presence of a current transaction to the
/// action `begin` must take
///
/// | mode          | no current transaction | current transaction       |
/// |---------------|------------------------|---------------------------|
/// | REQUIRED      | new physical           | join                      |
/// | REQUIRES_NEW  | new physical           | suspend, new physical     |
/// | NESTED        | new physical           | savepoint                 |
/// | SUPPORTS      | non-transactional      | join                      |
/// | NOT_SUPPORTED | non-transactional      | suspend, non-transactional|
/// | MANDATORY     | error                  | join                      |
/// | NEVER         | non-transactional      | error                     |
pub fn resolve(mode: PropagationMode, has_current: bool) -> Result<PropagationDecision> {
    use PropagationDecision::*;

    let decision = match (mode, has_current) {
        (PropagationMode::Required, false) => NewPhysical {
            suspend_current: false,
        },
        (PropagationMode::Required, true) => JoinExisting,

        (PropagationMode::RequiresNew, has_current) => NewPhysical {
            suspend_current: has_current,
        },

        (PropagationMode::Nested, false) => NewPhysical {
            suspend_current: false,
        },
        (PropagationMode::Nested, true) => Savepoint,

        (PropagationMode::Supports, false) => NonTransactional {
            suspend_current: false,
        },
        (PropagationMode::Supports, true) => JoinExisting,

        (PropagationMode::NotSupported, has_current) => NonTransactional {
            suspend_current: has_current,
        },

        (PropagationMode::Mandatory, false) => {
            return Err(TxError::IllegalTransactionState(
                "No existing transaction found for transaction marked with propagation 'mandatory'"
                    .to_string(),
            ));
        }
        (PropagationMode::Mandatory, true) => JoinExisting,

        (PropagationMode::Never, false) => NonTransactional {
            suspend_current: false,
        },
        (PropagationMode::Never, true) => {
            return Err(TxError::IllegalTransactionState(
                "Existing transaction found for transaction marked with propagation 'never'"
                    .to_string(),
            ));
        }
    };

    Ok(decision)
}
