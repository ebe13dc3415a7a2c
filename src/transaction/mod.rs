pub mod config;
pub mod context;
pub mod definition;
pub mod holder;
pub mod manager;
pub mod propagation;
pub mod rollback;
pub mod status;
pub mod synchronization;
pub mod template;

pub use config::TransactionManagerConfig;
pub use context::TransactionContext;
pub use definition::{IsolationLevel, PropagationMode, TransactionDefinition};
pub use holder::ResourceHolder;
pub use manager::TransactionManager;
pub use propagation::{PropagationDecision, resolve};
pub use rollback::{
    ClassifiedFailure, FailureClass, FailureKind, RollbackDecision, RollbackRules, decide,
};
pub use status::{PhysicalTransaction, TransactionId, TransactionState, TransactionStatus};
pub use synchronization::{CompletionStatus, TransactionSynchronization};
pub use template::{InvocationError, TransactionAttribute, TransactionTemplate};
