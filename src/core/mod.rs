pub mod error;
pub mod types;

pub use error::{Result, TxError};
pub use types::{EntityId, ID_FIELD, Row, field, with_id};
