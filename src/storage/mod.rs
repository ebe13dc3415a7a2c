pub mod change;
pub mod memory;

pub use change::Change;
pub use memory::InMemoryStore;
