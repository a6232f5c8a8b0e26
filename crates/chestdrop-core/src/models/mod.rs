//! Domain models: chests (upload sessions) and their stored files.

pub mod file;
pub mod session;

pub use file::{NewStoredFile, StoredFile};
pub use session::{ChestSession, ChestState};
