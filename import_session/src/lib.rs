mod coordinator;
mod error;
mod session;

pub use coordinator::{CoordinatorState, ImportCoordinator};
pub use error::{Result, SessionError};
pub use session::ImportSession;
