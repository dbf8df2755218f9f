//! The hub's command set.
//!
//! One module per command, plus [`register_all`] which wires the full set
//! into a dispatcher.

pub mod location;
pub mod login;
pub mod prepare;
pub mod save;
pub mod status;

use crate::dispatch::CommandDispatcher;
use std::sync::Arc;

pub use location::LocationQueryCommand;
pub use login::LoginRequestCommand;
pub use prepare::PrepareLoginCommand;
pub use save::CommitSaveCommand;
pub use status::ServerStatusCommand;

/// Registers every built-in command with a dispatcher.
pub fn register_all(dispatcher: &mut CommandDispatcher) {
    dispatcher.register(Arc::new(LoginRequestCommand));
    dispatcher.register(Arc::new(PrepareLoginCommand));
    dispatcher.register(Arc::new(CommitSaveCommand));
    dispatcher.register(Arc::new(LocationQueryCommand));
    dispatcher.register(Arc::new(ServerStatusCommand));
}
