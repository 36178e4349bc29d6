//! Event dispatch and reconciliation of server pushes into local state.

mod dispatcher;
mod handlers;
mod state;
mod view;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use handlers::{HandlerError, Reconciler};
pub use state::{ChatMessage, FollowCounter, FollowStats, ProfileFields, SyncState, Thread};
pub use view::{MemoryView, Notice, ViewPort, ViewUpdate};
