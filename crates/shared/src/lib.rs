//! Wire types shared by the forum sync client: REST models, socket events and errors.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
