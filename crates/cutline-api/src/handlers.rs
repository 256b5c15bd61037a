//! Request handlers.

pub mod artifacts;
pub mod health;
pub mod jobs;
pub mod search;
pub mod sources;

pub use artifacts::*;
pub use health::*;
pub use jobs::*;
pub use search::*;
pub use sources::*;
