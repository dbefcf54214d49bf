//! Client core for the parley chat system.
//!
//! Owns the pieces of the client that have actual concurrency and failure
//! handling: the message reconciliation engine (optimistic sends, retry,
//! canonical re-pull), the session manager (idle timer, token lease, relay
//! link) and the scroll policy. Rendering stays with the embedding UI.

pub mod engine;
pub mod error;
pub mod identity;
pub mod net;
pub mod scroll;
pub mod session;
pub mod traits;

pub use engine::{
    FeedEntry, PendingMessage, PendingStatus, ReconciliationEngine, RetryError, SendOutcome,
    SendStatus,
};
pub use error::ClientError;
pub use scroll::{ScrollAction, ScrollTracker};
pub use session::{Session, SessionEvent};
