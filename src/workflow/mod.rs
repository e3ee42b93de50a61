//! Client-side reconciliation workflow: a cached ads view, derived filters,
//! lazily fetched suggestions and server-authoritative link commands guarded
//! per media item.

pub mod cache;
pub mod filter;
pub mod guard;
pub mod session;

use thiserror::Error;

use crate::client::ClientError;
use crate::reconcile::CommandKind;

pub use cache::ViewCache;
pub use filter::AdsFilter;
pub use guard::{InFlight, Ticket};
pub use session::{Detail, Reconciler, SuggestionPanel, SuggestionView, Tone};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("media {external_id} already has a {pending} command in flight")]
    Busy {
        external_id: i64,
        pending: CommandKind,
    },
    /// The server refused or failed a command; `message` is its text verbatim.
    #[error("{message}")]
    Rejected { kind: CommandKind, message: String },
    #[error("failed to load ads view: {0}")]
    Fetch(#[from] ClientError),
    #[error("media {0} is not in the ads view")]
    UnknownItem(i64),
}
