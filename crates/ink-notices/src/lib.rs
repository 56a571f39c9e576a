//! Dismissible status messages.
//!
//! Notices live in one of two scopes: broadcast (one set per installation,
//! shown to privileged viewers) or actor (one set per identity). Persistent
//! notices are keyed by a hash of their text, so re-adding the same text
//! overwrites instead of duplicating. Transient notices are queued and
//! handed out at most once.

mod error;
mod notice;
mod scope;
mod store;

pub use error::NoticeError;
pub use notice::{Notice, NoticeKind, NoticeSet, content_hash};
pub use scope::{ActorId, NoticeScope, ScopeKind};
pub use store::NoticeStore;
