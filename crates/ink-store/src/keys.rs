//! Names of every persisted entry.

/// Present while the next catalog check is not yet due.
pub const UPDATE_CHECK: &str = "update-check-timestamp";
/// Present while an update is being applied.
pub const UPDATE_PROCESS: &str = "update-process-flag";
/// Raw catalog mapping from the last successful fetch.
pub const UPDATE_CATALOG: &str = "update-catalog-cache";

pub const NOTICES_BROADCAST: &str = "notices-broadcast";
pub const TRANSIENT_BROADCAST: &str = "notices-transient-broadcast";

#[must_use]
pub fn notices_actor(actor: &str) -> String {
    format!("notices-actor-{actor}")
}

#[must_use]
pub fn transient_actor(actor: &str) -> String {
    format!("notices-transient-actor-{actor}")
}
