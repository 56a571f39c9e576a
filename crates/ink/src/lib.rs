//! Host adapter for the ink updater.
//!
//! A host maps its own events onto [`Hook`]s and hands each request to
//! [`Ink::handle`] as a [`RequestContext`]. Everything else (checks, applies,
//! maintenance gating, notice rendering and dismissal) is wired up by
//! [`Ink::new`] from an [`InkSettings`] file.

mod dispatch;
mod error;
mod host;
pub mod logging;
mod notices;
mod request;
pub mod settings;
mod updater;

pub use dispatch::{Dispatcher, Hook, Trigger};
pub use error::HostError;
pub use host::{HostServices, Ink};
pub use notices::{
    DISMISS_ACTOR_ACTION, DISMISS_ACTOR_TOKEN_PARAM, DISMISS_BROADCAST_ACTION,
    DISMISS_BROADCAST_TOKEN_PARAM, DISMISS_NOTICE_PARAM, DISMISS_SCOPE_PARAM, DismissConfig,
    DismissTrigger, NoticeCenter, NoticeView, NoticesTrigger,
};
pub use request::{Area, Capabilities, RequestContext, Response};
pub use settings::{InkSettings, SettingsError, ValidatedSettings};
pub use updater::{ApplyTrigger, CheckTrigger, MaintenanceTrigger, without_action_params};
