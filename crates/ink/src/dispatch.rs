use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};

use crate::error::HostError;
use crate::request::RequestContext;

/// Points in a request at which triggers run. The host adapter maps its own
/// events onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// The back-office screen is known.
    CurrentScreen,
    /// Early back-office initialisation, before any output.
    AdminInit,
    /// Right before a page is rendered, in any area.
    PreRender,
    /// The back-office notice area is being rendered.
    AdminNotices,
    /// A page asked to dismiss a notice.
    DismissNotice,
}

#[async_trait]
pub trait Trigger: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fire(&self, ctx: &mut RequestContext) -> Result<(), HostError>;
}

#[derive(Default)]
pub struct Dispatcher {
    triggers: HashMap<Hook, Vec<Arc<dyn Trigger>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_trigger(&mut self, hook: Hook, trigger: Arc<dyn Trigger>) {
        debug!("Registered {} on {hook:?}", trigger.name());
        self.triggers.entry(hook).or_default().push(trigger);
    }

    #[must_use]
    pub fn has_triggers(&self, hook: Hook) -> bool {
        self.triggers.get(&hook).is_some_and(|list| !list.is_empty())
    }

    /// Run the triggers of `hook` in registration order. A failing trigger is
    /// logged and the rest still run; a trigger that sets a response ends the
    /// dispatch.
    pub async fn dispatch(&self, hook: Hook, ctx: &mut RequestContext) {
        let Some(triggers) = self.triggers.get(&hook) else {
            return;
        };

        for trigger in triggers {
            if ctx.response().is_some() {
                break;
            }
            if let Err(err) = trigger.fire(ctx).await {
                error!("{} failed on {hook:?}: {err}", trigger.name());
            }
        }
    }
}
