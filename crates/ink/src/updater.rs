use std::sync::Arc;

use async_trait::async_trait;
use ink_core::{
    ACTION_PARAM, ActionOutcome, TOKEN_PARAM, UpdatePipeline, Url, ViewContext,
};
use log::{debug, info};

use crate::dispatch::Trigger;
use crate::error::HostError;
use crate::request::{RequestContext, Response};

/// Runs the periodic check once the back-office screen is known.
pub struct CheckTrigger {
    pipeline: Arc<UpdatePipeline>,
}

impl CheckTrigger {
    pub fn new(pipeline: Arc<UpdatePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Trigger for CheckTrigger {
    fn name(&self) -> &'static str {
        "update-check"
    }

    async fn fire(&self, ctx: &mut RequestContext) -> Result<(), HostError> {
        let view = ViewContext {
            privileged: ctx.is_privileged(),
            screen: ctx.screen.as_deref(),
            current_url: &ctx.url,
            actor: ctx.actor.as_ref(),
        };
        let outcome = self.pipeline.check_for_updates(&view).await?;
        debug!("Update check: {outcome:?}");
        Ok(())
    }
}

/// Follows an apply action link and redirects away from it once applied.
pub struct ApplyTrigger {
    pipeline: Arc<UpdatePipeline>,
    landing_url: Option<Url>,
}

impl ApplyTrigger {
    pub fn new(pipeline: Arc<UpdatePipeline>, landing_url: Option<Url>) -> Self {
        Self {
            pipeline,
            landing_url,
        }
    }

    fn landing_for(&self, current: &Url) -> Url {
        if let Some(landing) = &self.landing_url {
            return landing.clone();
        }
        without_action_params(current)
    }
}

#[async_trait]
impl Trigger for ApplyTrigger {
    fn name(&self) -> &'static str {
        "update-apply"
    }

    async fn fire(&self, ctx: &mut RequestContext) -> Result<(), HostError> {
        if !ctx.is_privileged() {
            return Ok(());
        }

        let outcome = self
            .pipeline
            .apply_from_action_link(&ctx.params, ctx.actor.as_ref())
            .await?;
        match outcome {
            ActionOutcome::Applied { version } => {
                let landing = self.landing_for(&ctx.url);
                info!("Update v{version} applied from action link, redirecting to {landing}");
                ctx.respond(Response::Redirect(landing));
            }
            ActionOutcome::NotRequested => {}
            other => debug!("Action link: {other:?}"),
        }
        Ok(())
    }
}

/// Halts unprivileged requests while an archive is being downloaded or
/// installed by this process.
pub struct MaintenanceTrigger {
    pipeline: Arc<UpdatePipeline>,
}

impl MaintenanceTrigger {
    pub fn new(pipeline: Arc<UpdatePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Trigger for MaintenanceTrigger {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn fire(&self, ctx: &mut RequestContext) -> Result<(), HostError> {
        if let Some(message) = self.pipeline.maintenance_gate().check(ctx.is_privileged()) {
            ctx.respond(Response::Halt {
                status: 503,
                message: message.to_string(),
            });
        }
        Ok(())
    }
}

/// `url` with the updater's action and token parameters removed.
#[must_use]
pub fn without_action_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != ACTION_PARAM && key != TOKEN_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut clean = url.clone();
    clean.set_query(None);
    if !kept.is_empty() {
        clean.query_pairs_mut().extend_pairs(kept);
    }
    clean
}
