use std::sync::Arc;

use ink_core::{CapabilityTokens, HttpTransport, Transport, UpdatePipeline};
use ink_notices::NoticeKind;
use ink_platform::AppPaths;
use ink_store::{Clock, FileStore, KeyValueStore, SystemClock};
use log::{error, info};

use crate::dispatch::{Dispatcher, Hook};
use crate::error::HostError;
use crate::notices::{DismissTrigger, NoticeCenter, NoticesTrigger};
use crate::request::{Area, RequestContext};
use crate::settings::InkSettings;
use crate::updater::{ApplyTrigger, CheckTrigger, MaintenanceTrigger};

const INIT_PREFIX: &str = "[Ink][Init] Invalid configuration.";

/// Everything the host shares between requests.
#[derive(Clone)]
pub struct HostServices {
    /// Expiring state: check marker, process flag, catalog, broadcast notices.
    pub cache: Arc<dyn KeyValueStore>,
    /// Per-actor notices.
    pub settings: Arc<dyn KeyValueStore>,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
}

impl HostServices {
    /// File-backed stores under `paths` and a real HTTP client.
    ///
    /// # Errors
    /// Returns an error when a store directory cannot be created or the HTTP
    /// client cannot be built.
    pub fn open(paths: &AppPaths) -> Result<Self, HostError> {
        paths
            .ensure_dirs()
            .map_err(|source| HostError::io("failed to create application directories", source))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = FileStore::with_clock(paths.cache_store_dir(), Arc::clone(&clock))?;
        let settings = FileStore::with_clock(paths.settings_store_dir(), Arc::clone(&clock))?;

        Ok(Self {
            cache: Arc::new(cache),
            settings: Arc::new(settings),
            transport: Arc::new(HttpTransport::new()?),
            clock,
        })
    }
}

/// The host object: owns the dispatcher with every trigger wired in.
pub struct Ink {
    dispatcher: Dispatcher,
    notices: NoticeCenter,
    pipeline: Option<Arc<UpdatePipeline>>,
}

impl Ink {
    /// Validate `settings` and register the triggers.
    ///
    /// Configuration problems are stored as broadcast error notices and keep
    /// the updater triggers unregistered; the notice triggers still run so
    /// the problems get shown.
    ///
    /// # Errors
    /// Returns an error when the signing secret is too weak or the notice
    /// store cannot be written.
    pub fn new(
        settings: &InkSettings,
        paths: &AppPaths,
        services: HostServices,
    ) -> Result<Self, HostError> {
        let tokens = CapabilityTokens::new(settings.secret.as_bytes(), Arc::clone(&services.clock))?;
        let notices = NoticeCenter::new(
            Arc::clone(&services.cache),
            Arc::clone(&services.settings),
            tokens.clone(),
        );

        let validated = settings.validate(paths);
        for err in &validated.errors {
            error!("Invalid configuration: {err}");
            notices
                .broadcast()
                .add(format!("{INIT_PREFIX} {err}"), NoticeKind::Error, true)?;
        }

        let mut dispatcher = Dispatcher::new();
        let pipeline = match validated.updater {
            Some(config) if validated.errors.is_empty() => {
                let pipeline = Arc::new(UpdatePipeline::new(
                    config,
                    Arc::clone(&services.cache),
                    Arc::clone(&services.transport),
                    Arc::clone(&services.clock),
                    tokens,
                ));
                dispatcher.register_trigger(
                    Hook::AdminInit,
                    Arc::new(ApplyTrigger::new(
                        Arc::clone(&pipeline),
                        validated.landing_url,
                    )),
                );
                dispatcher.register_trigger(
                    Hook::CurrentScreen,
                    Arc::new(CheckTrigger::new(Arc::clone(&pipeline))),
                );
                dispatcher.register_trigger(
                    Hook::PreRender,
                    Arc::new(MaintenanceTrigger::new(Arc::clone(&pipeline))),
                );
                info!(
                    "Updater armed for {} ({})",
                    pipeline.config().product_name,
                    pipeline.config().product_kind.as_str()
                );
                Some(pipeline)
            }
            _ => None,
        };

        dispatcher.register_trigger(
            Hook::AdminNotices,
            Arc::new(NoticesTrigger::new(notices.clone())),
        );
        dispatcher.register_trigger(
            Hook::DismissNotice,
            Arc::new(DismissTrigger::new(notices.clone())),
        );

        Ok(Self {
            dispatcher,
            notices,
            pipeline,
        })
    }

    /// The updater, when the configuration armed it.
    #[must_use]
    pub fn pipeline(&self) -> Option<&Arc<UpdatePipeline>> {
        self.pipeline.as_ref()
    }

    #[must_use]
    pub fn notices(&self) -> &NoticeCenter {
        &self.notices
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one request through the hooks of its area. Stops at the first
    /// hook that produces a response.
    pub async fn handle(&self, ctx: &mut RequestContext) {
        let hooks: &[Hook] = match ctx.area {
            Area::Admin => &[
                Hook::AdminInit,
                Hook::CurrentScreen,
                Hook::PreRender,
                Hook::AdminNotices,
            ],
            Area::Front => &[Hook::PreRender],
            Area::Background => &[Hook::DismissNotice],
        };

        for hook in hooks {
            if ctx.response().is_some() {
                break;
            }
            self.dispatcher.dispatch(*hook, ctx).await;
        }
    }
}
