use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ink_notices::{ActorId, NoticeKind, NoticeStore};
use ink_store::{Clock, KeyValueStore};
use log::{debug, error, info, warn};
use reqwest::Url;

use crate::catalog::{CachePolicy, CatalogFetcher};
use crate::config::UpdaterConfig;
use crate::download::{archive_path, download_to};
use crate::error::UpdaterError;
use crate::install::install_archive;
use crate::lock::ProcessLock;
use crate::maintenance::MaintenanceGate;
use crate::product::ProductInfo;
use crate::schedule::CheckSchedule;
use crate::token::{APPLY_UPDATE_ACTION, CapabilityTokens};
use crate::transport::Transport;
use crate::version::{Decision, VersionGate};

/// Query parameter selecting an updater action.
pub const ACTION_PARAM: &str = "ink-updater";
pub const ACTION_APPLY: &str = "apply-update";
/// Query parameter carrying the capability token for [`ACTION_APPLY`].
pub const TOKEN_PARAM: &str = "ink_updater_nonce";
/// Screen on which the availability notice is not shown.
pub const DASHBOARD_SCREEN: &str = "dashboard";

const NOTICE_PREFIX: &str = "[Ink][Updater][Apply update]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Notifying,
    AutoApplying,
    Downloading,
    Installing,
    Cleanup,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the current request looks like to the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext<'a> {
    /// The viewer may administer the installation.
    pub privileged: bool,
    pub screen: Option<&'a str>,
    /// URL the action link is built on.
    pub current_url: &'a Url,
    pub actor: Option<&'a ActorId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check marker is live or an apply is running.
    NotDue,
    /// Nothing could be decided this cycle; retried after the interval.
    Deferred,
    UpToDate,
    /// An update exists but this view does not show the notice.
    Available { version: String },
    /// The availability notice with its action link was queued.
    Notified { version: String },
    Applied(ApplyOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { version: String },
    /// Download or install failed; an error notice was stored.
    Failed,
    /// Another apply holds the process flag.
    Contended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The request does not ask for an update.
    NotRequested,
    /// Missing or invalid token; handle as a normal page view.
    Rejected,
    /// Checks are not due or another apply is running.
    Skipped,
    UpToDate,
    /// The update failed; an error notice was stored.
    Failed,
    /// Applied; the host should redirect to its landing URL.
    Applied { version: String },
}

/// Check, notify, download, install and clean up for one product.
///
/// Every piece of state that has to be seen by other workers lives in the
/// shared store: the check marker, the cached catalog and the process flag.
pub struct UpdatePipeline {
    config: UpdaterConfig,
    transport: Arc<dyn Transport>,
    notices: NoticeStore,
    catalog: CatalogFetcher,
    schedule: CheckSchedule,
    lock: ProcessLock,
    tokens: CapabilityTokens,
    maintenance: MaintenanceGate,
    state: Mutex<PipelineState>,
}

impl UpdatePipeline {
    pub fn new(
        config: UpdaterConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        tokens: CapabilityTokens,
    ) -> Self {
        let catalog = CatalogFetcher::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            config.endpoint.clone(),
            config.catalog_timeout,
        );
        let schedule = CheckSchedule::new(Arc::clone(&store), config.check_interval, clock);
        let lock = ProcessLock::new(Arc::clone(&store), config.lock_ttl);
        let maintenance = MaintenanceGate::new(&config.site_name);

        Self {
            notices: NoticeStore::broadcast(store),
            transport,
            catalog,
            schedule,
            lock,
            tokens,
            maintenance,
            config,
            state: Mutex::new(PipelineState::Idle),
        }
    }

    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn maintenance_gate(&self) -> &MaintenanceGate {
        &self.maintenance
    }

    #[must_use]
    pub fn tokens(&self) -> &CapabilityTokens {
        &self.tokens
    }

    #[must_use]
    pub fn schedule(&self) -> &CheckSchedule {
        &self.schedule
    }

    /// `base` with the apply action and a token for `actor` added to its
    /// query.
    #[must_use]
    pub fn action_link(&self, base: &Url, actor: Option<&ActorId>) -> Url {
        let token = self.tokens.create(APPLY_UPDATE_ACTION, actor);
        let kept: Vec<(String, String)> = base
            .query_pairs()
            .filter(|(key, _)| key != ACTION_PARAM && key != TOKEN_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let mut link = base.clone();
        link.set_query(None);
        link.query_pairs_mut()
            .extend_pairs(kept)
            .append_pair(ACTION_PARAM, ACTION_APPLY)
            .append_pair(TOKEN_PARAM, &token);
        link
    }

    /// The periodic check, run once per qualifying request.
    ///
    /// # Errors
    /// Returns an error only when the shared store fails. Network and product
    /// failures are folded into [`CheckOutcome::Deferred`].
    pub async fn check_for_updates(
        &self,
        view: &ViewContext<'_>,
    ) -> Result<CheckOutcome, UpdaterError> {
        if !self.can_check()? {
            return Ok(CheckOutcome::NotDue);
        }

        self.enter(PipelineState::Checking);
        let decision = match self.evaluate().await {
            Ok(decision) => decision,
            Err(err) => return self.defer_after(err, false).map(|()| CheckOutcome::Deferred),
        };

        let (version, archive_url) = match decision {
            Decision::Defer => {
                debug!("No catalog entry for the installed version");
                self.settle()?;
                return Ok(CheckOutcome::Deferred);
            }
            Decision::UpToDate => {
                self.enter(PipelineState::UpToDate);
                self.settle()?;
                return Ok(CheckOutcome::UpToDate);
            }
            Decision::UpdateAvailable {
                target_version,
                archive_url,
            } => (target_version, archive_url),
        };

        self.enter(PipelineState::UpdateAvailable);
        info!(
            "Update v{version} is available for {}",
            self.config.product_name
        );

        if self.config.auto_update {
            self.enter(PipelineState::AutoApplying);
            let outcome = self.apply(&version, &archive_url).await?;
            return Ok(CheckOutcome::Applied(outcome));
        }

        if !view.privileged || view.screen == Some(DASHBOARD_SCREEN) {
            self.enter(PipelineState::Idle);
            return Ok(CheckOutcome::Available { version });
        }

        self.enter(PipelineState::Notifying);
        let link = self.action_link(view.current_url, view.actor);
        self.notices.add(
            format!(
                "An update (v{version}) is available for {}. Apply the update: {link}",
                self.config.product_name
            ),
            NoticeKind::Info,
            false,
        )?;
        self.enter(PipelineState::Idle);
        Ok(CheckOutcome::Notified { version })
    }

    /// Follow-through on the action link carried by `params`.
    ///
    /// # Errors
    /// Returns an error only when the shared store fails.
    pub async fn apply_from_action_link(
        &self,
        params: &HashMap<String, String>,
        actor: Option<&ActorId>,
    ) -> Result<ActionOutcome, UpdaterError> {
        if params.get(ACTION_PARAM).map(String::as_str) != Some(ACTION_APPLY) {
            return Ok(ActionOutcome::NotRequested);
        }

        let token = params.get(TOKEN_PARAM).map_or("", String::as_str);
        if self.tokens.verify(token, APPLY_UPDATE_ACTION, actor).is_none() {
            warn!("Ignoring update request with an invalid token");
            return Ok(ActionOutcome::Rejected);
        }

        if !self.can_check()? {
            return Ok(ActionOutcome::Skipped);
        }

        self.enter(PipelineState::Checking);
        let decision = match self.evaluate().await {
            Ok(decision) => decision,
            Err(err) => {
                return self.defer_after(err, true).map(|()| ActionOutcome::Failed);
            }
        };

        let Decision::UpdateAvailable {
            target_version,
            archive_url,
        } = decision
        else {
            self.settle()?;
            return Ok(ActionOutcome::UpToDate);
        };

        Ok(match self.apply(&target_version, &archive_url).await? {
            ApplyOutcome::Applied { version } => ActionOutcome::Applied { version },
            ApplyOutcome::Failed => ActionOutcome::Failed,
            ApplyOutcome::Contended => ActionOutcome::Skipped,
        })
    }

    /// Download and install `version` from `archive_url` while holding the
    /// process flag. Scratch files are removed, the next check is re-armed
    /// and a notice is stored whatever the result. Contended when the flag is
    /// held or the check stopped being due before the flag was taken.
    ///
    /// # Errors
    /// Returns an error only when the shared store fails.
    pub async fn apply(
        &self,
        version: &str,
        archive_url: &str,
    ) -> Result<ApplyOutcome, UpdaterError> {
        let Some(token) = self.lock.try_acquire(&format!("apply v{version}"))? else {
            self.enter(PipelineState::Idle);
            return Ok(ApplyOutcome::Contended);
        };

        // Another worker may have applied and released between our check and
        // the acquire; it re-arms the schedule before letting go.
        if !self.schedule.is_due()? {
            debug!("Update v{version} was handled by another worker");
            token.release()?;
            self.enter(PipelineState::Idle);
            return Ok(ApplyOutcome::Contended);
        }

        let archive = archive_path(&self.config.scratch_dir, archive_url);
        let result = {
            let _maintenance = self.maintenance.engage();
            self.download_and_install(archive_url, &archive).await
        };

        if result.is_err() {
            self.enter(PipelineState::Error);
        }
        self.enter(PipelineState::Cleanup);
        self.cleanup(&archive).await;
        self.schedule.rearm()?;

        let outcome = match result {
            Ok(()) => {
                info!("Update v{version} applied to {}", self.config.product_name);
                self.notices.add(
                    format!(
                        "{}: update v{version} successfully applied.",
                        self.config.product_name
                    ),
                    NoticeKind::Success,
                    true,
                )?;
                ApplyOutcome::Applied {
                    version: version.to_string(),
                }
            }
            Err(err) => {
                error!("Applying update v{version} failed: {err}");
                self.notices
                    .add(format!("{NOTICE_PREFIX} Error: {err}"), NoticeKind::Error, true)?;
                ApplyOutcome::Failed
            }
        };

        token.release()?;
        self.enter(PipelineState::Idle);
        Ok(outcome)
    }

    fn can_check(&self) -> Result<bool, UpdaterError> {
        if self.lock.is_held()? {
            debug!("Update in progress; not checking");
            return Ok(false);
        }
        Ok(self.schedule.is_due()?)
    }

    async fn evaluate(&self) -> Result<Decision, UpdaterError> {
        let product = ProductInfo::read(&self.config.product_file)?;
        let catalog = self.catalog.get_catalog(CachePolicy::PreferCache).await?;
        Ok(VersionGate::evaluate(
            &product,
            catalog.entry_for(&product.version),
        ))
    }

    async fn download_and_install(&self, url: &str, archive: &Path) -> Result<(), UpdaterError> {
        self.enter(PipelineState::Downloading);
        download_to(
            self.transport.as_ref(),
            url,
            archive,
            self.config.download_timeout,
        )
        .await
        .map_err(|source| UpdaterError::unreachable(url, source))?;

        self.enter(PipelineState::Installing);
        install_archive(archive, &self.config.install_dir())
            .map_err(UpdaterError::InstallFailure)?;
        Ok(())
    }

    async fn cleanup(&self, archive: &Path) {
        for result in [
            tokio::fs::remove_file(archive).await,
            tokio::fs::remove_dir_all(&self.config.scratch_dir).await,
        ] {
            if let Err(error) = result
                && error.kind() != std::io::ErrorKind::NotFound
            {
                warn!("Failed to clean up update scratch files: {error}");
            }
        }
    }

    /// Handle a failed evaluation: report it when visible, re-arm the check
    /// and go idle. Store failures propagate.
    fn defer_after(&self, err: UpdaterError, on_apply: bool) -> Result<(), UpdaterError> {
        let report = match &err {
            UpdaterError::Unreachable { .. } => {
                warn!("Update check deferred: {err}");
                on_apply
            }
            UpdaterError::Config(_) => {
                error!("Update check failed: {err}");
                true
            }
            _ => {
                self.enter(PipelineState::Idle);
                return Err(err);
            }
        };

        if report && err.is_user_visible() {
            self.notices
                .add(format!("{NOTICE_PREFIX} Error: {err}"), NoticeKind::Error, true)?;
        }
        self.settle()
    }

    fn settle(&self) -> Result<(), UpdaterError> {
        let rearmed = self.schedule.rearm();
        self.enter(PipelineState::Idle);
        Ok(rearmed?)
    }

    fn enter(&self, next: PipelineState) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != next {
            debug!("Update pipeline: {} -> {next}", *state);
            *state = next;
        }
    }
}
