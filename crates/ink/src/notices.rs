use std::sync::Arc;

use async_trait::async_trait;
use ink_core::CapabilityTokens;
use ink_notices::{Notice, NoticeKind, NoticeStore, ScopeKind};
use ink_store::KeyValueStore;
use log::{debug, warn};
use serde::Serialize;
use serde_json::json;

use crate::dispatch::Trigger;
use crate::error::HostError;
use crate::request::{RequestContext, Response};

/// Parameter carrying the hash of the notice to dismiss.
pub const DISMISS_NOTICE_PARAM: &str = "ink_notice";
/// Parameter carrying the scope wire name (`admin` or `user`).
pub const DISMISS_SCOPE_PARAM: &str = "type";

pub const DISMISS_BROADCAST_ACTION: &str = "ink-notices-delete-admin";
pub const DISMISS_ACTOR_ACTION: &str = "ink-notices-delete-user";
pub const DISMISS_BROADCAST_TOKEN_PARAM: &str = "ink_notices_admin_nonce";
pub const DISMISS_ACTOR_TOKEN_PARAM: &str = "ink_notices_user_nonce";

/// A notice ready to render. Transient notices have no hash and cannot be
/// dismissed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeView {
    pub hash: Option<String>,
    pub text: String,
    pub kind: NoticeKind,
    pub scope: ScopeKind,
    pub dismissible: bool,
}

impl NoticeView {
    fn transient(notice: Notice, scope: ScopeKind) -> Self {
        Self {
            hash: None,
            text: notice.text,
            kind: notice.kind,
            scope,
            dismissible: false,
        }
    }

    fn persistent(hash: String, notice: Notice, scope: ScopeKind) -> Self {
        Self {
            hash: Some(hash),
            text: notice.text,
            kind: notice.kind,
            scope,
            dismissible: true,
        }
    }
}

/// What a page embeds so its script can call the dismiss trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DismissConfig {
    pub scope: ScopeKind,
    pub param_name: &'static str,
    pub token: String,
}

fn dismiss_action(scope: ScopeKind) -> (&'static str, &'static str) {
    match scope {
        ScopeKind::Broadcast => (DISMISS_BROADCAST_ACTION, DISMISS_BROADCAST_TOKEN_PARAM),
        ScopeKind::Actor => (DISMISS_ACTOR_ACTION, DISMISS_ACTOR_TOKEN_PARAM),
    }
}

/// Reads notices for rendering and serves dismiss requests.
///
/// Broadcast notices live in the shared cache store next to the updater
/// state; actor notices live in the settings store.
#[derive(Clone)]
pub struct NoticeCenter {
    broadcast: NoticeStore,
    actor_store: Arc<dyn KeyValueStore>,
    tokens: CapabilityTokens,
}

impl NoticeCenter {
    pub fn new(
        broadcast_store: Arc<dyn KeyValueStore>,
        actor_store: Arc<dyn KeyValueStore>,
        tokens: CapabilityTokens,
    ) -> Self {
        Self {
            broadcast: NoticeStore::broadcast(broadcast_store),
            actor_store,
            tokens,
        }
    }

    #[must_use]
    pub fn broadcast(&self) -> &NoticeStore {
        &self.broadcast
    }

    fn actor_notices(&self, ctx: &RequestContext) -> Option<NoticeStore> {
        ctx.actor
            .clone()
            .map(|actor| NoticeStore::actor(Arc::clone(&self.actor_store), actor))
    }

    fn scoped(&self, ctx: &RequestContext) -> Vec<(ScopeKind, NoticeStore)> {
        let mut scoped = Vec::with_capacity(2);
        if ctx.is_privileged() {
            scoped.push((ScopeKind::Broadcast, self.broadcast.clone()));
        }
        if let Some(actor) = self.actor_notices(ctx) {
            scoped.push((ScopeKind::Actor, actor));
        }
        scoped
    }

    /// Notices visible to this request: every transient queue first (which
    /// drains it), then the persisted sets. Broadcast notices are only
    /// visible to privileged requests.
    ///
    /// # Errors
    /// Returns an error when a notice store cannot be read.
    pub fn collect(&self, ctx: &RequestContext) -> Result<Vec<NoticeView>, HostError> {
        let scoped = self.scoped(ctx);
        let mut views = Vec::new();

        for (scope, store) in &scoped {
            views.extend(
                store
                    .drain_transient()?
                    .into_iter()
                    .map(|notice| NoticeView::transient(notice, *scope)),
            );
        }
        for (scope, store) in &scoped {
            views.extend(
                store
                    .list()?
                    .into_iter()
                    .map(|(hash, notice)| NoticeView::persistent(hash, notice, *scope)),
            );
        }

        Ok(views)
    }

    /// Dismiss parameters for every scope this request may delete from.
    #[must_use]
    pub fn dismiss_config(&self, ctx: &RequestContext) -> Vec<DismissConfig> {
        self.scoped(ctx)
            .into_iter()
            .map(|(scope, _)| {
                let (action, param_name) = dismiss_action(scope);
                DismissConfig {
                    scope,
                    param_name,
                    token: self.tokens.create(action, ctx.actor.as_ref()),
                }
            })
            .collect()
    }

    /// Serve a dismiss request. Returns `true` once a valid request was
    /// carried out, whether or not the hash was stored; every rejected
    /// request returns `false`.
    ///
    /// # Errors
    /// Returns an error when the notice store cannot be written.
    pub fn handle_dismiss(&self, ctx: &RequestContext) -> Result<bool, HostError> {
        let Some(scope) = ctx
            .params
            .get(DISMISS_SCOPE_PARAM)
            .and_then(|value| ScopeKind::from_wire(value))
        else {
            return Ok(false);
        };
        let Some(hash) = ctx
            .params
            .get(DISMISS_NOTICE_PARAM)
            .filter(|hash| !hash.is_empty())
        else {
            return Ok(false);
        };

        let (action, param_name) = dismiss_action(scope);
        let token = ctx.params.get(param_name).map_or("", String::as_str);
        if self
            .tokens
            .verify(token, action, ctx.actor.as_ref())
            .is_none()
        {
            warn!("Ignoring {} notice dismissal with an invalid token", scope.wire_name());
            return Ok(false);
        }

        let store = match scope {
            ScopeKind::Broadcast if ctx.is_privileged() => self.broadcast.clone(),
            ScopeKind::Actor => match self.actor_notices(ctx) {
                Some(store) => store,
                None => return Ok(false),
            },
            ScopeKind::Broadcast => return Ok(false),
        };

        let removed = store.delete(hash)?;
        debug!(
            "Dismiss request for {} notice {hash} (removed: {removed})",
            scope.wire_name()
        );
        Ok(true)
    }
}

/// Fills [`RequestContext::notices`] for the host to render.
pub struct NoticesTrigger {
    center: NoticeCenter,
}

impl NoticesTrigger {
    pub fn new(center: NoticeCenter) -> Self {
        Self { center }
    }
}

#[async_trait]
impl Trigger for NoticesTrigger {
    fn name(&self) -> &'static str {
        "notices"
    }

    async fn fire(&self, ctx: &mut RequestContext) -> Result<(), HostError> {
        let views = self.center.collect(ctx)?;
        ctx.notices.extend(views);
        Ok(())
    }
}

/// Answers a dismiss call with `{"success": bool}`.
pub struct DismissTrigger {
    center: NoticeCenter,
}

impl DismissTrigger {
    pub fn new(center: NoticeCenter) -> Self {
        Self { center }
    }
}

#[async_trait]
impl Trigger for DismissTrigger {
    fn name(&self) -> &'static str {
        "notice-dismiss"
    }

    async fn fire(&self, ctx: &mut RequestContext) -> Result<(), HostError> {
        let success = match self.center.handle_dismiss(ctx) {
            Ok(success) => success,
            Err(err) => {
                ctx.respond(Response::Json(json!({ "success": false })));
                return Err(err);
            }
        };
        ctx.respond(Response::Json(json!({ "success": success })));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use ink_core::{CapabilityTokens, Url};
    use ink_notices::{ActorId, NoticeKind, NoticeStore, ScopeKind, content_hash};
    use ink_store::{ManualClock, MemoryStore};

    use super::{
        DISMISS_ACTOR_TOKEN_PARAM, DISMISS_BROADCAST_TOKEN_PARAM, DISMISS_NOTICE_PARAM,
        DISMISS_SCOPE_PARAM, NoticeCenter,
    };
    use crate::request::{Area, Capabilities, RequestContext};

    struct Fixture {
        cache: Arc<MemoryStore>,
        settings: Arc<MemoryStore>,
        center: NoticeCenter,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
                .single()
                .expect("timestamp should be valid"),
        ));
        let tokens = CapabilityTokens::new(b"a-long-enough-test-secret", clock)
            .expect("secret should be accepted");
        let cache = Arc::new(MemoryStore::new());
        let settings = Arc::new(MemoryStore::new());
        let center = NoticeCenter::new(cache.clone(), settings.clone(), tokens);
        Fixture {
            cache,
            settings,
            center,
        }
    }

    fn admin() -> RequestContext {
        RequestContext::new(
            Area::Admin,
            Url::parse("https://site.example.com/admin/").expect("url should parse"),
        )
        .with_actor(ActorId::from(1), Capabilities::administrator())
    }

    fn member() -> RequestContext {
        RequestContext::new(
            Area::Admin,
            Url::parse("https://site.example.com/admin/").expect("url should parse"),
        )
        .with_actor(ActorId::from(7), Capabilities::member())
    }

    #[test]
    fn collect_orders_transient_before_persistent() {
        let fixture = fixture();
        let broadcast = NoticeStore::broadcast(fixture.cache.clone());
        broadcast
            .add("Stored error.", NoticeKind::Error, true)
            .expect("persistent notice should be stored");
        broadcast
            .add("One-off info.", NoticeKind::Info, false)
            .expect("transient notice should be queued");
        NoticeStore::actor(fixture.settings.clone(), ActorId::from(1))
            .add("Your own note.", NoticeKind::Success, true)
            .expect("actor notice should be stored");

        let views = fixture.center.collect(&admin()).expect("collect should work");
        let texts: Vec<&str> = views.iter().map(|view| view.text.as_str()).collect();
        assert_eq!(texts, vec!["One-off info.", "Stored error.", "Your own note."]);
        assert!(!views[0].dismissible);
        assert_eq!(views[1].hash.as_deref(), Some(content_hash("Stored error.").as_str()));
        assert_eq!(views[2].scope, ScopeKind::Actor);

        let again = fixture.center.collect(&admin()).expect("collect should work");
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn unprivileged_viewers_see_no_broadcast_notices() {
        let fixture = fixture();
        NoticeStore::broadcast(fixture.cache.clone())
            .add("Update failed.", NoticeKind::Error, true)
            .expect("notice should be stored");
        NoticeStore::broadcast(fixture.cache.clone())
            .add("Queued.", NoticeKind::Info, false)
            .expect("notice should be queued");

        assert!(fixture.center.collect(&member()).expect("collect").is_empty());
        assert_eq!(
            fixture.center.collect(&admin()).expect("collect").len(),
            2,
            "the transient notice should still be queued for an administrator"
        );
    }

    #[test]
    fn dismiss_with_valid_token_removes_the_notice() {
        let fixture = fixture();
        let hash = fixture
            .center
            .broadcast()
            .add("Update failed.", NoticeKind::Error, true)
            .expect("notice should be stored");

        let config = fixture.center.dismiss_config(&admin());
        let admin_config = config
            .iter()
            .find(|entry| entry.scope == ScopeKind::Broadcast)
            .expect("administrators should get a broadcast dismiss token");
        assert_eq!(admin_config.param_name, DISMISS_BROADCAST_TOKEN_PARAM);

        let ctx = admin()
            .with_param(DISMISS_NOTICE_PARAM, hash.clone())
            .with_param(DISMISS_SCOPE_PARAM, "admin")
            .with_param(DISMISS_BROADCAST_TOKEN_PARAM, admin_config.token.clone());
        assert!(fixture.center.handle_dismiss(&ctx).expect("dismiss"));
        assert!(
            !fixture
                .center
                .broadcast()
                .contains(&hash)
                .expect("contains")
        );
    }

    #[test]
    fn dismiss_does_not_reveal_unknown_hashes() {
        let fixture = fixture();
        let config = fixture.center.dismiss_config(&member());
        assert_eq!(config.len(), 1, "members only get their own scope");

        let ctx = member()
            .with_param(DISMISS_NOTICE_PARAM, "ffff")
            .with_param(DISMISS_SCOPE_PARAM, "user")
            .with_param(DISMISS_ACTOR_TOKEN_PARAM, config[0].token.clone());
        assert!(fixture.center.handle_dismiss(&ctx).expect("dismiss"));
    }

    #[test]
    fn dismiss_rejects_bad_tokens_and_foreign_scopes() {
        let fixture = fixture();
        let hash = fixture
            .center
            .broadcast()
            .add("Keep me.", NoticeKind::Error, true)
            .expect("notice should be stored");

        let forged = admin()
            .with_param(DISMISS_NOTICE_PARAM, hash.clone())
            .with_param(DISMISS_SCOPE_PARAM, "admin")
            .with_param(DISMISS_BROADCAST_TOKEN_PARAM, "00");
        assert!(!fixture.center.handle_dismiss(&forged).expect("dismiss"));

        let actor_token = fixture.center.dismiss_config(&member())[0].token.clone();
        let escalated = member()
            .with_param(DISMISS_NOTICE_PARAM, hash.clone())
            .with_param(DISMISS_SCOPE_PARAM, "admin")
            .with_param(DISMISS_BROADCAST_TOKEN_PARAM, actor_token);
        assert!(!fixture.center.handle_dismiss(&escalated).expect("dismiss"));

        assert!(fixture.center.broadcast().contains(&hash).expect("contains"));
    }
}
