use std::sync::Arc;

use chrono::TimeDelta;
use hmac::{Hmac, Mac};
use ink_notices::ActorId;
use ink_store::Clock;
use sha2::Sha256;

use crate::config::ConfigError;

type HmacSha256 = Hmac<Sha256>;

pub const APPLY_UPDATE_ACTION: &str = "ink-updater-apply";

const MIN_SECRET_LEN: usize = 16;
const DEFAULT_LIFETIME_HOURS: i64 = 24;
/// Stands in for the actor of anonymous requests.
const ANONYMOUS_ACTOR: &str = "0";

/// How far into its lifetime a verified token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAge {
    /// Minted in the current half of the lifetime.
    Fresh,
    /// Minted in the previous half; still accepted.
    Aging,
}

/// Tamper-evident tokens binding an action name to an actor.
///
/// A token is the hex HMAC-SHA256 of `"{tick}|{action}|{actor}"`, where the
/// tick advances every half lifetime. Verification accepts the current and
/// the previous tick, so a token stays valid for between one half and one
/// full lifetime.
#[derive(Clone)]
pub struct CapabilityTokens {
    keyed: HmacSha256,
    clock: Arc<dyn Clock>,
    lifetime: TimeDelta,
}

impl CapabilityTokens {
    /// # Errors
    /// Returns [`ConfigError::WeakSecret`] when `secret` is shorter than 16
    /// bytes.
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let keyed = HmacSha256::new_from_slice(secret).map_err(|_| ConfigError::WeakSecret)?;
        Ok(Self {
            keyed,
            clock,
            lifetime: TimeDelta::hours(DEFAULT_LIFETIME_HOURS),
        })
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: TimeDelta) -> Self {
        self.lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn create(&self, action: &str, actor: Option<&ActorId>) -> String {
        let tag = self.mac(self.tick(), action, actor).finalize().into_bytes();
        hex::encode(tag)
    }

    /// Check `token` against `action` and `actor`. Returns `None` for
    /// anything that was not minted for this pair within the lifetime.
    #[must_use]
    pub fn verify(&self, token: &str, action: &str, actor: Option<&ActorId>) -> Option<TokenAge> {
        let Ok(tag) = hex::decode(token.trim()) else {
            return None;
        };

        let tick = self.tick();
        if self.mac(tick, action, actor).verify_slice(&tag).is_ok() {
            return Some(TokenAge::Fresh);
        }
        if self.mac(tick - 1, action, actor).verify_slice(&tag).is_ok() {
            return Some(TokenAge::Aging);
        }
        None
    }

    fn tick(&self) -> i64 {
        let half = (self.lifetime.num_seconds() / 2).max(1);
        self.clock.now().timestamp().div_euclid(half) + 1
    }

    fn mac(&self, tick: i64, action: &str, actor: Option<&ActorId>) -> HmacSha256 {
        let actor = actor.map_or(ANONYMOUS_ACTOR, ActorId::as_str);
        let mut mac = self.keyed.clone();
        mac.update(format!("{tick}|{action}|{actor}").as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeDelta, TimeZone, Utc};
    use ink_notices::ActorId;
    use ink_store::ManualClock;

    use super::{APPLY_UPDATE_ACTION, CapabilityTokens, TokenAge};
    use crate::config::ConfigError;

    const SECRET: &[u8] = b"0123456789abcdef-test-secret";

    fn tokens() -> (Arc<ManualClock>, CapabilityTokens) {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 1, 0, 0, 1)
            .single()
            .expect("start time should be valid");
        let clock = Arc::new(ManualClock::new(start));
        let tokens = CapabilityTokens::new(SECRET, clock.clone()).expect("secret should be accepted");
        (clock, tokens)
    }

    #[test]
    fn short_secret_is_rejected() {
        let clock = Arc::new(ManualClock::default());
        assert!(matches!(
            CapabilityTokens::new(b"short", clock),
            Err(ConfigError::WeakSecret)
        ));
    }

    #[test]
    fn token_verifies_for_same_action_and_actor() {
        let (_, tokens) = tokens();
        let actor = ActorId::from(7);
        let token = tokens.create(APPLY_UPDATE_ACTION, Some(&actor));

        assert_eq!(
            tokens.verify(&token, APPLY_UPDATE_ACTION, Some(&actor)),
            Some(TokenAge::Fresh)
        );
        assert_eq!(tokens.verify(&token, "ink-notices-delete-admin", Some(&actor)), None);
        assert_eq!(
            tokens.verify(&token, APPLY_UPDATE_ACTION, Some(&ActorId::from(8))),
            None
        );
        assert_eq!(tokens.verify(&token, APPLY_UPDATE_ACTION, None), None);
    }

    #[test]
    fn token_ages_then_expires() {
        let (clock, tokens) = tokens();
        let token = tokens.create(APPLY_UPDATE_ACTION, None);

        clock.advance(TimeDelta::hours(12));
        assert_eq!(
            tokens.verify(&token, APPLY_UPDATE_ACTION, None),
            Some(TokenAge::Aging)
        );

        clock.advance(TimeDelta::hours(12));
        assert_eq!(tokens.verify(&token, APPLY_UPDATE_ACTION, None), None);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let (_, tokens) = tokens();
        assert_eq!(tokens.verify("", APPLY_UPDATE_ACTION, None), None);
        assert_eq!(tokens.verify("not-hex", APPLY_UPDATE_ACTION, None), None);
        assert_eq!(tokens.verify("abcd", APPLY_UPDATE_ACTION, None), None);
    }

    #[test]
    fn different_secrets_do_not_share_tokens() {
        let (clock, tokens) = tokens();
        let other = CapabilityTokens::new(b"fedcba9876543210-other-secret", clock)
            .expect("secret should be accepted");
        let token = tokens.create(APPLY_UPDATE_ACTION, None);
        assert_eq!(other.verify(&token, APPLY_UPDATE_ACTION, None), None);
    }
}
