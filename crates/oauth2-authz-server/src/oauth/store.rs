//! In-memory grant and token store.
//!
//! Every check-and-update (code redemption, refresh rotation, revocation) runs
//! under a single write-lock acquisition, so two racing redemptions of the same
//! code see exactly one success. When both maps are needed the `codes` lock is
//! taken before the `tokens` lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{OAuthError, OAuthResult};
use crate::models::{AuthorizationGrant, FamilyId, Scope, TokenKind, TokenRecord};

/// Why an authorization code could not be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemFailure {
    /// Unknown, expired or issued to another client.
    Invalid,
    /// Already redeemed once. `revoked` tokens of its family were revoked.
    Replayed { family_id: FamilyId, revoked: usize },
    /// The caller's checks (redirect URI, PKCE) failed. The code is consumed.
    Rejected(OAuthError),
}

/// Why a refresh token could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailure {
    /// Unknown, expired, revoked or issued to another client.
    Invalid,
    /// A rotated-out token was presented again.
    Reused { family_id: FamilyId, revoked: usize },
    /// The requested scope is not covered by the token's scope. Nothing changed.
    ScopeExceeded,
}

/// Refresh handling options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Retire the presented token; the caller issues a replacement.
    pub rotate: bool,
    /// Revoke the family when a rotated-out token is reused.
    pub revoke_family_on_reuse: bool,
}

/// Outcome of a revocation request for a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    NotFound,
    /// Owned by another client; left untouched.
    NotOwned,
    Revoked { kind: TokenKind, count: usize },
}

#[derive(Default)]
struct Tokens {
    records: HashMap<String, TokenRecord>,
    revoked_families: HashSet<FamilyId>,
}

impl Tokens {
    fn revoke_family(&mut self, family_id: FamilyId) -> usize {
        self.revoked_families.insert(family_id);
        let mut count = 0;
        for record in self.records.values_mut().filter(|r| r.family_id == family_id) {
            if !record.revoked {
                record.revoked = true;
                count += 1;
            }
        }
        count
    }
}

/// In-memory store for authorization codes and issued tokens.
#[derive(Clone, Default)]
pub struct GrantStore {
    codes: Arc<RwLock<HashMap<String, AuthorizationGrant>>>,
    tokens: Arc<RwLock<Tokens>>,
}

impl GrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_code(&self, grant: AuthorizationGrant) {
        self.codes.write().await.insert(grant.code.clone(), grant);
    }

    /// Atomically redeem an authorization code.
    ///
    /// The code must exist, belong to `client_id`, be unexpired and unused.
    /// `check` runs after the code is marked used. A replayed code optionally
    /// revokes every token issued from it.
    pub async fn redeem_code(
        &self,
        code: &str,
        client_id: &str,
        now: DateTime<Utc>,
        revoke_on_replay: bool,
        check: impl FnOnce(&AuthorizationGrant) -> OAuthResult<()>,
    ) -> Result<AuthorizationGrant, RedeemFailure> {
        let mut codes = self.codes.write().await;
        let grant = codes.get_mut(code).ok_or(RedeemFailure::Invalid)?;

        if grant.client_id != client_id {
            return Err(RedeemFailure::Invalid);
        }
        if grant.used {
            let family_id = grant.family_id;
            // A family with no tokens yet is still being issued to the winning
            // redemption; the replay is refused without cancelling that issuance.
            let revoked = if revoke_on_replay {
                let mut tokens = self.tokens.write().await;
                let issued = tokens.records.values().any(|r| r.family_id == family_id);
                if issued { tokens.revoke_family(family_id) } else { 0 }
            } else {
                0
            };
            tracing::warn!(
                client_id = %client_id,
                family_id = %family_id,
                revoked,
                "Authorization code replayed"
            );
            return Err(RedeemFailure::Replayed { family_id, revoked });
        }
        if grant.is_expired_at(now) {
            return Err(RedeemFailure::Invalid);
        }

        grant.used = true;
        check(grant).map_err(RedeemFailure::Rejected)?;
        Ok(grant.clone())
    }

    /// Store newly issued tokens. Fails if their family was revoked meanwhile.
    pub async fn insert_tokens(&self, records: Vec<TokenRecord>) -> OAuthResult<()> {
        let mut tokens = self.tokens.write().await;
        if records.iter().any(|record| tokens.revoked_families.contains(&record.family_id)) {
            return Err(OAuthError::InvalidGrant);
        }
        for record in records {
            tokens.records.insert(record.key.clone(), record);
        }
        Ok(())
    }

    pub async fn get_token(&self, key: &str) -> Option<TokenRecord> {
        self.tokens.read().await.records.get(key).cloned()
    }

    /// Atomically validate a refresh token and, with rotation, retire it.
    ///
    /// A `requested` scope is only compared once the token is known to be a
    /// live refresh token of `client_id`. Returns the record as it was before
    /// rotation.
    pub async fn use_refresh_token(
        &self,
        value: &str,
        client_id: &str,
        requested: Option<&Scope>,
        now: DateTime<Utc>,
        policy: RefreshPolicy,
    ) -> Result<TokenRecord, RefreshFailure> {
        let mut tokens = self.tokens.write().await;
        let record = tokens
            .records
            .get_mut(value)
            .filter(|record| record.kind == TokenKind::Refresh && record.client_id == client_id)
            .ok_or(RefreshFailure::Invalid)?;

        if record.rotated {
            let family_id = record.family_id;
            let revoked =
                if policy.revoke_family_on_reuse { tokens.revoke_family(family_id) } else { 0 };
            tracing::warn!(
                client_id = %client_id,
                family_id = %family_id,
                revoked,
                "Rotated refresh token reused"
            );
            return Err(RefreshFailure::Reused { family_id, revoked });
        }
        if !record.is_active_at(now) {
            return Err(RefreshFailure::Invalid);
        }
        if requested.is_some_and(|scope| !scope.is_subset(&record.scope)) {
            return Err(RefreshFailure::ScopeExceeded);
        }

        let snapshot = record.clone();
        if policy.rotate {
            record.rotated = true;
            record.revoked = true;
        }
        Ok(snapshot)
    }

    /// Revoke a token on behalf of `client_id`. Revoking a refresh token revokes
    /// its whole family.
    pub async fn revoke(&self, key: &str, client_id: &str) -> Revocation {
        let mut tokens = self.tokens.write().await;
        let Some(record) = tokens.records.get_mut(key) else {
            return Revocation::NotFound;
        };
        if record.client_id != client_id {
            return Revocation::NotOwned;
        }

        let kind = record.kind;
        let count = match kind {
            TokenKind::Access => {
                let newly = !record.revoked;
                record.revoked = true;
                usize::from(newly)
            }
            TokenKind::Refresh => {
                let family_id = record.family_id;
                tokens.revoke_family(family_id)
            }
        };
        Revocation::Revoked { kind, count }
    }

    pub async fn revoke_family(&self, family_id: FamilyId) -> usize {
        self.tokens.write().await.revoke_family(family_id)
    }

    /// Drop expired codes and tokens. Returns how many entries were removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let codes_removed = {
            let mut codes = self.codes.write().await;
            let before = codes.len();
            codes.retain(|_, grant| !grant.is_expired_at(now));
            before - codes.len()
        };

        let tokens_removed = {
            let mut tokens = self.tokens.write().await;
            let before = tokens.records.len();
            tokens.records.retain(|_, record| !record.is_expired_at(now));
            let live: HashSet<FamilyId> = tokens.records.values().map(|r| r.family_id).collect();
            tokens.revoked_families.retain(|family| live.contains(family));
            before - tokens.records.len()
        };

        if codes_removed + tokens_removed > 0 {
            tracing::debug!(
                codes = codes_removed,
                tokens = tokens_removed,
                "Purged expired grants"
            );
        }
        codes_removed + tokens_removed
    }

    /// Periodically purge expired entries. Expiry is still checked on every use.
    pub fn start_cleanup_task(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.purge_expired(Utc::now()).await;
            }
        })
    }
}

impl std::fmt::Debug for GrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantStore").finish()
    }
}
