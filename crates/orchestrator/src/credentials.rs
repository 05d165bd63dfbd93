//! In-memory credential pool with health tracking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use collect_core::{CredentialHealth, CredentialRecord, Secret};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collector::CollectorError;
use crate::config::CredentialPolicy;
use crate::error::CredentialError;
use crate::resources::CredentialLease;

#[derive(Default)]
struct PoolState {
    credentials: Vec<CredentialRecord>,
    in_flight: HashMap<Uuid, usize>,
}

impl PoolState {
    fn find_mut(&mut self, id: Uuid) -> Result<&mut CredentialRecord, CredentialError> {
        self.credentials
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(CredentialError::UnknownCredential(id))
    }

    fn in_flight(&self, id: Uuid) -> usize {
        self.in_flight.get(&id).copied().unwrap_or(0)
    }
}

/// Hands out platform credentials, preferring the least loaded and then the
/// least recently used one, and takes failing ones out of rotation.
#[derive(Clone, Default)]
pub struct CredentialPool {
    state: Arc<Mutex<PoolState>>,
    policy: CredentialPolicy,
}

impl CredentialPool {
    pub fn new(policy: CredentialPolicy) -> Self {
        Self {
            state: Arc::default(),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // State stays consistent across a panic in another holder.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    pub fn add(&self, platform: impl Into<String>, secret: Secret) -> Uuid {
        let record = CredentialRecord::new(platform, secret);
        let id = record.id;
        debug!(credential_id = %id, platform = %record.platform, "Credential added to pool");
        self.lock().credentials.push(record);
        id
    }

    /// Leases an active credential of the platform that is not cooling down.
    pub fn acquire(&self, platform: &str) -> Result<CredentialLease, CredentialError> {
        self.acquire_at(platform, Utc::now())
    }

    fn acquire_at(
        &self,
        platform: &str,
        now: DateTime<Utc>,
    ) -> Result<CredentialLease, CredentialError> {
        let mut state = self.lock();

        let chosen = state
            .credentials
            .iter()
            .filter(|c| c.platform == platform && c.active && !c.is_cooling_down(now))
            .min_by_key(|c| (state.in_flight(c.id), c.last_used_at))
            .map(|c| c.id)
            .ok_or_else(|| CredentialError::NoCredentialAvailable(platform.to_string()))?;

        *state.in_flight.entry(chosen).or_insert(0) += 1;
        let record = state.find_mut(chosen)?;
        record.last_used_at = Some(now);
        let secret = record.secret.clone();

        debug!(credential_id = %chosen, %platform, "Credential leased");
        Ok(CredentialLease::new(
            chosen,
            platform.to_string(),
            secret,
            self.clone(),
        ))
    }

    pub(crate) fn release(&self, id: Uuid) {
        let mut state = self.lock();
        if let Some(count) = state.in_flight.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.in_flight.remove(&id);
            }
        }
    }

    /// Records a collector error against the credential used.
    ///
    /// Rate limits start a cooldown; every error counts toward deactivation.
    pub fn report_error(
        &self,
        id: Uuid,
        error: &CollectorError,
    ) -> Result<CredentialHealth, CredentialError> {
        let now = Utc::now();
        let max_errors = self.policy.max_consecutive_errors;
        let mut state = self.lock();
        let in_flight = state.in_flight(id);
        let record = state.find_mut(id)?;

        record.consecutive_errors += 1;
        record.last_error_at = Some(now);

        if let CollectorError::RateLimited { retry_after, .. } = error {
            let cooldown = retry_after.unwrap_or_else(|| self.policy.backoff(record.consecutive_errors));
            record.cooldown_until = chrono::Duration::from_std(cooldown)
                .ok()
                .and_then(|d| now.checked_add_signed(d));
            debug!(
                credential_id = %id,
                cooldown_secs = cooldown.as_secs_f64(),
                "Credential cooling down"
            );
        }

        if record.active && record.consecutive_errors >= max_errors {
            record.active = false;
            warn!(
                credential_id = %id,
                platform = %record.platform,
                consecutive_errors = record.consecutive_errors,
                error = %error,
                "Credential deactivated"
            );
        }

        Ok(record.health(in_flight))
    }

    pub fn report_success(&self, id: Uuid) -> Result<(), CredentialError> {
        let mut state = self.lock();
        let record = state.find_mut(id)?;
        record.consecutive_errors = 0;
        record.cooldown_until = None;
        Ok(())
    }

    /// Puts a deactivated credential back into rotation with a clean slate.
    pub fn reactivate(&self, id: Uuid) -> Result<CredentialHealth, CredentialError> {
        let mut state = self.lock();
        let in_flight = state.in_flight(id);
        let record = state.find_mut(id)?;
        record.active = true;
        record.consecutive_errors = 0;
        record.cooldown_until = None;
        info!(credential_id = %id, platform = %record.platform, "Credential reactivated");
        Ok(record.health(in_flight))
    }

    pub fn status(&self, platform: &str) -> Vec<CredentialHealth> {
        let state = self.lock();
        state
            .credentials
            .iter()
            .filter(|c| c.platform == platform)
            .map(|c| c.health(state.in_flight(c.id)))
            .collect()
    }

    pub fn platforms(&self) -> Vec<String> {
        let state = self.lock();
        let mut platforms: Vec<_> = state.credentials.iter().map(|c| c.platform.clone()).collect();
        platforms.sort();
        platforms.dedup();
        platforms
    }
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("CredentialPool")
            .field("credentials", &state.credentials.len())
            .field("policy", &self.policy)
            .finish()
    }
}
