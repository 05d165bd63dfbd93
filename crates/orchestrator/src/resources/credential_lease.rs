//! RAII lease over a pooled credential.

use collect_core::{CredentialHealth, Secret};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collector::CollectorError;
use crate::credentials::CredentialPool;

/// A credential checked out of the pool for one task.
///
/// Dropping the lease returns it to the pool. The outcome of the work done
/// with it is reported through [`CredentialLease::mark_succeeded`] or
/// [`CredentialLease::mark_failed`]; a lease dropped without either leaves
/// the credential's health untouched.
///
/// # Example
///
/// ```ignore
/// let mut lease = pool.acquire("reddit")?;
/// match collect(lease.secret()).await {
///     Ok(_) => lease.mark_succeeded(),
///     Err(e) => { lease.mark_failed(&e); }
/// }
/// ```
pub struct CredentialLease {
    id: Uuid,
    platform: String,
    secret: Secret,
    pool: CredentialPool,
    reported: bool,
}

impl CredentialLease {
    pub(crate) fn new(id: Uuid, platform: String, secret: Secret, pool: CredentialPool) -> Self {
        Self {
            id,
            platform,
            secret,
            pool,
            reported: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    pub fn mark_succeeded(&mut self) {
        if let Err(e) = self.pool.report_success(self.id) {
            warn!(credential_id = %self.id, error = %e, "Failed to record credential success");
        }
        self.reported = true;
    }

    /// Reports an error against the credential. Only rate limits and
    /// authentication failures reach the pool.
    pub fn mark_failed(&mut self, error: &CollectorError) -> Option<CredentialHealth> {
        self.reported = true;
        if !error.concerns_credential() {
            return None;
        }
        match self.pool.report_error(self.id, error) {
            Ok(health) => Some(health),
            Err(e) => {
                warn!(credential_id = %self.id, error = %e, "Failed to record credential error");
                None
            }
        }
    }
}

impl std::fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLease")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("reported", &self.reported)
            .finish()
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        if !self.reported {
            debug!(
                credential_id = %self.id,
                platform = %self.platform,
                "Credential lease released without an outcome"
            );
        }
        self.pool.release(self.id);
    }
}
