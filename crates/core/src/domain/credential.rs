use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Opaque credential material. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub platform: String,
    pub secret: Secret,
    pub consecutive_errors: u32,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub active: bool,
}

impl CredentialRecord {
    pub fn new(platform: impl Into<String>, secret: Secret) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform: platform.into(),
            secret,
            consecutive_errors: 0,
            last_error_at: None,
            last_used_at: None,
            cooldown_until: None,
            active: true,
        }
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub fn health(&self, in_flight: usize) -> CredentialHealth {
        CredentialHealth {
            id: self.id,
            platform: self.platform.clone(),
            active: self.active,
            consecutive_errors: self.consecutive_errors,
            last_error_at: self.last_error_at,
            cooldown_until: self.cooldown_until,
            in_flight,
        }
    }
}

/// Secret-free view of a credential for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CredentialHealth {
    pub id: Uuid,
    pub platform: String,
    pub active: bool,
    pub consecutive_errors: u32,
    pub last_error_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub in_flight: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_cooldown_window() {
        let now = Utc::now();
        let mut credential = CredentialRecord::new("x", Secret::new("s"));
        assert!(!credential.is_cooling_down(now));

        credential.cooldown_until = Some(now + Duration::seconds(30));
        assert!(credential.is_cooling_down(now));
        assert!(!credential.is_cooling_down(now + Duration::seconds(31)));
    }
}
