// libs/appointment-cell/src/services/locking.rs
use chrono::{Duration, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// How long a lock row is honored before any writer may reap it. Bookings
/// hold the lock only across validate-and-insert, well under this.
const LOCK_TTL_SECONDS: i64 = 10;

/// Mutual exclusion for bookings, one lock per veterinarian per day. The
/// `scheduling_locks` table has a unique index on `lock_key`; inserting an
/// existing key fails with a conflict, which is the losing side of the race.
pub struct SchedulingLockService {
    supabase: Arc<SupabaseClient>,
}

impl SchedulingLockService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn lock_key(veterinarian_id: Uuid, date: NaiveDate) -> String {
        format!("sched:{}:{}", veterinarian_id, date)
    }

    /// Take the lock for (veterinarian, date). On a key collision, reap the
    /// row if its TTL has lapsed and try once more; a live lock means another
    /// booking is in flight.
    pub async fn acquire(
        &self,
        veterinarian_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let key = Self::lock_key(veterinarian_id, date);

        match self.try_insert(&key, auth_token).await {
            Ok(()) => Ok(()),
            Err(AppointmentError::SlotLocked) => {
                self.reap_expired(&key, auth_token).await?;
                match self.try_insert(&key, auth_token).await {
                    Ok(()) => Ok(()),
                    Err(AppointmentError::SlotLocked) => {
                        warn!("Lock {} is held by a concurrent booking", key);
                        Err(AppointmentError::SlotLocked)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn release(
        &self,
        veterinarian_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let key = Self::lock_key(veterinarian_id, date);
        debug!("Releasing lock {}", key);

        let path = format!("/rest/v1/scheduling_locks?lock_key=eq.{}", key);
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn try_insert(&self, key: &str, auth_token: &str) -> Result<(), AppointmentError> {
        let now = Utc::now();
        let body = json!({
            "lock_key": key,
            "locked_at": now.to_rfc3339(),
            "expires_at": (now + Duration::seconds(LOCK_TTL_SECONDS)).to_rfc3339(),
        });

        debug!("Acquiring lock {}", key);
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Result<Vec<Value>, _> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/scheduling_locks",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().starts_with("Conflict") => Err(AppointmentError::SlotLocked),
            Err(e) => Err(AppointmentError::DatabaseError(e.to_string())),
        }
    }

    /// Delete the lock row only if its TTL has already lapsed.
    async fn reap_expired(&self, key: &str, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/scheduling_locks?lock_key=eq.{}&expires_at=lt.{}",
            key,
            Utc::now().to_rfc3339()
        );

        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
