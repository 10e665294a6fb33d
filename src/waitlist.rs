//! # Waitlist
//!
//! The two operations behind the public endpoints: registration and the
//! authenticated listing.
//!
//! ## Key layout
//!
//! - `ponsiv:waitlist:emails` — JSON array of normalized emails, insertion
//!   order preserved
//! - `ponsiv:waitlist:detail:<email>` — JSON detail record, written once
//! - `ponsiv:ratelimit:<address>` — request counter, 15-minute expiry
//!
//! The list update is a full read-modify-write: two concurrent registrations
//! can both read the same snapshot and the second write drops the first
//! entry, while both detail records persist. Accepted for the expected
//! traffic volume. A crash between the two writes leaves a list entry
//! without detail, which the listing papers over with a placeholder.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::rate_limit::RateLimiter;
use crate::store::KvStore;

pub const WAITLIST_KEY: &str = "ponsiv:waitlist:emails";
pub const DETAIL_PREFIX: &str = "ponsiv:waitlist:detail:";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrantDetail {
    pub email: String,
    pub timestamp: String,
    pub ip: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct Registration {
    pub email: String,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct WaitlistPage {
    pub total: usize,
    pub registrants: Vec<RegistrantDetail>,
}

/// Canonical identity: trimmed, lowercased, with literal angle brackets
/// stripped so the value is safe to render later.
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase().replace(['<', '>'], "")
}

pub struct Waitlist {
    store: Arc<dyn KvStore>,
    rate_limiter: RateLimiter,
    admin_token: String,
}

impl Waitlist {
    pub fn new(store: Arc<dyn KvStore>, rate_limiter: RateLimiter, admin_token: String) -> Self {
        Waitlist {
            store,
            rate_limiter,
            admin_token,
        }
    }

    /// Each step is a hard gate: rate limit, validation, normalization,
    /// duplicate check, persistence.
    pub async fn register(
        &self,
        email: Option<&str>,
        source: &str,
    ) -> Result<Registration, AppError> {
        self.rate_limiter.check(source).await?;

        // Padding is stripped by normalization anyway, so it never disqualifies.
        let raw = email.ok_or(AppError::InvalidEmail)?;
        if !EMAIL_RE.is_match(raw.trim()) {
            return Err(AppError::InvalidEmail);
        }
        let email = normalize(raw);

        let mut emails = self.load_emails().await?;
        if emails.iter().any(|existing| existing == &email) {
            return Err(AppError::DuplicateEmail);
        }

        let entry = RegistrantDetail {
            email: email.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ip: source.to_string(),
        };

        // List first, detail second. No rollback if the second write fails.
        emails.push(email.clone());
        self.store
            .set(WAITLIST_KEY, &serde_json::to_string(&emails)?)
            .await?;
        self.store
            .set(
                &format!("{DETAIL_PREFIX}{email}"),
                &serde_json::to_string(&entry)?,
            )
            .await?;

        info!("new waitlist registration: {email}");

        Ok(Registration {
            email,
            timestamp: entry.timestamp,
        })
    }

    /// Full listing, newest first. The token is compared against the whole
    /// `Authorization` header with exact string equality (not constant-time).
    pub async fn list(&self, auth_header: Option<&str>) -> Result<WaitlistPage, AppError> {
        let expected = format!("Bearer {}", self.admin_token);
        if auth_header != Some(expected.as_str()) {
            return Err(AppError::Unauthorized);
        }

        let emails = self.load_emails().await?;

        let mut registrants = Vec::with_capacity(emails.len());
        for email in &emails {
            let detail = match self.store.get(&format!("{DETAIL_PREFIX}{email}")).await? {
                Some(raw) => serde_json::from_str(&raw)?,
                None => RegistrantDetail {
                    email: email.clone(),
                    timestamp: "unknown".to_string(),
                    ip: "unknown".to_string(),
                },
            };
            registrants.push(detail);
        }

        // Unparseable timestamps (the "unknown" placeholder) sort last.
        registrants.sort_by(|a, b| {
            parse_timestamp(&b.timestamp).cmp(&parse_timestamp(&a.timestamp))
        });

        Ok(WaitlistPage {
            total: emails.len(),
            registrants,
        })
    }

    async fn load_emails(&self) -> Result<Vec<String>, AppError> {
        Ok(match self.store.get(WAITLIST_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    fn waitlist(store: Arc<MemoryKvStore>) -> Waitlist {
        let rate_limiter = RateLimiter::new(store.clone(), 3, 900);
        Waitlist::new(store, rate_limiter, "secret".to_string())
    }

    #[test]
    fn normalize_trims_lowercases_and_strips_brackets() {
        // Interior whitespace survives; only the ends are trimmed.
        assert_eq!(normalize(" A@B.COM <x> "), "a@b.com x");
        assert_eq!(normalize("user@example.com"), "user@example.com");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [" A@B.COM <x> ", "User@Example.com ", "plain@mail.org"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[tokio::test]
    async fn invalid_emails_fail_without_store_writes() {
        let store = Arc::new(MemoryKvStore::default());
        let waitlist = waitlist(store.clone());

        // Distinct addresses so the rate limit never gets in the way.
        for (n, bad) in ["", "no-at-sign", "user@nodot", "two words@mail.com"]
            .into_iter()
            .enumerate()
        {
            let err = waitlist
                .register(Some(bad), &format!("1.2.3.{n}"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidEmail));
        }
        let err = waitlist.register(None, "1.2.3.200").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidEmail));

        assert_eq!(store.get(WAITLIST_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn padded_email_passes_validation() {
        let store = Arc::new(MemoryKvStore::default());
        let waitlist = waitlist(store.clone());

        let registration = waitlist
            .register(Some("User@Example.com "), "1.2.3.4")
            .await
            .unwrap();
        assert_eq!(registration.email, "user@example.com");

        // Whitespace inside the address is still disqualifying.
        let err = waitlist
            .register(Some(" two words@mail.com "), "5.6.7.8")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidEmail));
    }

    #[tokio::test]
    async fn registration_stores_list_entry_and_detail() {
        let store = Arc::new(MemoryKvStore::default());
        let waitlist = waitlist(store.clone());

        let registration = waitlist
            .register(Some(" User@Example.com "), "1.2.3.4")
            .await
            .unwrap();
        assert_eq!(registration.email, "user@example.com");

        let list = store.get(WAITLIST_KEY).await.unwrap().unwrap();
        assert_eq!(list, r#"["user@example.com"]"#);

        let raw = store
            .get("ponsiv:waitlist:detail:user@example.com")
            .await
            .unwrap()
            .unwrap();
        let detail: RegistrantDetail = serde_json::from_str(&raw).unwrap();
        assert_eq!(detail.email, "user@example.com");
        assert_eq!(detail.ip, "1.2.3.4");
        assert_eq!(detail.timestamp, registration.timestamp);
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_store_unchanged() {
        let store = Arc::new(MemoryKvStore::default());
        let waitlist = waitlist(store.clone());

        waitlist
            .register(Some("user@example.com"), "1.2.3.4")
            .await
            .unwrap();
        let list_after_first = store.get(WAITLIST_KEY).await.unwrap();
        let detail_after_first = store
            .get("ponsiv:waitlist:detail:user@example.com")
            .await
            .unwrap();

        // Same email through a different casing and a different caller.
        let err = waitlist
            .register(Some("USER@example.com"), "5.6.7.8")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        assert_eq!(store.get(WAITLIST_KEY).await.unwrap(), list_after_first);
        assert_eq!(
            store
                .get("ponsiv:waitlist:detail:user@example.com")
                .await
                .unwrap(),
            detail_after_first
        );
    }

    #[tokio::test]
    async fn fourth_request_is_rate_limited_regardless_of_payload() {
        let waitlist = waitlist(Arc::new(MemoryKvStore::default()));

        for n in 0..3 {
            waitlist
                .register(Some(&format!("user{n}@example.com")), "9.9.9.9")
                .await
                .unwrap();
        }
        let err = waitlist
            .register(Some("fresh@example.com"), "9.9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited));

        // An invalid payload is rejected for the rate limit, not validation.
        let err = waitlist.register(Some("not-an-email"), "9.9.9.9").await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited));
    }

    #[tokio::test]
    async fn list_rejects_wrong_or_missing_token() {
        let waitlist = waitlist(Arc::new(MemoryKvStore::default()));

        for header in [None, Some("Bearer wrong"), Some("secret"), Some("bearer secret")] {
            let err = waitlist.list(header).await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized));
        }
    }

    #[tokio::test]
    async fn list_is_sorted_newest_first() {
        let store = Arc::new(MemoryKvStore::default());
        let waitlist = waitlist(store.clone());

        store
            .set(WAITLIST_KEY, r#"["a@x.com","b@x.com","c@x.com"]"#)
            .await
            .unwrap();
        for (email, timestamp) in [
            ("a@x.com", "2025-01-01T00:00:00.000Z"),
            ("b@x.com", "2025-06-01T00:00:00.000Z"),
            ("c@x.com", "2025-03-01T00:00:00.000Z"),
        ] {
            let detail = RegistrantDetail {
                email: email.to_string(),
                timestamp: timestamp.to_string(),
                ip: "1.2.3.4".to_string(),
            };
            store
                .set(
                    &format!("{DETAIL_PREFIX}{email}"),
                    &serde_json::to_string(&detail).unwrap(),
                )
                .await
                .unwrap();
        }

        let page = waitlist.list(Some("Bearer secret")).await.unwrap();
        assert_eq!(page.total, 3);
        let order: Vec<&str> = page.registrants.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(order, ["b@x.com", "c@x.com", "a@x.com"]);
    }

    #[tokio::test]
    async fn missing_detail_becomes_placeholder_sorted_last() {
        let store = Arc::new(MemoryKvStore::default());
        let waitlist = waitlist(store.clone());

        waitlist
            .register(Some("kept@example.com"), "1.2.3.4")
            .await
            .unwrap();
        store
            .set(WAITLIST_KEY, r#"["kept@example.com","orphan@example.com"]"#)
            .await
            .unwrap();

        let page = waitlist.list(Some("Bearer secret")).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.registrants[0].email, "kept@example.com");
        assert_eq!(
            page.registrants[1],
            RegistrantDetail {
                email: "orphan@example.com".to_string(),
                timestamp: "unknown".to_string(),
                ip: "unknown".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let waitlist = waitlist(Arc::new(MemoryKvStore::default()));
        let page = waitlist.list(Some("Bearer secret")).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.registrants.is_empty());
    }
}
