use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Bucket shared by every request that carries no client address headers.
pub const UNKNOWN_CLIENT_KEY: &str = "unknown";

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Why the admission controller turned a request away.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionDenied {
    #[error("too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("origin is not on the allow-list")]
    OriginForbidden,
}

/// Admission outcome for an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionStatus {
    pub remaining: u32,
}

struct WindowEntry {
    window_start: Instant,
    count: u32,
}

/// Fixed-window request limiter keyed by hashed client address.
///
/// Windows reset lazily on the next request after expiry; fully idle
/// entries are removed by the periodic sweeper.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, WindowEntry>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self::with_window(max_requests, DEFAULT_WINDOW)
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Counts the request against the client's current window.
    ///
    /// A rejected request is not counted and does not move the window.
    pub fn admit(&self, client_key: &str) -> Result<AdmissionStatus, AdmissionDenied> {
        let now = Instant::now();
        let mut entries = self.lock_entries();

        let entry = entries.entry(client_key.to_string()).or_insert(WindowEntry {
            window_start: now,
            count: 0,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            let remaining_window = self
                .window
                .saturating_sub(now.duration_since(entry.window_start));
            // Rounded up: a client that waits the hinted time clears the window.
            let retry_after_secs = (remaining_window.as_secs()
                + u64::from(remaining_window.subsec_nanos() > 0))
            .max(1);
            return Err(AdmissionDenied::RateLimited { retry_after_secs });
        }

        entry.count += 1;
        Ok(AdmissionStatus {
            remaining: self.max_requests - entry.count,
        })
    }

    /// Drops every entry whose window has fully elapsed. Returns how many
    /// entries were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.window_start) < self.window);
        before - entries.len()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, WindowEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::warn!("⚠️ Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Derives the rate-limit bucket for a request from its proxy headers.
///
/// Takes the first hop of `x-forwarded-for`, then `x-real-ip`. The address
/// is hashed so raw client IPs never reach the limiter table or the logs.
/// Requests with neither header all land in the shared "unknown" bucket.
pub fn derive_client_key(forwarded_for: Option<&str>, real_ip: Option<&str>) -> String {
    let address = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .or_else(|| real_ip.map(str::trim).filter(|ip| !ip.is_empty()));

    match address {
        Some(address) => hex::encode(&Sha256::digest(address.as_bytes())[..8]),
        None => {
            log::warn!(
                "⚠️ Request without client address headers, sharing the '{}' bucket",
                UNKNOWN_CLIENT_KEY
            );
            UNKNOWN_CLIENT_KEY.to_string()
        }
    }
}

/// Origin allow-list gate. Requests without an `Origin` header pass (same
/// origin, curl, native apps). An empty allow-list disables the gate.
pub fn check_origin(origin: Option<&str>, allowed_origins: &[String]) -> Result<(), AdmissionDenied> {
    let origin = match origin {
        Some(origin) => origin.trim_end_matches('/'),
        None => return Ok(()),
    };

    if allowed_origins.is_empty()
        || allowed_origins
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(origin))
    {
        Ok(())
    } else {
        Err(AdmissionDenied::OriginForbidden)
    }
}
