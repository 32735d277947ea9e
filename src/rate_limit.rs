use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::settings::RateLimitSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateInfo {
    pub limit: u32,
    pub remaining: u32,
}

/// Rolling-window admission control keyed by client address.
///
/// Each address keeps the instants of its admitted attempts; an attempt is
/// admitted while fewer than `max_requests` of them are younger than `window`.
#[derive(Clone)]
pub struct RateGovernor {
    log: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_requests: u32,
    window: Duration,
}

impl RateGovernor {
    pub fn new(max_requests: u32, window: Duration) -> RateGovernor {
        RateGovernor {
            log: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> RateGovernor {
        RateGovernor::new(
            settings.max_requests,
            Duration::from_secs(settings.window_secs),
        )
    }

    pub fn check(&self, client: &str) -> Result<RateInfo, AppError> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> Result<RateInfo, AppError> {
        let mut log = self.lock();
        let attempts = log.entry(client.to_string()).or_default();
        expire(attempts, now, self.window);

        if attempts.len() >= self.max_requests as usize {
            let retry_after = attempts
                .front()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            return Err(AppError::RateLimited {
                retry_after_secs: ceil_secs(retry_after),
            });
        }

        attempts.push_back(now);
        Ok(RateInfo {
            limit: self.max_requests,
            remaining: self.max_requests - attempts.len() as u32,
        })
    }

    pub fn purge_at(&self, now: Instant) -> usize {
        let mut log = self.lock();
        let before = log.len();
        log.retain(|_, attempts| {
            expire(attempts, now, self.window);
            !attempts.is_empty()
        });
        before - log.len()
    }

    pub fn spawn_purger(&self, every: Duration) {
        let governor = self.clone();
        thread::spawn(move || loop {
            thread::sleep(every);
            let dropped = governor.purge_at(Instant::now());
            if dropped > 0 {
                tracing::debug!("dropped {} idle rate limit entries", dropped);
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn expire(attempts: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = attempts.front() {
        if now.saturating_duration_since(*oldest) >= window {
            attempts.pop_front();
        } else {
            break;
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

pub fn rate_limit_headers(info: &RateInfo) -> Vec<(&'static str, String)> {
    vec![
        ("X-RateLimit-Limit", info.limit.to_string()),
        ("X-RateLimit-Remaining", info.remaining.to_string()),
    ]
}
