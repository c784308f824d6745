//! Sliding-window rate limiter over per-client timestamp histories.
//!
//! Each key owns a time-ordered deque of request instants, capped at
//! `max_history` entries. A request is admitted when fewer than `limit`
//! timestamps fall inside `[now - window, now]`. Check and record happen
//! inside one critical section, so two simultaneous requests from the same
//! client can never both take the last slot.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use intake_core::Quota;
use intake_core::ports::RateLimiter;

/// Sliding-window limiter configuration.
#[derive(Debug, Clone)]
pub struct SlidingWindowConfig {
    /// Maximum timestamps kept per key; oldest are evicted first.
    pub max_history: usize,
    /// Minimum age after which timestamps are dropped. Raised automatically
    /// to twice the longest window ever checked.
    pub retention: Duration,
    /// Minimum spacing between full sweeps of every key.
    pub sweep_interval: Duration,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            max_history: 256,
            retention: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Why [`SlidingWindowLimiter::admit_at`] turned a request away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal<E> {
    /// The first quota found exhausted.
    OverQuota(Quota),
    /// All quotas passed but the commit step declined.
    Declined(E),
}

pub struct SlidingWindowLimiter {
    config: SlidingWindowConfig,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    histories: HashMap<String, VecDeque<Instant>>,
    longest_window: Duration,
    last_sweep: Option<Instant>,
}

impl SlidingWindowLimiter {
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// Single-quota check against `client_id`'s history at `now`.
    pub fn check_and_record_at(&self, client_id: &str, quota: Quota, now: Instant) -> bool {
        let quotas = [quota];
        self.admit_at(&[(client_id, &quotas[..])], now, || Ok::<(), ()>(()))
            .is_ok()
    }

    /// Evaluate every `(key, quotas)` pair, then run `commit`.
    ///
    /// `now` is recorded against every key only when all quotas pass and
    /// `commit` returns `Ok`; otherwise nothing is recorded. The lock is held
    /// across `commit`, which must not block.
    pub fn admit_at<T, E>(
        &self,
        checks: &[(&str, &[Quota])],
        now: Instant,
        commit: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, Refusal<E>> {
        let mut state = self.lock();

        let longest = checks
            .iter()
            .flat_map(|(_, quotas)| quotas.iter().map(|q| q.window))
            .max()
            .unwrap_or_default();
        state.longest_window = state.longest_window.max(longest);
        let retention = self.retention(&state);

        state.sweep_if_due(now, retention, self.config.sweep_interval);

        for (key, quotas) in checks {
            let history = state.prune_key(key, now, retention);
            for quota in quotas.iter() {
                // Histories cannot count past the cap, so larger limits fail closed at it.
                let limit = (quota.limit as usize).min(self.config.max_history);
                if count_within(history, now, quota.window) >= limit {
                    return Err(Refusal::OverQuota(*quota));
                }
            }
        }

        let value = commit().map_err(Refusal::Declined)?;

        for (key, _) in checks {
            let history = state.histories.entry((*key).to_string()).or_default();
            history.push_back(now);
            while history.len() > self.config.max_history {
                history.pop_front();
            }
        }

        Ok(value)
    }

    /// Drop expired timestamps for every key and forget keys left empty.
    pub fn purge_expired_at(&self, now: Instant) {
        let mut state = self.lock();
        let retention = self.retention(&state);
        state.sweep(now, retention);
    }

    /// Timestamps currently held for `client_id`.
    pub fn history_len(&self, client_id: &str) -> usize {
        self.lock().histories.get(client_id).map_or(0, VecDeque::len)
    }

    fn retention(&self, state: &WindowState) -> Duration {
        self.config
            .retention
            .max(state.longest_window.saturating_mul(2))
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        // Every critical section leaves the map consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WindowState {
    fn sweep_if_due(&mut self, now: Instant, retention: Duration, interval: Duration) {
        let due = self
            .last_sweep
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);
        if due {
            self.sweep(now, retention);
        }
    }

    fn sweep(&mut self, now: Instant, retention: Duration) {
        self.histories.retain(|_, history| {
            prune(history, now, retention);
            !history.is_empty()
        });
        self.last_sweep = Some(now);
    }

    fn prune_key(&mut self, key: &str, now: Instant, retention: Duration) -> Option<&VecDeque<Instant>> {
        let emptied = match self.histories.get_mut(key) {
            Some(history) => {
                prune(history, now, retention);
                history.is_empty()
            }
            None => return None,
        };
        if emptied {
            self.histories.remove(key);
            return None;
        }
        self.histories.get(key)
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(SlidingWindowConfig::default())
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check_and_record(&self, client_id: &str, limit: u32, window: Duration) -> bool {
        self.check_and_record_at(client_id, Quota::new(limit, window), Instant::now())
    }

    fn tracked_clients(&self) -> usize {
        self.lock().histories.len()
    }
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, retention: Duration) {
    while let Some(&oldest) = history.front() {
        if now.saturating_duration_since(oldest) <= retention {
            break;
        }
        history.pop_front();
    }
}

/// Timestamps with `now - window <= ts`. Instants after `now` count as current.
fn count_within(history: Option<&VecDeque<Instant>>, now: Instant, window: Duration) -> usize {
    history.map_or(0, |history| {
        history
            .iter()
            .filter(|ts| now.saturating_duration_since(**ts) <= window)
            .count()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_limit_three_per_minute() {
        let limiter = SlidingWindowLimiter::default();
        let quota = Quota::per_minute(3);
        let t0 = Instant::now();

        assert!(limiter.check_and_record_at("10.0.0.1", quota, t0));
        assert!(limiter.check_and_record_at("10.0.0.1", quota, t0 + secs(1)));
        assert!(limiter.check_and_record_at("10.0.0.1", quota, t0 + secs(2)));
        assert!(!limiter.check_and_record_at("10.0.0.1", quota, t0 + secs(3)));
        assert!(limiter.check_and_record_at("10.0.0.1", quota, t0 + secs(65)));
    }

    #[test]
    fn test_rejected_request_is_not_recorded() {
        let limiter = SlidingWindowLimiter::default();
        let quota = Quota::per_minute(2);
        let t0 = Instant::now();

        assert!(limiter.check_and_record_at("a", quota, t0));
        assert!(limiter.check_and_record_at("a", quota, t0));
        for i in 0..5 {
            assert!(!limiter.check_and_record_at("a", quota, t0 + secs(i)));
        }
        assert_eq!(limiter.history_len("a"), 2);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let limiter = SlidingWindowLimiter::default();
        let quota = Quota::per_minute(1);
        let t0 = Instant::now();

        assert!(limiter.check_and_record_at("a", quota, t0));
        // Exactly one window later the first request still counts.
        assert!(!limiter.check_and_record_at("a", quota, t0 + secs(60)));
        assert!(limiter.check_and_record_at("a", quota, t0 + secs(60) + Duration::from_millis(1)));
    }

    #[test]
    fn test_spaced_requests_never_rejected() {
        let limiter = SlidingWindowLimiter::default();
        let quota = Quota::new(1, secs(10));
        let t0 = Instant::now();

        for i in 0..50 {
            assert!(limiter.check_and_record_at("a", quota, t0 + secs(11 * i)));
        }
    }

    #[test]
    fn test_nth_plus_one_rejected_iff_at_limit() {
        for limit in 1..=8u32 {
            for n in 0..=10u32 {
                let limiter = SlidingWindowLimiter::default();
                let unlimited = Quota::new(u32::MAX, secs(60));
                let t0 = Instant::now();
                for i in 0..n {
                    limiter.check_and_record_at("a", unlimited, t0 + Duration::from_millis(i as u64));
                }

                let admitted = limiter.check_and_record_at("a", Quota::new(limit, secs(60)), t0 + secs(1));
                assert_eq!(admitted, n < limit, "limit={limit} n={n}");
            }
        }
    }

    #[test]
    fn test_history_capped() {
        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig {
            max_history: 5,
            ..Default::default()
        });
        let quota = Quota::new(5, Duration::from_millis(10));
        let t0 = Instant::now();

        for i in 0..40u64 {
            limiter.check_and_record_at("a", quota, t0 + Duration::from_millis(i * 20));
            assert!(limiter.history_len("a") <= 5);
        }
        assert_eq!(limiter.history_len("a"), 5);
    }

    #[test]
    fn test_limit_above_cap_fails_closed() {
        let limiter = SlidingWindowLimiter::new(SlidingWindowConfig {
            max_history: 3,
            ..Default::default()
        });
        let quota = Quota::per_minute(10);
        let t0 = Instant::now();

        let admitted = (0..10).filter(|_| limiter.check_and_record_at("a", quota, t0)).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_expired_clients_are_forgotten() {
        let limiter = SlidingWindowLimiter::default();
        let quota = Quota::per_minute(5);
        let t0 = Instant::now();

        for i in 0..50 {
            limiter.check_and_record_at(&format!("192.168.0.{i}"), quota, t0);
        }
        assert_eq!(limiter.tracked_clients(), 50);

        // Retention is the larger of 300s and twice the one-minute window.
        limiter.purge_expired_at(t0 + secs(299));
        assert_eq!(limiter.tracked_clients(), 50);

        limiter.purge_expired_at(t0 + secs(301));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_check_sweeps_other_clients() {
        let limiter = SlidingWindowLimiter::default();
        let quota = Quota::per_minute(5);
        let t0 = Instant::now();

        for i in 0..10 {
            limiter.check_and_record_at(&format!("client-{i}"), quota, t0);
        }
        limiter.check_and_record_at("late", quota, t0 + secs(400));

        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_retention_grows_with_longest_window() {
        let limiter = SlidingWindowLimiter::default();
        let daily = Quota::per_day(2);
        let t0 = Instant::now();

        assert!(limiter.check_and_record_at("a", daily, t0));
        assert!(limiter.check_and_record_at("a", daily, t0 + secs(3_600)));
        // Well past the 300s base retention, still inside the day.
        assert!(!limiter.check_and_record_at("a", daily, t0 + secs(7_200)));
    }

    #[test]
    fn test_independent_quotas_on_shared_history() {
        let limiter = SlidingWindowLimiter::default();
        let quotas = [Quota::per_minute(2), Quota::per_hour(3)];
        let t0 = Instant::now();
        let check = |at| limiter.admit_at(&[("a", &quotas[..])], at, || Ok::<(), ()>(()));

        assert!(check(t0).is_ok());
        assert!(check(t0 + secs(1)).is_ok());
        assert_eq!(check(t0 + secs(2)), Err(Refusal::OverQuota(Quota::per_minute(2))));
        assert!(check(t0 + secs(120)).is_ok());
        assert_eq!(check(t0 + secs(240)), Err(Refusal::OverQuota(Quota::per_hour(3))));
    }

    #[test]
    fn test_declined_commit_records_nothing() {
        let limiter = SlidingWindowLimiter::default();
        let quota = [Quota::per_minute(1)];
        let t0 = Instant::now();

        let declined = limiter.admit_at(&[("a", &quota[..])], t0, || Err::<(), _>("full"));
        assert_eq!(declined, Err(Refusal::Declined("full")));
        assert_eq!(limiter.history_len("a"), 0);

        let admitted = limiter.admit_at(&[("a", &quota[..])], t0, || Ok::<_, ()>(7));
        assert_eq!(admitted, Ok(7));
    }

    #[test]
    fn test_concurrent_callers_single_slot() {
        for _ in 0..20 {
            let limiter = Arc::new(SlidingWindowLimiter::default());
            let barrier = Arc::new(Barrier::new(8));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = limiter.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        limiter.check_and_record("10.0.0.1", 1, secs(60))
                    })
                })
                .collect();

            let admitted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(admitted, 1);
        }
    }
}
