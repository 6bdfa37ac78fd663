//! Windowed exposure counters keyed by (user, subject, event type).
//!
//! Counters live in a `DashMap` whose per-key entry guard makes every
//! mutation an atomic upsert: two concurrent requests for the same user
//! and ad cannot both pass a `limit - 1` count. Buckets are keyed by the
//! epoch-aligned start of the window containing "now" and expire
//! implicitly once the window end passes; a periodic sweep reclaims them.

use adserve_core::config::FrequencyConfig;
use adserve_core::types::{CampaignCapRule, EventType};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// What a counter is scoped to: a single creative or a whole campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapSubject {
    Ad(Uuid),
    Campaign(Uuid),
}

impl CapSubject {
    /// Ad-level scope wins when both ids are present, matching the
    /// nullable (adId, campaignId) pair of the external contract.
    pub fn from_ids(ad_id: Option<Uuid>, campaign_id: Option<Uuid>) -> Option<Self> {
        ad_id
            .map(CapSubject::Ad)
            .or(campaign_id.map(CapSubject::Campaign))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    user_id: String,
    subject: CapSubject,
    event_type: EventType,
    window_start: i64,
}

struct CounterBucket {
    count: u32,
    window_end: DateTime<Utc>,
}

/// Answer to a cap check or reservation.
#[derive(Debug, Clone)]
pub struct CapStatus {
    pub allowed: bool,
    pub reason: String,
    pub current_count: u32,
    pub limit: u32,
    pub time_remaining: Duration,
}

impl CapStatus {
    fn uncapped() -> Self {
        Self {
            allowed: true,
            reason: "no cap rule configured".to_string(),
            current_count: 0,
            limit: 0,
            time_remaining: Duration::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CapRule {
    limit: u32,
    window_secs: u64,
}

pub struct FrequencyCapTracker {
    config: FrequencyConfig,
    counters: DashMap<CounterKey, CounterBucket>,
}

impl FrequencyCapTracker {
    pub fn new(config: FrequencyConfig) -> Self {
        Self {
            config,
            counters: DashMap::new(),
        }
    }

    /// Read-only cap check, for the inspection API and pre-ranking probes.
    /// Makes no reservation; use [`try_reserve`](Self::try_reserve) on the
    /// serving path.
    pub fn check(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        overrides: &[CampaignCapRule],
    ) -> CapStatus {
        self.check_at(user_id, subject, event_type, overrides, Utc::now())
    }

    /// Atomically admit and count one event if the cap allows it. The
    /// check and the increment happen under a single per-key guard, so
    /// concurrent reservations for the same key admit at most `limit`
    /// events per window.
    pub fn try_reserve(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        overrides: &[CampaignCapRule],
    ) -> CapStatus {
        self.try_reserve_at(user_id, subject, event_type, overrides, Utc::now())
    }

    /// Unconditional atomic upsert for events observed after the fact
    /// (clicks, conversions). Returns the count after this event; N calls
    /// for one key inside one window yield exactly N.
    pub fn record_event(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        overrides: &[CampaignCapRule],
    ) -> u32 {
        self.record_event_at(user_id, subject, event_type, overrides, Utc::now())
    }

    /// Drop buckets whose window has ended. Called from a periodic
    /// maintenance task, never on the serving path.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.counters.len();
        self.counters.retain(|_, bucket| bucket.window_end > now);
        let removed = before - self.counters.len();
        if removed > 0 {
            debug!(removed, "Evicted expired frequency buckets");
        }
        removed
    }

    pub fn active_buckets(&self) -> usize {
        self.counters.len()
    }

    fn check_at(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        overrides: &[CampaignCapRule],
        now: DateTime<Utc>,
    ) -> CapStatus {
        let Some(rule) = self.rule_for(event_type, overrides) else {
            return CapStatus::uncapped();
        };
        let (key, window_end) = self.bucket_for(user_id, subject, event_type, &rule, now);
        let current_count = self.counters.get(&key).map(|b| b.count).unwrap_or(0);
        let allowed = current_count < rule.limit;
        CapStatus {
            allowed,
            reason: if allowed {
                "within limit".to_string()
            } else {
                "limit reached".to_string()
            },
            current_count,
            limit: rule.limit,
            time_remaining: window_end - now,
        }
    }

    fn try_reserve_at(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        overrides: &[CampaignCapRule],
        now: DateTime<Utc>,
    ) -> CapStatus {
        let Some(rule) = self.rule_for(event_type, overrides) else {
            return CapStatus::uncapped();
        };
        let (key, window_end) = self.bucket_for(user_id, subject, event_type, &rule, now);

        // Entry guard: check and increment are one atomic step per key.
        let mut bucket = self
            .counters
            .entry(key)
            .or_insert_with(|| CounterBucket {
                count: 0,
                window_end,
            });
        let allowed = bucket.count < rule.limit;
        if allowed {
            bucket.count += 1;
            metrics::counter!("frequency.reservations", "event" => event_type.as_str())
                .increment(1);
        } else {
            metrics::counter!("frequency.rejections", "event" => event_type.as_str()).increment(1);
        }
        let current_count = bucket.count;
        drop(bucket);

        CapStatus {
            allowed,
            reason: if allowed {
                "reserved".to_string()
            } else {
                "limit reached".to_string()
            },
            current_count,
            limit: rule.limit,
            time_remaining: window_end - now,
        }
    }

    fn record_event_at(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        overrides: &[CampaignCapRule],
        now: DateTime<Utc>,
    ) -> u32 {
        // Uncapped event types still get counted inside a day-long bucket
        // so the inspection API has data to report.
        let rule = self
            .rule_for(event_type, overrides)
            .unwrap_or(CapRule {
                limit: 0,
                window_secs: 86_400,
            });
        let (key, window_end) = self.bucket_for(user_id, subject, event_type, &rule, now);
        let bucket = self
            .counters
            .entry(key)
            .and_modify(|b| b.count += 1)
            .or_insert_with(|| CounterBucket {
                count: 1,
                window_end,
            });
        bucket.count
    }

    /// Campaign overrides take precedence over the engine defaults.
    /// Event types with no rule anywhere are uncapped.
    fn rule_for(&self, event_type: EventType, overrides: &[CampaignCapRule]) -> Option<CapRule> {
        if let Some(rule) = overrides.iter().find(|r| r.event_type == event_type) {
            return Some(CapRule {
                limit: rule.limit,
                window_secs: rule.window_secs,
            });
        }
        match event_type {
            EventType::Impression => Some(CapRule {
                limit: self.config.impression_limit,
                window_secs: self.config.impression_window_secs,
            }),
            EventType::Click => Some(CapRule {
                limit: self.config.click_limit,
                window_secs: self.config.click_window_secs,
            }),
            EventType::Conversion => None,
        }
    }

    fn bucket_for(
        &self,
        user_id: &str,
        subject: CapSubject,
        event_type: EventType,
        rule: &CapRule,
        now: DateTime<Utc>,
    ) -> (CounterKey, DateTime<Utc>) {
        let (window_start, window_end) = window_bounds(now, rule.window_secs);
        (
            CounterKey {
                user_id: user_id.to_string(),
                subject,
                event_type,
                window_start,
            },
            window_end,
        )
    }
}

/// Epoch-aligned bounds of the window containing `now`.
fn window_bounds(now: DateTime<Utc>, window_secs: u64) -> (i64, DateTime<Utc>) {
    let window_secs = window_secs.max(1) as i64;
    let start = now.timestamp() - now.timestamp().rem_euclid(window_secs);
    let end = DateTime::from_timestamp(start + window_secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn tracker() -> FrequencyCapTracker {
        FrequencyCapTracker::new(FrequencyConfig::default())
    }

    fn subject() -> CapSubject {
        CapSubject::Ad(Uuid::from_u128(1))
    }

    #[test]
    fn test_window_bounds_contain_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 13, 45, 12).unwrap();
        let (start, end) = window_bounds(now, 86_400);
        assert!(start <= now.timestamp());
        assert!(end > now);
        assert_eq!(end.timestamp() - start, 86_400);
        // Day-long windows align to midnight UTC.
        assert_eq!(start % 86_400, 0);
    }

    #[test]
    fn test_reserve_allows_until_limit() {
        let t = tracker();
        for expected in 1..=3u32 {
            let status = t.try_reserve("user-1", subject(), EventType::Impression, &[]);
            assert!(status.allowed);
            assert_eq!(status.current_count, expected);
        }
        let status = t.try_reserve("user-1", subject(), EventType::Impression, &[]);
        assert!(!status.allowed);
        assert_eq!(status.current_count, 3);
        assert_eq!(status.limit, 3);
        assert!(status.time_remaining > Duration::zero());
    }

    #[test]
    fn test_check_does_not_consume() {
        let t = tracker();
        for _ in 0..10 {
            assert!(t.check("user-1", subject(), EventType::Impression, &[]).allowed);
        }
        assert_eq!(
            t.check("user-1", subject(), EventType::Impression, &[])
                .current_count,
            0
        );
    }

    #[test]
    fn test_campaign_override_takes_precedence() {
        let t = tracker();
        let overrides = [CampaignCapRule {
            event_type: EventType::Impression,
            limit: 1,
            window_secs: 86_400,
        }];
        assert!(t
            .try_reserve("user-1", subject(), EventType::Impression, &overrides)
            .allowed);
        assert!(!t
            .try_reserve("user-1", subject(), EventType::Impression, &overrides)
            .allowed);
    }

    #[test]
    fn test_keys_do_not_interfere() {
        let t = tracker();
        let other = CapSubject::Ad(Uuid::from_u128(2));
        for _ in 0..3 {
            assert!(t.try_reserve("user-1", subject(), EventType::Impression, &[]).allowed);
        }
        assert!(!t.try_reserve("user-1", subject(), EventType::Impression, &[]).allowed);
        // Different ad, different user: fresh counters.
        assert!(t.try_reserve("user-1", other, EventType::Impression, &[]).allowed);
        assert!(t.try_reserve("user-2", subject(), EventType::Impression, &[]).allowed);
    }

    #[test]
    fn test_window_rollover_resets_count() {
        let t = tracker();
        let day_one = Utc.with_ymd_and_hms(2024, 6, 15, 23, 59, 0).unwrap();
        let day_two = Utc.with_ymd_and_hms(2024, 6, 16, 0, 1, 0).unwrap();
        for _ in 0..3 {
            assert!(t
                .try_reserve_at("user-1", subject(), EventType::Impression, &[], day_one)
                .allowed);
        }
        assert!(!t
            .try_reserve_at("user-1", subject(), EventType::Impression, &[], day_one)
            .allowed);
        // Next window: a fresh bucket.
        let status = t.try_reserve_at("user-1", subject(), EventType::Impression, &[], day_two);
        assert!(status.allowed);
        assert_eq!(status.current_count, 1);
    }

    #[test]
    fn test_record_event_counts_every_call() {
        let t = tracker();
        for expected in 1..=5u32 {
            assert_eq!(
                t.record_event("user-1", subject(), EventType::Click, &[]),
                expected
            );
        }
    }

    #[test]
    fn test_record_event_concurrent_no_lost_updates() {
        let t = Arc::new(tracker());
        let threads = 8;
        let per_thread = 250u32;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        t.record_event("user-1", subject(), EventType::Click, &[]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let final_count = t.record_event("user-1", subject(), EventType::Click, &[]);
        assert_eq!(final_count, threads * per_thread + 1);
    }

    #[test]
    fn test_concurrent_reserve_admits_exactly_limit() {
        let t = Arc::new(tracker());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || {
                    t.try_reserve("user-1", subject(), EventType::Impression, &[])
                        .allowed
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_eviction_reclaims_ended_windows() {
        let t = tracker();
        let past = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        t.record_event_at("user-1", subject(), EventType::Click, &[], past);
        assert_eq!(t.active_buckets(), 1);
        assert_eq!(t.evict_expired(), 1);
        assert_eq!(t.active_buckets(), 0);
    }

    #[test]
    fn test_conversion_uncapped() {
        let t = tracker();
        for _ in 0..50 {
            assert!(t
                .try_reserve("user-1", subject(), EventType::Conversion, &[])
                .allowed);
        }
    }
}
