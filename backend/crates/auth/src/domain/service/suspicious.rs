//! Suspicious pattern rules
//!
//! Each rule is a pure function over a slice of audit records and returns zero or
//! more matches. Rules never look at each other's output.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::domain::entity::audit_record::{AuditAction, AuditRecord};
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    RepeatedFailedLogins,
    ManyDistinctIps,
    OffHoursLogin,
    RepeatedAccessDenials,
    BlacklistedTokenUse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousPattern {
    pub kind: PatternKind,
    pub severity: Severity,
    /// Actor id, or `login:<email>` when the subject was never resolved
    pub subject: String,
    pub count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub description: String,
}

/// Thresholds for every rule
#[derive(Debug, Clone)]
pub struct AuditRules {
    pub failed_login_threshold: usize,
    pub failed_login_high_threshold: usize,
    pub failed_login_window: Duration,
    pub distinct_ip_threshold: usize,
    pub distinct_ip_window: Duration,
    pub off_hours_lookback: Duration,
    pub off_hours_min_history: usize,
    /// Hours of slack on each side of every historically seen login hour
    pub off_hours_band: u32,
    pub denial_threshold: usize,
    pub denial_window: Duration,
}

impl Default for AuditRules {
    fn default() -> Self {
        Self {
            failed_login_threshold: 5,
            failed_login_high_threshold: 10,
            failed_login_window: Duration::minutes(10),
            distinct_ip_threshold: 5,
            distinct_ip_window: Duration::hours(1),
            off_hours_lookback: Duration::days(30),
            off_hours_min_history: 5,
            off_hours_band: 1,
            denial_threshold: 10,
            denial_window: Duration::minutes(10),
        }
    }
}

/// Run every rule. `history` feeds the off-hours baseline and may overlap `records`.
pub fn detect(
    records: &[AuditRecord],
    history: &[AuditRecord],
    rules: &AuditRules,
) -> Vec<SuspiciousPattern> {
    let mut patterns = Vec::new();
    patterns.extend(repeated_failed_logins(records, rules));
    patterns.extend(many_distinct_ips(records, rules));
    patterns.extend(off_hours_logins(records, history, rules));
    patterns.extend(repeated_access_denials(records, rules));
    patterns.extend(blacklisted_token_use(records));
    patterns.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
    });
    patterns
}

/// Provider outages are not held against the subject
pub fn is_failed_login(record: &AuditRecord) -> bool {
    record.action == AuditAction::Login
        && !record.success
        && record.error_message.as_deref() != Some(AuthError::ProviderUnreachable.code())
}

pub fn is_access_denial(record: &AuditRecord) -> bool {
    record.action == AuditAction::Authorize
        && !record.success
        && matches!(
            record.error_message.as_deref(),
            Some(code) if code == AuthError::InsufficientRole.code()
                || code == AuthError::InsufficientPermission.code()
        )
}

pub fn is_blacklisted_use(record: &AuditRecord) -> bool {
    !record.success && record.error_message.as_deref() == Some(AuthError::Blacklisted.code())
}

/// Timestamps grouped by subject key, each list sorted ascending
fn timestamps_by_subject<'a>(
    records: impl Iterator<Item = &'a AuditRecord>,
) -> BTreeMap<String, Vec<DateTime<Utc>>> {
    let mut grouped: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    for record in records {
        if let Some(key) = record.subject_key() {
            grouped.entry(key.to_string()).or_default().push(record.timestamp);
        }
    }
    for stamps in grouped.values_mut() {
        stamps.sort_unstable();
    }
    grouped
}

/// Densest rolling window over sorted timestamps: (count, first, last)
pub fn densest_window(
    sorted: &[DateTime<Utc>],
    window: Duration,
) -> Option<(usize, DateTime<Utc>, DateTime<Utc>)> {
    let mut best: Option<(usize, DateTime<Utc>, DateTime<Utc>)> = None;
    let mut start = 0;
    for end in 0..sorted.len() {
        while sorted[end] - sorted[start] > window {
            start += 1;
        }
        let count = end - start + 1;
        if best.is_none_or(|(c, _, _)| count > c) {
            best = Some((count, sorted[start], sorted[end]));
        }
    }
    best
}

pub fn repeated_failed_logins(records: &[AuditRecord], rules: &AuditRules) -> Vec<SuspiciousPattern> {
    timestamps_by_subject(records.iter().filter(|r| is_failed_login(r)))
        .into_iter()
        .filter_map(|(subject, stamps)| {
            let (count, first, last) = densest_window(&stamps, rules.failed_login_window)?;
            if count < rules.failed_login_threshold {
                return None;
            }
            let severity = if count >= rules.failed_login_high_threshold {
                Severity::High
            } else {
                Severity::Medium
            };
            Some(SuspiciousPattern {
                kind: PatternKind::RepeatedFailedLogins,
                severity,
                description: format!(
                    "{count} failed logins within {} minutes",
                    rules.failed_login_window.num_minutes()
                ),
                subject,
                count,
                first_seen: first,
                last_seen: last,
            })
        })
        .collect()
}

pub fn many_distinct_ips(records: &[AuditRecord], rules: &AuditRules) -> Vec<SuspiciousPattern> {
    let mut by_subject: BTreeMap<String, Vec<(DateTime<Utc>, &str)>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.action == AuditAction::Login) {
        if let (Some(key), Some(ip)) = (record.subject_key(), record.ip_address.as_deref()) {
            by_subject
                .entry(key.to_string())
                .or_default()
                .push((record.timestamp, ip));
        }
    }

    let mut patterns = Vec::new();
    for (subject, mut events) in by_subject {
        events.sort_unstable_by_key(|(at, _)| *at);

        let mut best: Option<(usize, DateTime<Utc>, DateTime<Utc>)> = None;
        for (i, (first, _)) in events.iter().enumerate() {
            let mut ips = HashSet::new();
            let mut last = *first;
            let in_window = events[i..]
                .iter()
                .take_while(|(at, _)| *at - *first <= rules.distinct_ip_window);
            for (at, ip) in in_window {
                ips.insert(*ip);
                last = *at;
            }
            if best.is_none_or(|(c, _, _)| ips.len() > c) {
                best = Some((ips.len(), *first, last));
            }
        }

        if let Some((count, first, last)) =
            best.filter(|(count, _, _)| *count >= rules.distinct_ip_threshold)
        {
            patterns.push(SuspiciousPattern {
                kind: PatternKind::ManyDistinctIps,
                severity: Severity::Medium,
                description: format!(
                    "logins from {count} distinct IPs within {} minutes",
                    rules.distinct_ip_window.num_minutes()
                ),
                subject,
                count,
                first_seen: first,
                last_seen: last,
            });
        }
    }
    patterns
}

/// Hours of day (UTC) considered normal for a subject, given its past successful logins
fn usual_hours(history: &[DateTime<Utc>], band: u32) -> [bool; 24] {
    let band = band.min(12);
    let mut hours = [false; 24];
    for at in history {
        let hour = at.hour();
        for offset in 0..=band {
            hours[((hour + offset) % 24) as usize] = true;
            hours[((hour + 24 - offset) % 24) as usize] = true;
        }
    }
    hours
}

pub fn off_hours_logins(
    records: &[AuditRecord],
    history: &[AuditRecord],
    rules: &AuditRules,
) -> Vec<SuspiciousPattern> {
    let successful = |r: &&AuditRecord| r.action == AuditAction::Login && r.success;
    let recent = timestamps_by_subject(records.iter().filter(successful));
    let past = timestamps_by_subject(history.iter().filter(successful));

    let mut patterns = Vec::new();
    for (subject, logins) in recent {
        let Some(window_start) = logins.first().copied() else {
            continue;
        };
        let baseline: Vec<DateTime<Utc>> = past
            .get(&subject)
            .map(|stamps| {
                stamps
                    .iter()
                    .copied()
                    .filter(|at| *at < window_start && window_start - *at <= rules.off_hours_lookback)
                    .collect()
            })
            .unwrap_or_default();
        if baseline.len() < rules.off_hours_min_history {
            continue;
        }

        let usual = usual_hours(&baseline, rules.off_hours_band);
        let unusual: Vec<DateTime<Utc>> = logins
            .into_iter()
            .filter(|at| !usual[at.hour() as usize])
            .collect();
        if let (Some(first), Some(last)) = (unusual.first(), unusual.last()) {
            patterns.push(SuspiciousPattern {
                kind: PatternKind::OffHoursLogin,
                severity: Severity::Low,
                description: format!(
                    "{} logins outside the usual hours seen over {} prior logins",
                    unusual.len(),
                    baseline.len()
                ),
                subject,
                count: unusual.len(),
                first_seen: *first,
                last_seen: *last,
            });
        }
    }
    patterns
}

pub fn repeated_access_denials(records: &[AuditRecord], rules: &AuditRules) -> Vec<SuspiciousPattern> {
    timestamps_by_subject(records.iter().filter(|r| is_access_denial(r)))
        .into_iter()
        .filter_map(|(subject, stamps)| {
            let (count, first, last) = densest_window(&stamps, rules.denial_window)?;
            (count >= rules.denial_threshold).then(|| SuspiciousPattern {
                kind: PatternKind::RepeatedAccessDenials,
                severity: Severity::Medium,
                description: format!(
                    "{count} access denials within {} minutes",
                    rules.denial_window.num_minutes()
                ),
                subject,
                count,
                first_seen: first,
                last_seen: last,
            })
        })
        .collect()
}

pub fn blacklisted_token_use(records: &[AuditRecord]) -> Vec<SuspiciousPattern> {
    timestamps_by_subject(records.iter().filter(|r| is_blacklisted_use(r)))
        .into_iter()
        .filter_map(|(subject, stamps)| {
            let (first, last) = (*stamps.first()?, *stamps.last()?);
            Some(SuspiciousPattern {
                kind: PatternKind::BlacklistedTokenUse,
                severity: Severity::High,
                description: format!("{} attempts with a revoked token", stamps.len()),
                subject,
                count: stamps.len(),
                first_seen: first,
                last_seen: last,
            })
        })
        .collect()
}
