//! Aggregations for the admin security dashboard

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use super::suspicious::{PatternKind, Severity, SuspiciousPattern, is_access_denial, is_blacklisted_use, is_failed_login};
use crate::domain::entity::audit_record::{AuditRecord, AuditRecordType};
use crate::domain::value_object::time_range::TimeRange;

#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub range: TimeRange,
    pub total: usize,
    pub auth_events: usize,
    pub admin_actions: usize,
    pub successes: usize,
    pub failures: usize,
    pub failed_logins: usize,
    pub access_denials: usize,
    pub blacklisted_attempts: usize,
    pub unique_actors: usize,
    pub by_action: BTreeMap<String, usize>,
}

pub fn summarize(range: TimeRange, records: &[AuditRecord]) -> AuditSummary {
    let mut by_action: BTreeMap<String, usize> = BTreeMap::new();
    let mut actors = HashSet::new();
    let mut summary = AuditSummary {
        range,
        total: records.len(),
        auth_events: 0,
        admin_actions: 0,
        successes: 0,
        failures: 0,
        failed_logins: 0,
        access_denials: 0,
        blacklisted_attempts: 0,
        unique_actors: 0,
        by_action: BTreeMap::new(),
    };

    for record in records {
        match record.record_type {
            AuditRecordType::AuthEvent => summary.auth_events += 1,
            AuditRecordType::AdminAction => summary.admin_actions += 1,
        }
        if record.success {
            summary.successes += 1;
        } else {
            summary.failures += 1;
        }
        summary.failed_logins += usize::from(is_failed_login(record));
        summary.access_denials += usize::from(is_access_denial(record));
        summary.blacklisted_attempts += usize::from(is_blacklisted_use(record));
        *by_action.entry(record.action.code().to_string()).or_default() += 1;
        if let Some(actor) = &record.actor_id {
            actors.insert(actor.as_str());
        }
    }

    summary.unique_actors = actors.len();
    summary.by_action = by_action;
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountEntry {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedLoginAnalysis {
    pub range: TimeRange,
    pub total: usize,
    /// Most affected subjects first
    pub by_subject: Vec<CountEntry>,
    pub by_ip: Vec<CountEntry>,
    pub by_reason: Vec<CountEntry>,
    /// Failures per UTC hour of day
    pub by_hour: [usize; 24],
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(key, count)| CountEntry { key, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}

pub fn analyze_failed_logins(range: TimeRange, records: &[AuditRecord]) -> FailedLoginAnalysis {
    let mut by_subject = BTreeMap::new();
    let mut by_ip = BTreeMap::new();
    let mut by_reason = BTreeMap::new();
    let mut by_hour = [0usize; 24];
    let mut total = 0;

    for record in records.iter().filter(|r| is_failed_login(r)) {
        total += 1;
        by_hour[record.timestamp.hour() as usize] += 1;
        let subject = record.subject_key().unwrap_or("unknown").to_string();
        *by_subject.entry(subject).or_insert(0) += 1;
        let ip = record.ip_address.clone().unwrap_or_else(|| "unknown".into());
        *by_ip.entry(ip).or_insert(0) += 1;
        let reason = record.error_message.clone().unwrap_or_else(|| "unknown".into());
        *by_reason.entry(reason).or_insert(0) += 1;
    }

    FailedLoginAnalysis {
        range,
        total,
        by_subject: ranked(by_subject),
        by_ip: ranked(by_ip),
        by_reason: ranked(by_reason),
        by_hour,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: PatternKind,
    pub severity: Severity,
    pub subject: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Patterns at or above `min_severity` become alerts
pub fn alerts_from_patterns(
    patterns: Vec<SuspiciousPattern>,
    min_severity: Severity,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    patterns
        .into_iter()
        .filter(|p| p.severity >= min_severity)
        .map(|p| Alert {
            kind: p.kind,
            severity: p.severity,
            message: format!("{}: {}", p.subject, p.description),
            subject: p.subject,
            raised_at: now,
        })
        .collect()
}
