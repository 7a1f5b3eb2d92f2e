//! Security/Audit Logger
//!
//! Appends never fail the caller: a store error is reported on the
//! `auth::audit_fallback` tracing target and dropped.

use chrono::Utc;
use std::sync::Arc;

use crate::application::config::AuthConfig;
use crate::domain::entity::audit_record::{AuditRecord, AuditRecordType};
use crate::domain::repository::AuditRepository;
use crate::domain::service::audit_analysis::{
    self, Alert, AuditSummary, FailedLoginAnalysis,
};
use crate::domain::service::suspicious::{self, AuditRules, Severity, SuspiciousPattern};
use crate::domain::value_object::time_range::TimeRange;
use crate::error::AuthResult;

pub struct AuditLogger<R> {
    repo: Arc<R>,
    rules: AuditRules,
    alert_window: chrono::Duration,
    alert_min_severity: Severity,
}

impl<R> AuditLogger<R>
where
    R: AuditRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, config: &AuthConfig) -> Self {
        Self {
            repo,
            rules: config.audit_rules.clone(),
            alert_window: config.alert_window(),
            alert_min_severity: config.alert_min_severity,
        }
    }

    pub async fn log_auth_event(&self, mut record: AuditRecord) {
        record.record_type = AuditRecordType::AuthEvent;
        self.append(record).await;
    }

    pub async fn log_admin_action(&self, mut record: AuditRecord) {
        record.record_type = AuditRecordType::AdminAction;
        self.append(record).await;
    }

    async fn append(&self, record: AuditRecord) {
        if let Err(e) = self.repo.append(&record).await {
            tracing::error!(
                target: "auth::audit_fallback",
                error = %e,
                record = %serde_json::to_string(&record).unwrap_or_default(),
                "Failed to persist audit record"
            );
        }
    }

    pub async fn get_audit_summary(&self, range: &TimeRange) -> AuthResult<AuditSummary> {
        let records = self.repo.find_in_range(range).await?;
        Ok(audit_analysis::summarize(*range, &records))
    }

    /// Every rule over `range`; the off-hours baseline reaches back before it
    pub async fn detect_suspicious_patterns(
        &self,
        range: &TimeRange,
    ) -> AuthResult<Vec<SuspiciousPattern>> {
        let widened = TimeRange::new(range.start() - self.rules.off_hours_lookback, range.end())?;
        let (records, history): (Vec<AuditRecord>, Vec<AuditRecord>) = self
            .repo
            .find_in_range(&widened)
            .await?
            .into_iter()
            .partition(|record| range.contains(record.timestamp));

        Ok(suspicious::detect(&records, &history, &self.rules))
    }

    /// Patterns over the recent alert window at or above the alert severity
    pub async fn check_for_alerts(&self) -> AuthResult<Vec<Alert>> {
        let now = Utc::now();
        let patterns = self
            .detect_suspicious_patterns(&TimeRange::last(self.alert_window, now))
            .await?;
        let alerts = audit_analysis::alerts_from_patterns(patterns, self.alert_min_severity, now);
        if !alerts.is_empty() {
            tracing::warn!(count = alerts.len(), "Security alerts raised");
        }
        Ok(alerts)
    }

    pub async fn get_failed_login_analysis(&self, range: &TimeRange) -> AuthResult<FailedLoginAnalysis> {
        let records = self.repo.find_in_range(range).await?;
        Ok(audit_analysis::analyze_failed_logins(*range, &records))
    }
}
