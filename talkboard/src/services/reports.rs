//! Attendance reports.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use talkboard_core::document_store::{Collection, DocumentStore, Query, StoreError};
use talkboard_core::error::DomainError;
use talkboard_core::ids::TalkId;
use talkboard_core::model::{Registration, Talk};
use talkboard_core::records::find;
use talkboard_core::role::Permission;
use talkboard_core::session::SessionContext;
use talkboard_runtime::retry::{RetryPolicy, retry_store};

/// Figures for one talk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TalkReport {
    /// Talk.
    pub talk_id: TalkId,
    /// Title.
    pub title: String,
    /// Date.
    pub date: NaiveDate,
    /// Capacity.
    pub capacity: u32,
    /// Registrations, counted from the registrations themselves.
    pub registered: u32,
    /// Registrations with attendance confirmed.
    pub present: u32,
}

/// Figures across the reported talks.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReportTotals {
    /// Talks in the report.
    pub talks: u32,
    /// Registrations across them.
    pub registrants: u32,
    /// Confirmed attendances across them.
    pub present: u32,
    /// `present / registrants` as a percentage, 0 with no registrants.
    pub attendance_rate: f64,
}

/// A report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    /// Totals.
    pub totals: ReportTotals,
    /// Per talk, soonest first.
    pub talks: Vec<TalkReport>,
}

/// Builds reports.
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl ReportService {
    /// Create a report service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Report over every talk the caller may see figures for.
    ///
    /// Organizers and administrators get every talk, speakers get the talks
    /// they own.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: the caller may not view reports at all
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn report(&self, caller: &SessionContext) -> Result<Report, DomainError> {
        let permissions = caller.permissions();
        if !permissions.can_view_reports && !permissions.can_view_own_roster {
            return Err(DomainError::PermissionDenied {
                permission: Permission::ViewReports,
            });
        }

        let (talks, registrations) = retry_store(&self.retry, "report", || self.load()).await?;

        let mut counts: HashMap<TalkId, (u32, u32)> = HashMap::new();
        for registration in &registrations {
            let entry = counts.entry(registration.talk_id).or_default();
            entry.0 += 1;
            if registration.attended {
                entry.1 += 1;
            }
        }

        let mut rows: Vec<TalkReport> = talks
            .into_iter()
            .filter(|talk| caller.access(talk).can_view_report)
            .map(|talk| {
                let (registered, present) = counts.get(&talk.id).copied().unwrap_or_default();
                TalkReport {
                    talk_id: talk.id,
                    title: talk.title,
                    date: talk.date,
                    capacity: talk.capacity,
                    registered,
                    present,
                }
            })
            .collect();
        rows.sort_by(|a, b| (a.date, &a.title).cmp(&(b.date, &b.title)));

        Ok(Report {
            totals: totals(&rows),
            talks: rows,
        })
    }

    async fn load(&self) -> Result<(Vec<Talk>, Vec<Registration>), StoreError> {
        let talks = find::<Talk>(self.store.as_ref(), Query::new(Collection::Talks)).await?;
        let registrations =
            find::<Registration>(self.store.as_ref(), Query::new(Collection::Registrations)).await?;
        Ok((
            talks.into_iter().map(|t| t.value).collect(),
            registrations.into_iter().map(|r| r.value).collect(),
        ))
    }
}

fn totals(rows: &[TalkReport]) -> ReportTotals {
    let registrants: u32 = rows.iter().map(|r| r.registered).sum();
    let present: u32 = rows.iter().map(|r| r.present).sum();
    let attendance_rate = if registrants == 0 {
        0.0
    } else {
        (f64::from(present) / f64::from(registrants) * 1000.0).round() / 10.0
    };
    ReportTotals {
        talks: u32::try_from(rows.len()).unwrap_or(u32::MAX),
        registrants,
        present,
        attendance_rate,
    }
}
