//! Domain services.
//!
//! Every service takes the caller's [`SessionContext`] explicitly, checks it
//! against the Role Gate, then reads and commits through the shared
//! [`DocumentStore`]. Writes are conditional on the revision read, and a
//! failed condition re-runs the whole read-check-commit cycle under the
//! configured [`RetryPolicy`].
//!
//! [`SessionContext`]: talkboard_core::session::SessionContext

pub mod attendance;
pub mod catalog;
pub mod certificates;
pub mod ledger;
pub mod reports;
pub mod users;

pub use attendance::AttendanceTracker;
pub use catalog::TalkCatalog;
pub use certificates::{CertificateSigner, CertificateValidator};
pub use ledger::RegistrationLedger;
pub use reports::ReportService;
pub use users::UserAdmin;

use std::sync::Arc;
use talkboard_auth::LoginFlow;
use talkboard_core::document_store::{DocumentStore, StoreError};
use talkboard_core::environment::Clock;
use talkboard_core::error::DomainError;
use talkboard_runtime::retry::{RetryPolicy, Retryable};
use thiserror::Error;

/// Failure of one read-check-commit attempt.
///
/// Store errors stay raw so the retry loop can tell conflicts from
/// transient failures; everything else is already a final answer.
#[derive(Debug, Error)]
pub(crate) enum TxError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl Retryable for TxError {
    fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            Self::Domain(_) => None,
        }
    }
}

impl From<TxError> for DomainError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Store(e) => e.into(),
            TxError::Domain(e) => e,
        }
    }
}

/// Every service, wired over one store.
#[derive(Clone)]
pub struct Services {
    /// Registration ledger.
    pub ledger: RegistrationLedger,
    /// Talk catalog.
    pub catalog: TalkCatalog,
    /// Attendance tracker.
    pub attendance: AttendanceTracker,
    /// Certificate validator.
    pub certificates: CertificateValidator,
    /// Reports.
    pub reports: ReportService,
    /// User administration.
    pub users: UserAdmin,
}

impl Services {
    /// Build every service over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        signer: CertificateSigner,
        login: LoginFlow,
    ) -> Self {
        let ledger = RegistrationLedger::new(store.clone(), clock.clone(), retry.clone());
        let certificates =
            CertificateValidator::new(store.clone(), clock.clone(), retry.clone(), signer);

        Self {
            catalog: TalkCatalog::new(store.clone(), clock.clone(), retry.clone(), ledger.clone()),
            attendance: AttendanceTracker::new(store.clone(), clock.clone(), retry.clone()),
            reports: ReportService::new(store.clone(), retry.clone()),
            users: UserAdmin::new(store, clock, retry, login),
            certificates,
            ledger,
        }
    }
}
