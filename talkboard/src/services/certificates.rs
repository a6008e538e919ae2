//! Certificate Validator.
//!
//! [`CertificateValidator::validate`] answers whether `(talk, email)` holds a
//! registration with attendance confirmed. It is a read; nothing is stored
//! about issued certificates.
//!
//! Signed tokens bind a certificate to the server secret:
//!
//! ```text
//! base64url(json {talk_id, email, issued_at}) "." base64url(HMAC-SHA256(payload))
//! ```
//!
//! Verifying a token checks the MAC and then validates again, so a token
//! stops verifying as soon as attendance is withdrawn or the registration
//! is cancelled.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use talkboard_core::document_store::{DocumentStore, StoreError};
use talkboard_core::environment::Clock;
use talkboard_core::error::DomainError;
use talkboard_core::ids::{RegistrationId, TalkId};
use talkboard_core::model::{Registration, Talk, normalize_email};
use talkboard_core::records::{fetch, fetch_talk};
use talkboard_core::session::SessionContext;
use talkboard_runtime::retry::{RetryPolicy, retry_store};
use tracing::{debug, info, warn};

const KEY_LENGTH: usize = 32;

/// Why a certificate does not validate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No registration for this talk and email.
    NotRegistered,
    /// Registered, but attendance is not confirmed.
    NotAttended,
}

/// What a valid certificate states.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Certificate {
    /// Talk.
    pub talk_id: TalkId,
    /// Talk title.
    pub talk_title: String,
    /// Talk date.
    pub date: NaiveDate,
    /// Speaker name.
    pub speaker_name: String,
    /// Participant name as registered.
    pub participant_name: String,
    /// Normalized participant email.
    pub participant_email: String,
}

/// Outcome of a validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CertificateCheck {
    /// Whether a certificate may be shown.
    pub valid: bool,
    /// Set when `valid` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    /// Set when `valid` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl CertificateCheck {
    const fn invalid(reason: InvalidReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            certificate: None,
        }
    }

    fn evaluate(talk: &Talk, registration: &Registration) -> Self {
        if !registration.attended {
            return Self::invalid(InvalidReason::NotAttended);
        }
        Self {
            valid: true,
            reason: None,
            certificate: Some(Certificate {
                talk_id: talk.id,
                talk_title: talk.title.clone(),
                date: talk.date,
                speaker_name: talk.speaker.name.clone(),
                participant_name: registration.name.clone(),
                participant_email: registration.email.clone(),
            }),
        }
    }
}

/// A freshly signed certificate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IssuedCertificate {
    /// Opaque token for later verification.
    pub token: String,
    /// When it was signed.
    pub issued_at: DateTime<Utc>,
    /// The certificate it vouches for.
    pub certificate: Certificate,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    talk_id: TalkId,
    email: String,
    issued_at: DateTime<Utc>,
}

/// Signs and checks certificate tokens.
#[derive(Clone)]
pub struct CertificateSigner {
    key: Arc<[u8]>,
}

impl std::fmt::Debug for CertificateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigner").finish_non_exhaustive()
    }
}

impl CertificateSigner {
    /// Signer with a configured secret.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: Arc::from(secret.as_ref()),
        }
    }

    /// Signer with a random per-process key.
    ///
    /// Tokens signed with it stop verifying when the process restarts.
    #[must_use]
    pub fn random() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        warn!("No certificate secret configured; certificate tokens will not survive a restart");
        Self::new(key)
    }

    fn mac(&self) -> Result<Hmac<Sha256>, DomainError> {
        <Hmac<Sha256>>::new_from_slice(&self.key)
            .map_err(|e| DomainError::InternalInconsistency(format!("certificate key rejected: {e}")))
    }

    fn sign(&self, claims: &Claims) -> Result<String, DomainError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| DomainError::InternalInconsistency(format!("certificate claims: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    fn open(&self, token: &str) -> Result<Claims, DomainError> {
        let invalid = || DomainError::validation("certificate token is not valid");

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        serde_json::from_slice(&payload).map_err(|_| invalid())
    }
}

/// Validates, issues and verifies certificates.
#[derive(Clone)]
pub struct CertificateValidator {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    signer: CertificateSigner,
}

impl CertificateValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        signer: CertificateSigner,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            signer,
        }
    }

    /// Whether `email` attended `talk_id`.
    ///
    /// A talk that no longer exists reads as `NotRegistered`.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the store kept failing.
    #[tracing::instrument(skip(self), fields(talk_id = %talk_id))]
    pub async fn validate(&self, talk_id: TalkId, email: &str) -> Result<CertificateCheck, DomainError> {
        let email = normalize_email(email);
        let id = RegistrationId::for_participant(talk_id, &email).to_string();
        let id = id.as_str();

        let (talk, registration) = retry_store(&self.retry, "validate_certificate", || async move {
            let registration = fetch::<Registration>(self.store.as_ref(), id).await?;
            let talk = fetch_talk(self.store.as_ref(), talk_id).await?;
            Ok::<_, StoreError>((talk, registration))
        })
        .await?;

        let check = match (talk, registration) {
            (Some(talk), Some(registration)) => CertificateCheck::evaluate(&talk.value, &registration.value),
            _ => CertificateCheck::invalid(InvalidReason::NotRegistered),
        };
        debug!(valid = check.valid, reason = ?check.reason, "Certificate validated");
        Ok(check)
    }

    /// [`validate`](Self::validate) on behalf of `caller`.
    ///
    /// Anyone may check their own certificate. Checking someone else's needs
    /// roster access to the talk.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: another email without roster access
    /// - `NotFound`: another email, and the talk does not exist
    /// - `StoreUnavailable`: the store kept failing
    pub async fn validate_for(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        email: &str,
    ) -> Result<CertificateCheck, DomainError> {
        self.authorize(caller, talk_id, email).await?;
        self.validate(talk_id, email).await
    }

    /// Sign a token for a certificate that currently validates.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: another email without roster access
    /// - `Validation`: the certificate does not validate
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller), fields(talk_id = %talk_id, user_id = %caller.user_id))]
    pub async fn issue(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        email: &str,
    ) -> Result<IssuedCertificate, DomainError> {
        let check = self.validate_for(caller, talk_id, email).await?;
        let Some(certificate) = check.certificate else {
            let reason = check.reason.unwrap_or(InvalidReason::NotRegistered);
            return Err(DomainError::validation(format!(
                "no certificate to issue: {}",
                match reason {
                    InvalidReason::NotRegistered => "not registered",
                    InvalidReason::NotAttended => "attendance not confirmed",
                }
            )));
        };

        let claims = Claims {
            talk_id,
            email: certificate.participant_email.clone(),
            issued_at: self.clock.now(),
        };
        let token = self.signer.sign(&claims)?;
        info!("Certificate issued");
        Ok(IssuedCertificate {
            token,
            issued_at: claims.issued_at,
            certificate,
        })
    }

    /// Check a token's signature, then validate what it claims.
    ///
    /// # Errors
    ///
    /// - `Validation`: malformed or forged token
    /// - `StoreUnavailable`: the store kept failing
    pub async fn verify(&self, token: &str) -> Result<CertificateCheck, DomainError> {
        let claims = self.signer.open(token).inspect_err(|_| {
            warn!("Rejected certificate token with a bad signature");
        })?;
        self.validate(claims.talk_id, &claims.email).await
    }

    async fn authorize(&self, caller: &SessionContext, talk_id: TalkId, email: &str) -> Result<(), DomainError> {
        if caller.is_self(email) {
            return Ok(());
        }
        let talk = retry_store(&self.retry, "load_talk", || fetch_talk(self.store.as_ref(), talk_id))
            .await?
            .ok_or_else(|| DomainError::talk_not_found(talk_id))?;
        caller.access(&talk.value).require_roster()
    }
}
