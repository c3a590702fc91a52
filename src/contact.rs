//! Contact capture and lead submission.
//!
//! The contact record is remembered between sessions only to prefill the
//! form. Submission is the one asynchronous step: it hands the lead to an
//! intake collaborator and never touches the caller's form state.

use crate::storage::Storage;
use crate::types::{Estimate, EstimateRequest};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

pub const CONTACT_STORAGE_KEY: &str = "ev-calculator-contact";
pub const MIN_PHONE_DIGITS: usize = 9;
pub const PAYLOAD_VERSION: &str = "v1";
pub const CURRENCY: &str = "AUD";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactDetails {
    #[serde(alias = "first_name")]
    pub first_name: String,
    #[serde(alias = "last_name")]
    pub last_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    FirstName,
    LastName,
    Phone,
    Email,
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContactField::FirstName => "first name",
            ContactField::LastName => "last name",
            ContactField::Phone => "phone",
            ContactField::Email => "email",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    #[error("{0} is required")]
    Required(ContactField),

    #[error("email address must look like name@example.com")]
    InvalidEmail,

    #[error("phone number must contain at least {} digits", MIN_PHONE_DIGITS)]
    InvalidPhone,
}

impl ContactError {
    pub fn field(&self) -> ContactField {
        match self {
            ContactError::Required(field) => *field,
            ContactError::InvalidEmail => ContactField::Email,
            ContactError::InvalidPhone => ContactField::Phone,
        }
    }
}

pub fn validate_field(field: ContactField, value: &str) -> Result<(), ContactError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ContactError::Required(field));
    }
    match field {
        ContactField::Email if !EMAIL_RE.is_match(value) => Err(ContactError::InvalidEmail),
        ContactField::Phone if !is_phone_like(value) => Err(ContactError::InvalidPhone),
        _ => Ok(()),
    }
}

// Digits plus the punctuation people type into phone numbers.
fn is_phone_like(value: &str) -> bool {
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    allowed && value.chars().filter(|c| c.is_ascii_digit()).count() >= MIN_PHONE_DIGITS
}

impl ContactDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn value(&self, field: ContactField) -> &str {
        match field {
            ContactField::FirstName => &self.first_name,
            ContactField::LastName => &self.last_name,
            ContactField::Phone => &self.phone,
            ContactField::Email => &self.email,
        }
    }

    /// Every failing field, in form order. Empty when the details are valid.
    pub fn validate(&self) -> Vec<ContactError> {
        [
            ContactField::FirstName,
            ContactField::LastName,
            ContactField::Phone,
            ContactField::Email,
        ]
        .into_iter()
        .filter_map(|field| validate_field(field, self.value(field)).err())
        .collect()
    }
}

/// Saved details for prefill; `None` when absent or unreadable.
pub fn load_contact<S: Storage>(storage: &S) -> Option<ContactDetails> {
    let stored = match storage.get(CONTACT_STORAGE_KEY) {
        Ok(stored) => stored?,
        Err(e) => {
            warn!(error = %e, "failed to read saved contact details");
            return None;
        }
    };
    match serde_json::from_str(&stored) {
        Ok(details) => Some(details),
        Err(e) => {
            warn!(error = %e, "saved contact details are malformed");
            None
        }
    }
}

pub fn save_contact<S: Storage>(storage: &S, details: &ContactDetails) {
    let result = serde_json::to_string(details)
        .map_err(|e| e.to_string())
        .and_then(|json| {
            storage
                .set(CONTACT_STORAGE_KEY, &json)
                .map_err(|e| e.to_string())
        });
    if let Err(e) = result {
        warn!(error = %e, "failed to save contact details");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadMeta {
    pub currency: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadPayload {
    pub user: ContactDetails,
    pub calculator: EstimateRequest,
    pub estimate: Estimate,
    pub meta: LeadMeta,
}

impl LeadPayload {
    pub fn new(user: ContactDetails, calculator: EstimateRequest, estimate: Estimate) -> Self {
        Self {
            user,
            calculator,
            estimate,
            meta: LeadMeta {
                currency: CURRENCY.to_string(),
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                version: PAYLOAD_VERSION.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("lead intake failed: {0}")]
pub struct IntakeError(pub String);

/// Whoever receives submitted leads.
#[async_trait]
pub trait LeadIntake: Send + Sync {
    async fn submit(&self, payload: &LeadPayload) -> Result<(), IntakeError>;
}

/// Stands in for a real intake service: waits, logs the payload, accepts.
#[derive(Debug, Clone)]
pub struct SimulatedIntake {
    delay: Duration,
}

impl SimulatedIntake {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl LeadIntake for SimulatedIntake {
    async fn submit(&self, payload: &LeadPayload) -> Result<(), IntakeError> {
        tokio::time::sleep(self.delay).await;
        let json = serde_json::to_string(payload).map_err(|e| IntakeError(e.to_string()))?;
        info!(payload = %json, "lead submitted");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("contact details are invalid: {}", join_errors(.0))]
    Invalid(Vec<ContactError>),

    #[error("select a site type before requesting a price breakdown")]
    MissingSiteType,

    #[error(transparent)]
    Intake(#[from] IntakeError),
}

fn join_errors(errors: &[ContactError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate, hand the lead to `intake`, and remember the contact details
/// once it is accepted. On any error nothing is persisted.
pub async fn submit_lead<I, S>(
    intake: &I,
    storage: &S,
    contact: &ContactDetails,
    request: &EstimateRequest,
    estimate: &Estimate,
) -> Result<LeadPayload, SubmitError>
where
    I: LeadIntake + ?Sized,
    S: Storage,
{
    let errors = contact.validate();
    if !errors.is_empty() {
        return Err(SubmitError::Invalid(errors));
    }
    if request.site_type.is_none() {
        return Err(SubmitError::MissingSiteType);
    }

    let payload = LeadPayload::new(contact.clone(), request.clone(), *estimate);
    intake.submit(&payload).await?;
    save_contact(storage, contact);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::compute_estimate;
    use crate::storage::MemoryStorage;
    use crate::types::{Assumptions, SiteType};

    struct RejectingIntake;

    #[async_trait]
    impl LeadIntake for RejectingIntake {
        async fn submit(&self, _payload: &LeadPayload) -> Result<(), IntakeError> {
            Err(IntakeError("service unavailable".to_string()))
        }
    }

    fn contact() -> ContactDetails {
        ContactDetails {
            first_name: "Jo".to_string(),
            last_name: "Citizen".to_string(),
            phone: "+61 412 345 678".to_string(),
            email: "jo@example.com".to_string(),
        }
    }

    fn request() -> EstimateRequest {
        EstimateRequest {
            site_type: Some(SiteType::House),
            ac_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn validation_rules() {
        assert!(contact().validate().is_empty());
        assert_eq!(
            validate_field(ContactField::FirstName, "  "),
            Err(ContactError::Required(ContactField::FirstName))
        );
        assert_eq!(
            validate_field(ContactField::Email, "jo.example.com"),
            Err(ContactError::InvalidEmail)
        );
        assert_eq!(validate_field(ContactField::Email, "jo@example"), Err(ContactError::InvalidEmail));
        assert_eq!(validate_field(ContactField::Phone, "+61 4"), Err(ContactError::InvalidPhone));
        assert_eq!(
            validate_field(ContactField::Phone, "call 0412345678"),
            Err(ContactError::InvalidPhone)
        );
        assert_eq!(validate_field(ContactField::Phone, "0412 345 678"), Ok(()));
    }

    #[test]
    fn validate_reports_every_failing_field() {
        let details = ContactDetails {
            email: "nope".to_string(),
            ..Default::default()
        };
        let fields: Vec<ContactField> = details.validate().iter().map(|e| e.field()).collect();
        assert_eq!(
            fields,
            [
                ContactField::FirstName,
                ContactField::LastName,
                ContactField::Phone,
                ContactField::Email
            ]
        );
    }

    #[test]
    fn contact_record_round_trips_and_accepts_snake_case() {
        let storage = MemoryStorage::new();
        assert_eq!(load_contact(&storage), None);

        save_contact(&storage, &contact());
        assert_eq!(load_contact(&storage), Some(contact()));

        storage
            .set(
                CONTACT_STORAGE_KEY,
                r#"{"first_name":"A","last_name":"B","phone":"1","email":"e"}"#,
            )
            .unwrap();
        assert_eq!(load_contact(&storage).unwrap().first_name, "A");

        storage.set(CONTACT_STORAGE_KEY, "garbage").unwrap();
        assert_eq!(load_contact(&storage), None);
    }

    #[test]
    fn payload_shape() {
        let estimate = compute_estimate(&request(), &Assumptions::default());
        let payload = LeadPayload::new(contact(), request(), estimate);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["user"]["firstName"], "Jo");
        assert_eq!(json["calculator"]["siteType"], "House");
        assert_eq!(json["calculator"]["runFactor"], 1.0);
        assert_eq!(json["estimate"]["effectiveRunM"], 20);
        assert_eq!(json["meta"]["currency"], "AUD");
        assert_eq!(json["meta"]["version"], "v1");
        let ts = json["meta"]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[tokio::test]
    async fn successful_submission_saves_contact() {
        let storage = MemoryStorage::new();
        let estimate = compute_estimate(&request(), &Assumptions::default());
        let intake = SimulatedIntake::new(Duration::from_millis(1));

        let payload = submit_lead(&intake, &storage, &contact(), &request(), &estimate)
            .await
            .unwrap();
        assert_eq!(payload.estimate, estimate);
        assert_eq!(load_contact(&storage), Some(contact()));
    }

    #[tokio::test]
    async fn rejected_submission_persists_nothing() {
        let storage = MemoryStorage::new();
        let estimate = compute_estimate(&request(), &Assumptions::default());
        let form = contact();

        let err = submit_lead(&RejectingIntake, &storage, &form, &request(), &estimate)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Intake(_)));
        assert!(!storage.contains(CONTACT_STORAGE_KEY));
        assert_eq!(form, contact());
    }

    #[tokio::test]
    async fn submission_requires_valid_details_and_site() {
        let storage = MemoryStorage::new();
        let intake = SimulatedIntake::new(Duration::ZERO);
        let estimate = Estimate::default();

        let bad = ContactDetails {
            email: "x".to_string(),
            ..contact()
        };
        let err = submit_lead(&intake, &storage, &bad, &request(), &estimate)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(ref e) if e == &[ContactError::InvalidEmail]));

        let no_site = EstimateRequest::default();
        let err = submit_lead(&intake, &storage, &contact(), &no_site, &estimate)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::MissingSiteType));
        assert!(!storage.contains(CONTACT_STORAGE_KEY));
    }
}
