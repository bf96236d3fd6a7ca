use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

mod validation;

pub use validation::{is_valid_email, is_valid_phone, normalize_email, ValidationError};

use crate::store::{NewDemoRequest, NewWaitlistEntry};

/// Name of the trap field bots tend to fill in.
pub const HONEYPOT_FIELD: &str = "honeypot";

/// What a demo requester says prompted them to get in touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    PlanningAhead,
    RecentLoss,
    OrganizingDocuments,
    EstatePlanning,
    FamilyHistory,
    FinancialPlanning,
    Other,
}

impl Urgency {
    pub const ALL: [Urgency; 7] = [
        Urgency::PlanningAhead,
        Urgency::RecentLoss,
        Urgency::OrganizingDocuments,
        Urgency::EstatePlanning,
        Urgency::FamilyHistory,
        Urgency::FinancialPlanning,
        Urgency::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::PlanningAhead => "planning-ahead",
            Urgency::RecentLoss => "recent-loss",
            Urgency::OrganizingDocuments => "organizing-documents",
            Urgency::EstatePlanning => "estate-planning",
            Urgency::FamilyHistory => "family-history",
            Urgency::FinancialPlanning => "financial-planning",
            Urgency::Other => "other",
        }
    }
}

impl FromStr for Urgency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Urgency::ALL
            .into_iter()
            .find(|u| u.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidUrgency(s.to_string()))
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truthiness of the honeypot field.
///
/// Absent, `null`, `false`, `""` and `0` are clean. Anything else means a bot
/// filled the hidden input.
pub fn is_honeypot_tripped(fields: &Map<String, Value>) -> bool {
    match fields.get(HONEYPOT_FIELD) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map_or(true, |f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// String value of a field. Non-string values count as missing.
fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Decoded waitlist form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaitlistSubmission {
    pub email: Option<String>,
}

impl WaitlistSubmission {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            email: text_field(fields, "email"),
        }
    }

    /// Validate and normalize into a record ready for the store.
    pub fn validate(&self) -> Result<NewWaitlistEntry, ValidationError> {
        let email = self
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| is_valid_email(e))
            .ok_or(ValidationError::EmailRequired)?;
        Ok(NewWaitlistEntry { email })
    }
}

/// Decoded demo request form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemoSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub urgency: Option<String>,
}

impl DemoSubmission {
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            name: text_field(fields, "name"),
            email: text_field(fields, "email"),
            phone: text_field(fields, "phone"),
            urgency: text_field(fields, "urgency"),
        }
    }

    /// Validate and normalize into a record ready for the store.
    ///
    /// Checks run in order and stop at the first failure: presence of every
    /// field, email, phone, urgency.
    pub fn validate(&self) -> Result<NewDemoRequest, ValidationError> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        // Urgency must match an option exactly, so it is not trimmed
        let urgency = self.urgency.as_deref().filter(|s| !s.is_empty());
        let (Some(name), Some(email), Some(phone), Some(urgency)) = (
            present(&self.name),
            present(&self.email),
            present(&self.phone),
            urgency,
        ) else {
            return Err(ValidationError::MissingFields);
        };

        let email = normalize_email(&email);
        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }
        if !is_valid_phone(&phone) {
            return Err(ValidationError::InvalidPhone);
        }
        let urgency: Urgency = urgency.parse()?;

        Ok(NewDemoRequest {
            name,
            email,
            phone,
            urgency,
        })
    }
}
