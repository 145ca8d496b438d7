use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Named topics of the event store. The names are a stable wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    SystemAuditEvent,
    UserLoginAttempt,
    UserLoginAttemptOutcome,
    UserSubjectAccessAttempt,
    UserSubjectAccessAttemptOutcome,
    SubjectRegionDocumentRequest,
    SubjectRegionDocumentResponse,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::SystemAuditEvent,
        Topic::UserLoginAttempt,
        Topic::UserLoginAttemptOutcome,
        Topic::UserSubjectAccessAttempt,
        Topic::UserSubjectAccessAttemptOutcome,
        Topic::SubjectRegionDocumentRequest,
        Topic::SubjectRegionDocumentResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::SystemAuditEvent => "system.audit.event",
            Topic::UserLoginAttempt => "user.login.attempt",
            Topic::UserLoginAttemptOutcome => "user.login.attempt.outcome",
            Topic::UserSubjectAccessAttempt => "user.subject.access.attempt",
            Topic::UserSubjectAccessAttemptOutcome => "user.subject.access.attempt.outcome",
            Topic::SubjectRegionDocumentRequest => "subject.region.document.request",
            Topic::SubjectRegionDocumentResponse => "subject.region.document.response",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == value)
            .ok_or_else(|| UnknownTopic(value.to_string()))
    }
}

/// Geographic partition for subject document lookups.
///
/// Serialized as its ordinal (0-13); ordinal order is the fan-out order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Region {
    AyrshireAndArran,
    Borders,
    DumfriesAndGalloway,
    ForthValley,
    Grampian,
    Highland,
    Lothian,
    Orkney,
    Shetland,
    WesternIsles,
    Fife,
    Tayside,
    GreaterGlasgowAndClyde,
    Lanarkshire,
}

impl Region {
    pub const ALL: [Region; 14] = [
        Region::AyrshireAndArran,
        Region::Borders,
        Region::DumfriesAndGalloway,
        Region::ForthValley,
        Region::Grampian,
        Region::Highland,
        Region::Lothian,
        Region::Orkney,
        Region::Shetland,
        Region::WesternIsles,
        Region::Fife,
        Region::Tayside,
        Region::GreaterGlasgowAndClyde,
        Region::Lanarkshire,
    ];

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Region::ALL.get(ordinal as usize).copied()
    }

    /// Health board area code.
    pub fn code(&self) -> &'static str {
        match self {
            Region::AyrshireAndArran => "S08000015",
            Region::Borders => "S08000016",
            Region::DumfriesAndGalloway => "S08000017",
            Region::ForthValley => "S08000019",
            Region::Grampian => "S08000020",
            Region::Highland => "S08000022",
            Region::Lothian => "S08000024",
            Region::Orkney => "S08000025",
            Region::Shetland => "S08000026",
            Region::WesternIsles => "S08000028",
            Region::Fife => "S08000029",
            Region::Tayside => "S08000030",
            Region::GreaterGlasgowAndClyde => "S08000031",
            Region::Lanarkshire => "S08000032",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Region::AyrshireAndArran => "Ayrshire and Arran",
            Region::Borders => "Borders",
            Region::DumfriesAndGalloway => "Dumfries and Galloway",
            Region::ForthValley => "Forth Valley",
            Region::Grampian => "Grampian",
            Region::Highland => "Highland",
            Region::Lothian => "Lothian",
            Region::Orkney => "Orkney",
            Region::Shetland => "Shetland",
            Region::WesternIsles => "Western Isles",
            Region::Fife => "Fife",
            Region::Tayside => "Tayside",
            Region::GreaterGlasgowAndClyde => "Greater Glasgow and Clyde",
            Region::Lanarkshire => "Lanarkshire",
        }
    }
}

impl From<Region> for u8 {
    fn from(region: Region) -> Self {
        region.ordinal()
    }
}

impl TryFrom<u8> for Region {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Region::from_ordinal(value).ok_or_else(|| format!("region ordinal out of range: {value}"))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Root event: a user tried to log in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    pub user_name: String,
    pub user_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttemptOutcome {
    pub user_name: String,
    pub outcome: bool,
}

/// Audit trail entry. Nothing downstream consumes these beyond observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemAuditEvent {
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_identifier: Option<String>,
    pub audit_event: String,
}

impl SystemAuditEvent {
    pub fn new(user_name: impl Into<String>, audit_event: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            subject_identifier: None,
            audit_event: audit_event.into(),
        }
    }

    pub fn with_subject(
        user_name: impl Into<String>,
        subject_identifier: impl Into<String>,
        audit_event: impl Into<String>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            subject_identifier: Some(subject_identifier.into()),
            audit_event: audit_event.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessAttempt {
    pub user_name: String,
    pub subject_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessAttemptOutcome {
    pub user_name: String,
    pub subject_identifier: String,
    pub outcome: bool,
}

/// One region's slice of a subject document lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRegionDocumentRequest {
    pub subject_identifier: String,
    pub region: Region,
    pub user_name: String,
}

/// Reply to a [`SubjectRegionDocumentRequest`].
///
/// Either `error` is absent and `documents` holds 0-5 entries, or `error`
/// carries a simulated upstream failure and `documents` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRegionDocumentResponse {
    pub subject_identifier: String,
    pub documents: Vec<SubjectRegionDocument>,
    pub user_name: String,
    pub region: Region,
    pub error: Option<String>,
}

impl SubjectRegionDocumentResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRegionDocument {
    #[serde(rename = "documentIdentifier")]
    pub document_identifier: String,
    #[serde(rename = "documentDate")]
    pub document_date: DateTime<Utc>,
    #[serde(rename = "documentCategoryCode")]
    pub category_code: String,
    #[serde(rename = "documentCategory")]
    pub category: String,
    #[serde(rename = "documentSpecialtyCode")]
    pub specialty_code: String,
    #[serde(rename = "documentSpecialty")]
    pub specialty: String,
    pub region: Region,
}

/// Closed set of payloads that travel through the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SystemAudit(SystemAuditEvent),
    LoginAttempt(LoginAttempt),
    LoginAttemptOutcome(LoginAttemptOutcome),
    SubjectAccessAttempt(SubjectAccessAttempt),
    SubjectAccessAttemptOutcome(SubjectAccessAttemptOutcome),
    SubjectRegionDocumentRequest(SubjectRegionDocumentRequest),
    SubjectRegionDocumentResponse(SubjectRegionDocumentResponse),
}

impl Event {
    /// Destination topic for this payload.
    pub fn topic(&self) -> Topic {
        match self {
            Event::SystemAudit(_) => Topic::SystemAuditEvent,
            Event::LoginAttempt(_) => Topic::UserLoginAttempt,
            Event::LoginAttemptOutcome(_) => Topic::UserLoginAttemptOutcome,
            Event::SubjectAccessAttempt(_) => Topic::UserSubjectAccessAttempt,
            Event::SubjectAccessAttemptOutcome(_) => Topic::UserSubjectAccessAttemptOutcome,
            Event::SubjectRegionDocumentRequest(_) => Topic::SubjectRegionDocumentRequest,
            Event::SubjectRegionDocumentResponse(_) => Topic::SubjectRegionDocumentResponse,
        }
    }

    /// Record key used when appending: the acting user name.
    pub fn correlation_key(&self) -> &str {
        match self {
            Event::SystemAudit(event) => &event.user_name,
            Event::LoginAttempt(event) => &event.user_name,
            Event::LoginAttemptOutcome(event) => &event.user_name,
            Event::SubjectAccessAttempt(event) => &event.user_name,
            Event::SubjectAccessAttemptOutcome(event) => &event.user_name,
            Event::SubjectRegionDocumentRequest(event) => &event.user_name,
            Event::SubjectRegionDocumentResponse(event) => &event.user_name,
        }
    }
}

impl From<SystemAuditEvent> for Event {
    fn from(event: SystemAuditEvent) -> Self {
        Event::SystemAudit(event)
    }
}

impl From<LoginAttempt> for Event {
    fn from(event: LoginAttempt) -> Self {
        Event::LoginAttempt(event)
    }
}

impl From<LoginAttemptOutcome> for Event {
    fn from(event: LoginAttemptOutcome) -> Self {
        Event::LoginAttemptOutcome(event)
    }
}

impl From<SubjectAccessAttempt> for Event {
    fn from(event: SubjectAccessAttempt) -> Self {
        Event::SubjectAccessAttempt(event)
    }
}

impl From<SubjectAccessAttemptOutcome> for Event {
    fn from(event: SubjectAccessAttemptOutcome) -> Self {
        Event::SubjectAccessAttemptOutcome(event)
    }
}

impl From<SubjectRegionDocumentRequest> for Event {
    fn from(event: SubjectRegionDocumentRequest) -> Self {
        Event::SubjectRegionDocumentRequest(event)
    }
}

impl From<SubjectRegionDocumentResponse> for Event {
    fn from(event: SubjectRegionDocumentResponse) -> Self {
        Event::SubjectRegionDocumentResponse(event)
    }
}
