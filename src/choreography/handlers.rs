//! Per-step transformations of the event chain.
//!
//! Handlers are pure: randomness comes in through the `rng` argument and the
//! results go back as an [`Emission`] for the publisher.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use tracing::debug;

use crate::core::config::OutcomeConfig;
use crate::core::event::{
    Event, LoginAttempt, LoginAttemptOutcome, Region, SubjectAccessAttempt,
    SubjectAccessAttemptOutcome, SubjectRegionDocument, SubjectRegionDocumentRequest,
    SubjectRegionDocumentResponse, SystemAuditEvent,
};
use crate::core::random::random_digits;

pub const LOGIN_SUCCESSFUL: &str = "login successful";
pub const LOGIN_FAILED: &str = "login failed";
pub const SUBJECT_ACCESS_SUCCESSFUL: &str = "user subject access attempt successful";
pub const SUBJECT_ACCESS_FAILED: &str = "user subject access attempt failed";

/// Failures a region document service may report back.
pub const SIMULATED_UPSTREAM_ERRORS: [&str; 2] = ["http timeout", "system unavailable"];

pub const MAX_DOCUMENTS_PER_RESPONSE: usize = 5;
const DOCUMENT_IDENTIFIER_DIGITS: usize = 12;

/// Inputs shared by every handler invocation.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub outcomes: OutcomeConfig,
    /// Upper bound for synthetic document dates.
    pub started_at: DateTime<Utc>,
}

impl HandlerContext {
    pub fn new(outcomes: OutcomeConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            outcomes,
            started_at,
        }
    }
}

/// What one handler invocation wants published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
    pub outgoing: Vec<Event>,
    pub audit: Vec<SystemAuditEvent>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.audit.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outgoing.len() + self.audit.len()
    }

    /// Outgoing events first, then audit events, in emission order.
    pub fn into_events(self) -> Vec<Event> {
        self.outgoing
            .into_iter()
            .chain(self.audit.into_iter().map(Event::SystemAudit))
            .collect()
    }
}

pub fn handle_login_attempt(
    attempt: &LoginAttempt,
    ctx: &HandlerContext,
    rng: &mut impl Rng,
) -> Emission {
    let outcome = rng.gen_bool(ctx.outcomes.login_success);
    let audit_event = if outcome { LOGIN_SUCCESSFUL } else { LOGIN_FAILED };
    Emission {
        outgoing: vec![LoginAttemptOutcome {
            user_name: attempt.user_name.clone(),
            outcome,
        }
        .into()],
        audit: vec![SystemAuditEvent::new(attempt.user_name.clone(), audit_event)],
    }
}

pub fn handle_subject_access_attempt(
    attempt: &SubjectAccessAttempt,
    ctx: &HandlerContext,
    rng: &mut impl Rng,
) -> Emission {
    let outcome = rng.gen_bool(ctx.outcomes.subject_access_success);
    let audit_event = if outcome {
        SUBJECT_ACCESS_SUCCESSFUL
    } else {
        SUBJECT_ACCESS_FAILED
    };
    Emission {
        outgoing: vec![SubjectAccessAttemptOutcome {
            user_name: attempt.user_name.clone(),
            subject_identifier: attempt.subject_identifier.clone(),
            outcome,
        }
        .into()],
        audit: vec![SystemAuditEvent::with_subject(
            attempt.user_name.clone(),
            attempt.subject_identifier.clone(),
            audit_event,
        )],
    }
}

/// One document request per region for a granted access; nothing otherwise.
pub fn fan_out_subject_access_outcome(outcome: &SubjectAccessAttemptOutcome) -> Emission {
    if !outcome.outcome {
        return Emission::default();
    }
    let outgoing = Region::ALL
        .iter()
        .map(|region| {
            SubjectRegionDocumentRequest {
                subject_identifier: outcome.subject_identifier.clone(),
                region: *region,
                user_name: outcome.user_name.clone(),
            }
            .into()
        })
        .collect();
    Emission {
        outgoing,
        audit: Vec::new(),
    }
}

pub fn respond_to_document_request(
    request: &SubjectRegionDocumentRequest,
    ctx: &HandlerContext,
    rng: &mut impl Rng,
) -> Emission {
    let (documents, error) = if rng.gen_bool(ctx.outcomes.document_success) {
        (
            synthetic_documents(request.region, ctx.started_at, rng),
            None,
        )
    } else {
        let choice = rng.gen_range(0..SIMULATED_UPSTREAM_ERRORS.len());
        (Vec::new(), Some(SIMULATED_UPSTREAM_ERRORS[choice].to_string()))
    };
    Emission {
        outgoing: vec![SubjectRegionDocumentResponse {
            subject_identifier: request.subject_identifier.clone(),
            documents,
            user_name: request.user_name.clone(),
            region: request.region,
            error,
        }
        .into()],
        audit: Vec::new(),
    }
}

/// Terminal step: records the event and emits nothing.
pub fn observe(event: &Event) -> Emission {
    match event {
        Event::SystemAudit(audit) => debug!(
            user_name = %audit.user_name,
            subject_identifier = audit.subject_identifier.as_deref().unwrap_or(""),
            audit_event = %audit.audit_event,
            "audit event observed"
        ),
        Event::SubjectRegionDocumentResponse(response) => debug!(
            user_name = %response.user_name,
            subject_identifier = %response.subject_identifier,
            region = response.region.code(),
            documents = response.documents.len(),
            error = response.error.as_deref().unwrap_or(""),
            "document response observed"
        ),
        other => debug!(
            topic = %other.topic(),
            user_name = other.correlation_key(),
            "event observed"
        ),
    }
    Emission::default()
}

/// Earliest synthetic document date.
pub fn document_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn synthetic_documents(
    region: Region,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Vec<SubjectRegionDocument> {
    let count = rng.gen_range(0..=MAX_DOCUMENTS_PER_RESPONSE);
    (0..count)
        .map(|index| SubjectRegionDocument {
            document_identifier: random_digits(rng, DOCUMENT_IDENTIFIER_DIGITS),
            document_date: random_document_date(now, rng),
            category_code: format!("CategoryCode{index}"),
            category: format!("Category{index}"),
            specialty_code: format!("SpecialtyCode{index}"),
            specialty: format!("Specialty{index}"),
            region,
        })
        .collect()
}

fn random_document_date(now: DateTime<Utc>, rng: &mut impl Rng) -> DateTime<Utc> {
    let start = document_epoch().timestamp();
    let end = now.timestamp();
    if end <= start {
        return document_epoch();
    }
    let secs = rng.gen_range(start..end);
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(document_epoch)
}
