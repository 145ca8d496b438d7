//! JSON payload codec for every event type.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::event::{Event, Topic};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {topic} payload: {source}")]
    EncodeFailed {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {topic} payload: {source}")]
    DecodeFailed {
        topic: Topic,
        #[source]
        source: serde_json::Error,
    },
}

/// Encodes the payload alone; the topic travels out of band.
pub fn encode(event: &Event) -> Result<Vec<u8>, CodecError> {
    let result = match event {
        Event::SystemAudit(inner) => serde_json::to_vec(inner),
        Event::LoginAttempt(inner) => serde_json::to_vec(inner),
        Event::LoginAttemptOutcome(inner) => serde_json::to_vec(inner),
        Event::SubjectAccessAttempt(inner) => serde_json::to_vec(inner),
        Event::SubjectAccessAttemptOutcome(inner) => serde_json::to_vec(inner),
        Event::SubjectRegionDocumentRequest(inner) => serde_json::to_vec(inner),
        Event::SubjectRegionDocumentResponse(inner) => serde_json::to_vec(inner),
    };
    result.map_err(|source| CodecError::EncodeFailed {
        topic: event.topic(),
        source,
    })
}

/// Decodes a payload read from `topic` into the event type that topic carries.
pub fn decode(topic: Topic, payload: &[u8]) -> Result<Event, CodecError> {
    match topic {
        Topic::SystemAuditEvent => parse(topic, payload).map(Event::SystemAudit),
        Topic::UserLoginAttempt => parse(topic, payload).map(Event::LoginAttempt),
        Topic::UserLoginAttemptOutcome => parse(topic, payload).map(Event::LoginAttemptOutcome),
        Topic::UserSubjectAccessAttempt => parse(topic, payload).map(Event::SubjectAccessAttempt),
        Topic::UserSubjectAccessAttemptOutcome => {
            parse(topic, payload).map(Event::SubjectAccessAttemptOutcome)
        }
        Topic::SubjectRegionDocumentRequest => {
            parse(topic, payload).map(Event::SubjectRegionDocumentRequest)
        }
        Topic::SubjectRegionDocumentResponse => {
            parse(topic, payload).map(Event::SubjectRegionDocumentResponse)
        }
    }
}

fn parse<T: DeserializeOwned>(topic: Topic, payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(|source| CodecError::DecodeFailed { topic, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{
        LoginAttempt, LoginAttemptOutcome, Region, SubjectAccessAttempt,
        SubjectAccessAttemptOutcome, SubjectRegionDocument, SubjectRegionDocumentRequest,
        SubjectRegionDocumentResponse, SystemAuditEvent,
    };
    use chrono::{TimeZone, Utc};

    fn samples() -> Vec<Event> {
        let document = SubjectRegionDocument {
            document_identifier: "123456789012".to_string(),
            document_date: Utc.with_ymd_and_hms(2004, 3, 9, 12, 0, 0).unwrap(),
            category_code: "CategoryCode0".to_string(),
            category: "Category0".to_string(),
            specialty_code: "SpecialtyCode0".to_string(),
            specialty: "Specialty0".to_string(),
            region: Region::Lothian,
        };
        vec![
            SystemAuditEvent::new("abrown", "login attempt").into(),
            SystemAuditEvent::with_subject(
                "abrown",
                "1234567890",
                "user subject access attempt failed",
            )
            .into(),
            LoginAttempt {
                user_name: "abrown".to_string(),
                user_password: "12345678".to_string(),
            }
            .into(),
            LoginAttemptOutcome {
                user_name: "abrown".to_string(),
                outcome: true,
            }
            .into(),
            SubjectAccessAttempt {
                user_name: "kwhite".to_string(),
                subject_identifier: "1234567890".to_string(),
            }
            .into(),
            SubjectAccessAttemptOutcome {
                user_name: "kwhite".to_string(),
                subject_identifier: "1234567890".to_string(),
                outcome: false,
            }
            .into(),
            SubjectRegionDocumentRequest {
                subject_identifier: "1234567890".to_string(),
                region: Region::Orkney,
                user_name: "kwhite".to_string(),
            }
            .into(),
            SubjectRegionDocumentResponse {
                subject_identifier: "1234567890".to_string(),
                documents: vec![document],
                user_name: "kwhite".to_string(),
                region: Region::Lothian,
                error: None,
            }
            .into(),
            SubjectRegionDocumentResponse {
                subject_identifier: "1234567890".to_string(),
                documents: Vec::new(),
                user_name: "kwhite".to_string(),
                region: Region::Fife,
                error: Some("http timeout".to_string()),
            }
            .into(),
        ]
    }

    #[test]
    fn decode_inverts_encode_for_every_event_type() {
        for event in samples() {
            let bytes = encode(&event).expect("encode");
            let decoded = decode(event.topic(), &bytes).expect("decode");
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn login_attempt_wire_shape() {
        let event: Event = LoginAttempt {
            user_name: "abrown".to_string(),
            user_password: "12345678".to_string(),
        }
        .into();
        let bytes = encode(&event).expect("encode");
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"userName":"abrown","userPassword":"12345678"}"#
        );
    }

    #[test]
    fn document_uses_prefixed_field_names() {
        let samples = samples();
        let Event::SubjectRegionDocumentResponse(response) = &samples[7] else {
            panic!("expected a document response sample");
        };
        let value = serde_json::to_value(&response.documents[0]).expect("json");
        assert_eq!(value["documentCategoryCode"], "CategoryCode0");
        assert_eq!(value["documentSpecialty"], "Specialty0");
        assert_eq!(value["region"], 6);
    }

    #[test]
    fn malformed_payload_is_decode_failure() {
        let err = decode(Topic::UserLoginAttempt, b"{\"userName\":").unwrap_err();
        assert!(matches!(
            err,
            CodecError::DecodeFailed {
                topic: Topic::UserLoginAttempt,
                ..
            }
        ));
    }

    #[test]
    fn payload_for_wrong_topic_fails() {
        let bytes = br#"{"userName":"abrown","outcome":true}"#;
        assert!(decode(Topic::UserLoginAttempt, bytes).is_err());
        assert!(decode(Topic::UserLoginAttemptOutcome, bytes).is_ok());
    }
}
