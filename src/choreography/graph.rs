//! The event chain as a value: which topic feeds which handler, and where
//! that handler may publish.

use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use super::handlers::{self, Emission, HandlerContext};
use crate::core::event::{Event, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    LoginAttempt,
    SubjectAccessAttempt,
    SubjectAccessFanOut,
    DocumentRequest,
    Observe,
}

impl HandlerKind {
    pub fn name(&self) -> &'static str {
        match self {
            HandlerKind::LoginAttempt => "login_attempt",
            HandlerKind::SubjectAccessAttempt => "subject_access_attempt",
            HandlerKind::SubjectAccessFanOut => "subject_access_fan_out",
            HandlerKind::DocumentRequest => "document_request",
            HandlerKind::Observe => "observe",
        }
    }

    /// Runs the handler. An event of the wrong type produces nothing.
    pub fn apply(&self, event: &Event, ctx: &HandlerContext, rng: &mut impl Rng) -> Emission {
        match (self, event) {
            (HandlerKind::LoginAttempt, Event::LoginAttempt(attempt)) => {
                handlers::handle_login_attempt(attempt, ctx, rng)
            }
            (HandlerKind::SubjectAccessAttempt, Event::SubjectAccessAttempt(attempt)) => {
                handlers::handle_subject_access_attempt(attempt, ctx, rng)
            }
            (HandlerKind::SubjectAccessFanOut, Event::SubjectAccessAttemptOutcome(outcome)) => {
                handlers::fan_out_subject_access_outcome(outcome)
            }
            (HandlerKind::DocumentRequest, Event::SubjectRegionDocumentRequest(request)) => {
                handlers::respond_to_document_request(request, ctx, rng)
            }
            (HandlerKind::Observe, event) => handlers::observe(event),
            (handler, event) => {
                warn!(
                    handler = handler.name(),
                    topic = %event.topic(),
                    "handler does not accept event type"
                );
                Emission::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub topic: Topic,
    pub handler: HandlerKind,
    pub outputs: Vec<Topic>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("topic {0} is routed more than once")]
    DuplicateRoute(Topic),
    #[error("handler {handler} on {topic} emitted undeclared topic {emitted}")]
    UndeclaredOutput {
        topic: Topic,
        handler: &'static str,
        emitted: Topic,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoreographyGraph {
    routes: Vec<Route>,
}

impl ChoreographyGraph {
    pub fn new(routes: Vec<Route>) -> Result<Self, GraphError> {
        let mut seen = HashSet::new();
        for route in &routes {
            if !seen.insert(route.topic) {
                return Err(GraphError::DuplicateRoute(route.topic));
            }
        }
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route_for(&self, topic: Topic) -> Option<&Route> {
        self.routes.iter().find(|route| route.topic == topic)
    }

    pub fn consumed_topics(&self) -> impl Iterator<Item = Topic> + '_ {
        self.routes.iter().map(|route| route.topic)
    }

    /// Checks that everything in `emission` goes to a topic the route declares.
    pub fn check_emission(&self, route: &Route, emission: &Emission) -> Result<(), GraphError> {
        let audit = (!emission.audit.is_empty()).then_some(Topic::SystemAuditEvent);
        for emitted in emission.outgoing.iter().map(Event::topic).chain(audit) {
            if !route.outputs.contains(&emitted) {
                return Err(GraphError::UndeclaredOutput {
                    topic: route.topic,
                    handler: route.handler.name(),
                    emitted,
                });
            }
        }
        Ok(())
    }
}

impl Default for ChoreographyGraph {
    fn default() -> Self {
        let route = |topic, handler, outputs: &[Topic]| Route {
            topic,
            handler,
            outputs: outputs.to_vec(),
        };
        Self {
            routes: vec![
                route(Topic::SystemAuditEvent, HandlerKind::Observe, &[]),
                route(
                    Topic::UserLoginAttempt,
                    HandlerKind::LoginAttempt,
                    &[Topic::UserLoginAttemptOutcome, Topic::SystemAuditEvent],
                ),
                route(Topic::UserLoginAttemptOutcome, HandlerKind::Observe, &[]),
                route(
                    Topic::UserSubjectAccessAttempt,
                    HandlerKind::SubjectAccessAttempt,
                    &[Topic::UserSubjectAccessAttemptOutcome, Topic::SystemAuditEvent],
                ),
                route(
                    Topic::UserSubjectAccessAttemptOutcome,
                    HandlerKind::SubjectAccessFanOut,
                    &[Topic::SubjectRegionDocumentRequest],
                ),
                route(
                    Topic::SubjectRegionDocumentRequest,
                    HandlerKind::DocumentRequest,
                    &[Topic::SubjectRegionDocumentResponse],
                ),
                route(Topic::SubjectRegionDocumentResponse, HandlerKind::Observe, &[]),
            ],
        }
    }
}

impl fmt::Display for ChoreographyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for route in &self.routes {
            let outputs = if route.outputs.is_empty() {
                "(terminal)".to_string()
            } else {
                route
                    .outputs
                    .iter()
                    .map(Topic::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            writeln!(f, "{} -> {} -> {}", route.topic, route.handler.name(), outputs)?;
        }
        Ok(())
    }
}
