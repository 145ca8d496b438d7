use crate::core::event::{LoginAttempt, SubjectAccessAttempt, SystemAuditEvent};
use crate::core::random::random_digits;
use rand::Rng;

pub const FIRST_NAMES: [&str; 6] = ["Andrew", "David", "John", "Kate", "Brigitte", "Paula"];
pub const SURNAMES: [&str; 6] = ["White", "Brown", "MacDonald", "Green", "Blue", "Pink"];

pub const LOGIN_ATTEMPT_AUDIT: &str = "login attempt";
pub const SUBJECT_ACCESS_ATTEMPT_AUDIT: &str = "user subject access attempt";

const PASSWORD_DIGITS: usize = 8;
const SUBJECT_IDENTIFIER_DIGITS: usize = 10;

/// Lowercased first initial followed by the lowercased surname, e.g. `abrown`.
pub fn user_name(first_name: &str, surname: &str) -> String {
    let initial = first_name.chars().next().map(|c| c.to_ascii_lowercase());
    initial
        .into_iter()
        .chain(surname.chars().map(|c| c.to_ascii_lowercase()))
        .collect()
}

pub fn random_user_name(rng: &mut impl Rng) -> String {
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let surname = SURNAMES[rng.gen_range(0..SURNAMES.len())];
    user_name(first, surname)
}

pub fn build_login_attempt(rng: &mut impl Rng) -> (LoginAttempt, SystemAuditEvent) {
    let user_name = random_user_name(rng);
    let attempt = LoginAttempt {
        user_name: user_name.clone(),
        user_password: random_digits(rng, PASSWORD_DIGITS),
    };
    (attempt, SystemAuditEvent::new(user_name, LOGIN_ATTEMPT_AUDIT))
}

pub fn build_subject_access_attempt(
    rng: &mut impl Rng,
) -> (SubjectAccessAttempt, SystemAuditEvent) {
    let user_name = random_user_name(rng);
    let subject_identifier = random_digits(rng, SUBJECT_IDENTIFIER_DIGITS);
    let audit = SystemAuditEvent::with_subject(
        user_name.clone(),
        subject_identifier.clone(),
        SUBJECT_ACCESS_ATTEMPT_AUDIT,
    );
    let attempt = SubjectAccessAttempt {
        user_name,
        subject_identifier,
    };
    (attempt, audit)
}
