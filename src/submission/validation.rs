use std::fmt;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LABEL_LEN: usize = 63;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Validation errors for lead-capture submissions.
///
/// `Display` is the message returned to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Waitlist email missing or malformed
    EmailRequired,
    /// A demo request field is missing or blank
    MissingFields,
    InvalidEmail,
    InvalidPhone,
    InvalidUrgency(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmailRequired => write!(f, "A valid email is required."),
            ValidationError::MissingFields => write!(f, "All fields are required."),
            ValidationError::InvalidEmail => {
                write!(f, "Please provide a valid email address.")
            }
            ValidationError::InvalidPhone => write!(f, "Please provide a valid phone number."),
            ValidationError::InvalidUrgency(_) => {
                write!(f, "Please select a valid option for your situation.")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Emails are stored trimmed and lower-cased so uniqueness is case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates email address format.
///
/// Valid addresses:
/// - Exactly one `@`, at most 254 characters
/// - Local part: 1-64 of `[A-Za-z0-9._%+-]`, no leading/trailing/consecutive dots
/// - Domain: two or more dot-separated labels of `[A-Za-z0-9-]`, no label
///   starting or ending with `-`
/// - Top-level label alphabetic, at least two characters
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    is_valid_local_part(local) && is_valid_domain(domain)
}

fn is_valid_local_part(local: &str) -> bool {
    if local.is_empty() || local.len() > MAX_LOCAL_PART_LEN {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'))
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_DOMAIN_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    // `labels` has at least two entries here
    let tld = labels[labels.len() - 1];
    labels_ok && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

/// Validates a phone number by its digits only.
///
/// Formatting characters (spaces, dashes, parentheses, a leading `+`) are
/// ignored; 7 to 15 digits must remain.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@example.co.uk"));
        assert!(is_valid_email("user+tag@sub-domain.example.org"));
        assert!(is_valid_email("o_brien%ops@example.io"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("a@b@example.com"));
        assert!(!is_valid_email(".user@example.com"));
        assert!(!is_valid_email("user.@example.com"));
        assert!(!is_valid_email("us..er@example.com"));
        assert!(!is_valid_email("user@-example.com"));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email("user@example.c"));
        assert!(!is_valid_email("user@example.c0m"));
        assert!(!is_valid_email("us er@example.com"));
    }

    #[test]
    fn test_overlong_email_rejected() {
        let local = "a".repeat(65);
        assert!(!is_valid_email(&format!("{}@example.com", local)));

        let domain = format!("{}.com", "b".repeat(250));
        assert!(!is_valid_email(&format!("a@{}", domain)));
    }

    #[test]
    fn test_valid_phones() {
        assert!(is_valid_phone("555-0100"));
        assert!(is_valid_phone("(555) 123-4567"));
        assert!(is_valid_phone("+44 20 7946 0958"));
        assert!(is_valid_phone("123456789012345"));
    }

    #[test]
    fn test_invalid_phones() {
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("555-010"));
        assert!(!is_valid_phone("call me"));
        assert!(!is_valid_phone("1234567890123456"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ValidationError::EmailRequired.to_string(),
            "A valid email is required."
        );
        assert_eq!(
            ValidationError::InvalidUrgency("soon".to_string()).to_string(),
            "Please select a valid option for your situation."
        );
    }
}
