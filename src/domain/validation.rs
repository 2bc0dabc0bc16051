//! Intake form checks run before a visit is recorded

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Age, VisitDraft};

/// Chilean national id: 7-8 digits, dash, check digit or K
static RUT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{7,8}-[\dkK]$").expect("valid RUT pattern"));

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8,12}$").expect("valid phone pattern"));

/// Reasons an intake form is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("RUT inválido")]
    InvalidRut,

    #[error("Edad inválida")]
    InvalidAge,

    #[error("Teléfono inválido")]
    InvalidPhone,
}

pub fn is_valid_rut(rut: &str) -> bool {
    RUT_PATTERN.is_match(rut)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// Blank fields are allowed; filled ones must be well formed
pub fn validate_intake(draft: &VisitDraft) -> Result<(), IntakeError> {
    if !draft.rut.is_empty() && !is_valid_rut(&draft.rut) {
        return Err(IntakeError::InvalidRut);
    }
    if draft.edad == Age::Unreadable || draft.edad.years().is_some_and(|age| age < 0) {
        return Err(IntakeError::InvalidAge);
    }
    if !draft.telefono.is_empty() && !is_valid_phone(&draft.telefono) {
        return Err(IntakeError::InvalidPhone);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rut_pattern() {
        assert!(is_valid_rut("12345678-9"));
        assert!(is_valid_rut("1234567-k"));
        assert!(is_valid_rut("1234567-K"));
        assert!(!is_valid_rut("12.345.678-9"));
        assert!(!is_valid_rut("123456-9"));
        assert!(!is_valid_rut("12345678-X"));
    }

    #[test]
    fn test_phone_pattern() {
        assert!(is_valid_phone("56912345678"));
        assert!(is_valid_phone("12345678"));
        assert!(!is_valid_phone("1234567"));
        assert!(!is_valid_phone("+56912345678"));
    }

    #[test]
    fn test_blank_form_passes() {
        assert_eq!(validate_intake(&VisitDraft::default()), Ok(()));
    }

    #[test]
    fn test_first_failing_field_is_reported() {
        let mut draft = VisitDraft {
            rut: "abc".to_string(),
            edad: Age::Years(-1),
            ..Default::default()
        };
        assert_eq!(validate_intake(&draft), Err(IntakeError::InvalidRut));

        draft.rut = "12345678-5".to_string();
        assert_eq!(validate_intake(&draft), Err(IntakeError::InvalidAge));

        draft.edad = Age::Unreadable;
        assert_eq!(validate_intake(&draft), Err(IntakeError::InvalidAge));

        draft.edad = Age::Years(30);
        draft.telefono = "12-34".to_string();
        assert_eq!(validate_intake(&draft), Err(IntakeError::InvalidPhone));
    }
}
