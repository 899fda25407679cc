/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use cnpj_enrichment::cnpj::{normalize, validate, CNPJ_LEN};
use cnpj_enrichment::enrichment::{is_valid_email, validate_br_phone};
use cnpj_enrichment::errors::{format_wait, ValidationError};
use proptest::prelude::*;
use std::time::Duration;

// Property: CNPJ validation should never panic
proptest! {
    #[test]
    fn cnpj_validation_never_panics(raw in "\\PC*") {
        let _ = validate(&raw);
    }

    #[test]
    fn validated_cnpj_is_always_canonical(raw in "\\PC*") {
        if let Ok(cnpj) = validate(&raw) {
            prop_assert_eq!(cnpj.as_str().len(), CNPJ_LEN);
            prop_assert!(cnpj.as_str().chars().all(|c| c.is_ascii_digit()));
        }
    }
}

// Property: Punctuation never changes the result
proptest! {
    #[test]
    fn formatted_and_bare_cnpj_agree(digits in "[0-9]{14}") {
        let formatted = format!(
            "{}.{}.{}/{}-{}",
            &digits[0..2], &digits[2..5], &digits[5..8], &digits[8..12], &digits[12..14]
        );
        prop_assert_eq!(validate(&formatted), validate(&digits));
        prop_assert_eq!(normalize(&formatted), digits);
    }

    #[test]
    fn formatted_round_trips_through_display_form(digits in "[0-9]{14}") {
        if let Ok(cnpj) = validate(&digits) {
            prop_assert_eq!(validate(&cnpj.formatted()), Ok(cnpj));
        }
    }
}

// Property: Rejections name the right reason
proptest! {
    #[test]
    fn wrong_length_reports_digit_count(digits in "[0-9]{0,30}") {
        prop_assume!(digits.len() != CNPJ_LEN);
        prop_assert_eq!(
            validate(&digits),
            Err(ValidationError::WrongLength { found: digits.len() })
        );
    }

    #[test]
    fn repeated_digit_rejected(d in 0u8..=9u8) {
        let raw = d.to_string().repeat(CNPJ_LEN);
        prop_assert_eq!(validate(&raw), Err(ValidationError::RepeatedDigits));
    }

    #[test]
    fn non_repeated_fourteen_digits_accepted(digits in "[0-9]{14}") {
        let first = digits.as_bytes()[0];
        prop_assume!(digits.bytes().any(|b| b != first));
        prop_assert!(validate(&digits).is_ok());
    }
}

// Property: Wait formatting never shows zero while a wait is pending
proptest! {
    #[test]
    fn format_wait_rounds_up(ms in 1u64..=600_000u64) {
        let formatted = format_wait(Duration::from_millis(ms));
        prop_assert_ne!(formatted.as_str(), "0s");
    }
}

// Property: Email and phone validation should never panic
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn phone_validation_never_panics(phone in "\\PC*") {
        let _ = validate_br_phone(&phone);
    }

    #[test]
    fn very_short_phones_always_invalid(phone in "[0-9]{0,7}") {
        let (valid, _) = validate_br_phone(&phone);
        prop_assert!(!valid, "Very short phone should be invalid: {}", phone);
    }

    #[test]
    fn valid_br_phones_normalize_to_e164(ddd in 11u8..=99u8, number in 30000000u32..=39999999u32) {
        let phone = format!("{}{}", ddd, number);
        let (valid, normalized) = validate_br_phone(&phone);
        if valid {
            prop_assert!(normalized.starts_with("+55"));
            prop_assert!(normalized[1..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
