//! Phone number normalization for Benin MSISDNs.
//!
//! Patient records hold phone numbers in whatever shape the front desk typed
//! them: spaced local numbers, numbers with the national `01` prefix, numbers
//! already carrying the country code, or with a leading `+`. The SMS channel
//! only ever sends to the canonical form produced here.

/// Benin country calling code.
pub const COUNTRY_CODE: &str = "229";

/// Length of a subscriber number without trunk or country prefix.
const SUBSCRIBER_LEN: usize = 8;

/// Normalize a raw phone number to canonical digits (`229XXXXXXXX`, no `+`).
///
/// Returns `None` when the input cannot be interpreted as a Benin mobile
/// number; callers must skip sending rather than treat this as an error.
///
/// Accepted shapes, after stripping every non-digit character:
/// - `229` + 8 digits: already canonical, returned as-is
/// - `01` + 8 digits: the 2022 national dialing prefix, stripped
/// - `0` + 8 digits: legacy single-zero trunk prefix, stripped
/// - exactly 8 digits: bare subscriber number
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
        if rest.len() == SUBSCRIBER_LEN {
            return Some(digits);
        }
        // `229...` with a wrong remainder is ambiguous; fall through to the
        // other shapes in case the number merely starts with those digits.
    }

    if digits.len() == 10 && digits.starts_with("01") {
        return Some(format!("{}{}", COUNTRY_CODE, &digits[2..]));
    }

    if digits.len() == 9 && digits.starts_with('0') {
        return Some(format!("{}{}", COUNTRY_CODE, &digits[1..]));
    }

    if digits.len() == SUBSCRIBER_LEN {
        return Some(format!("{}{}", COUNTRY_CODE, digits));
    }

    None
}

/// Normalize to the `+229XXXXXXXX` form expected by SMS providers.
pub fn normalize_e164(raw: &str) -> Option<String> {
    normalize(raw).map(|digits| format!("+{}", digits))
}
