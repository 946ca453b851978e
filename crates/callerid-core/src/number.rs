//! Phone number canonicalization.
//!
//! Numbers arrive in whatever form the network or the user typed them:
//! `(650) 253-0000`, `0044 20 7946 0000`, `+81 90-2889-4539`. The lookup key
//! for both the cache and the remote directory is the E.164 form
//! (`+<country code><national significant number>`), so every request passes
//! through [`NumberNormalizer::normalize`] first.
//!
//! Numbers dialed without an international prefix are interpreted with the SIM
//! country's numbering rules. Only a compact table of countries is known; for
//! numbers already carrying a `+` or an international prefix, unknown country
//! codes are accepted as long as they satisfy the generic E.164 bounds.

use crate::error::NormalizationError;

/// E.164 caps the full number (country code included) at 15 digits.
const MAX_E164_DIGITS: usize = 15;

/// Numbering rules for a single country.
#[derive(Debug, PartialEq, Eq)]
struct CountryRule {
    iso: &'static str,
    calling_code: &'static str,
    /// Leading digits dropped from national numbers (`0` in most of Europe).
    trunk_prefix: Option<&'static str>,
    /// Digits dialed before a foreign country code.
    international_prefix: &'static str,
    /// Bounds on the national significant number.
    min_len: usize,
    max_len: usize,
}

impl CountryRule {
    const fn nanp(iso: &'static str) -> Self {
        // Seven-digit local dialing is still accepted for the home area.
        Self {
            iso,
            calling_code: "1",
            trunk_prefix: Some("1"),
            international_prefix: "011",
            min_len: 7,
            max_len: 10,
        }
    }

    const fn is_nanp(&self) -> bool {
        matches!(self.calling_code.as_bytes(), [b'1'])
    }
}

#[rustfmt::skip]
const COUNTRY_RULES: &[CountryRule] = &[
    CountryRule::nanp("US"),
    CountryRule::nanp("CA"),
    CountryRule::nanp("PR"),
    CountryRule { iso: "GB", calling_code: "44", trunk_prefix: Some("0"), international_prefix: "00", min_len: 9, max_len: 10 },
    CountryRule { iso: "IE", calling_code: "353", trunk_prefix: Some("0"), international_prefix: "00", min_len: 7, max_len: 9 },
    CountryRule { iso: "DE", calling_code: "49", trunk_prefix: Some("0"), international_prefix: "00", min_len: 6, max_len: 13 },
    CountryRule { iso: "FR", calling_code: "33", trunk_prefix: Some("0"), international_prefix: "00", min_len: 9, max_len: 9 },
    CountryRule { iso: "NL", calling_code: "31", trunk_prefix: Some("0"), international_prefix: "00", min_len: 9, max_len: 9 },
    CountryRule { iso: "BE", calling_code: "32", trunk_prefix: Some("0"), international_prefix: "00", min_len: 8, max_len: 9 },
    CountryRule { iso: "CH", calling_code: "41", trunk_prefix: Some("0"), international_prefix: "00", min_len: 9, max_len: 9 },
    CountryRule { iso: "AT", calling_code: "43", trunk_prefix: Some("0"), international_prefix: "00", min_len: 4, max_len: 13 },
    CountryRule { iso: "ES", calling_code: "34", trunk_prefix: None, international_prefix: "00", min_len: 9, max_len: 9 },
    CountryRule { iso: "IT", calling_code: "39", trunk_prefix: None, international_prefix: "00", min_len: 6, max_len: 11 },
    CountryRule { iso: "SE", calling_code: "46", trunk_prefix: Some("0"), international_prefix: "00", min_len: 7, max_len: 9 },
    CountryRule { iso: "PL", calling_code: "48", trunk_prefix: None, international_prefix: "00", min_len: 9, max_len: 9 },
    CountryRule { iso: "JP", calling_code: "81", trunk_prefix: Some("0"), international_prefix: "010", min_len: 9, max_len: 10 },
    CountryRule { iso: "CN", calling_code: "86", trunk_prefix: Some("0"), international_prefix: "00", min_len: 7, max_len: 11 },
    CountryRule { iso: "IN", calling_code: "91", trunk_prefix: Some("0"), international_prefix: "00", min_len: 10, max_len: 10 },
    CountryRule { iso: "AU", calling_code: "61", trunk_prefix: Some("0"), international_prefix: "0011", min_len: 9, max_len: 9 },
    CountryRule { iso: "NZ", calling_code: "64", trunk_prefix: Some("0"), international_prefix: "00", min_len: 8, max_len: 10 },
    CountryRule { iso: "BR", calling_code: "55", trunk_prefix: Some("0"), international_prefix: "00", min_len: 10, max_len: 11 },
    CountryRule { iso: "MX", calling_code: "52", trunk_prefix: None, international_prefix: "00", min_len: 10, max_len: 10 },
];

fn rule_for_iso(iso: &str) -> Option<&'static CountryRule> {
    COUNTRY_RULES
        .iter()
        .find(|rule| rule.iso.eq_ignore_ascii_case(iso))
}

/// Finds the known country whose calling code prefixes `digits`.
///
/// Calling codes are prefix-free, so the first match is the only match.
/// Countries sharing a code (the NANP) resolve to the first table entry.
fn rule_for_international(digits: &str) -> Option<&'static CountryRule> {
    COUNTRY_RULES
        .iter()
        .find(|rule| digits.starts_with(rule.calling_code))
}

/// Converts raw phone numbers to E.164 and formats them for display.
#[derive(Clone, Debug)]
pub struct NumberNormalizer {
    home: &'static CountryRule,
    display: &'static CountryRule,
}

impl NumberNormalizer {
    /// Creates a normalizer for the given SIM country ISO code
    /// (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError::UnsupportedCountry`] if the country has no
    /// numbering rules.
    pub fn new(country_iso: &str) -> Result<Self, NormalizationError> {
        let home = rule_for_iso(country_iso.trim()).ok_or_else(|| {
            NormalizationError::UnsupportedCountry {
                iso: country_iso.to_ascii_uppercase(),
            }
        })?;
        Ok(Self {
            home,
            display: home,
        })
    }

    /// Uses a different country (typically the current network's) when
    /// formatting numbers for display.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError::UnsupportedCountry`] if the country has no
    /// numbering rules.
    pub fn with_display_country(mut self, country_iso: &str) -> Result<Self, NormalizationError> {
        self.display = rule_for_iso(country_iso.trim()).ok_or_else(|| {
            NormalizationError::UnsupportedCountry {
                iso: country_iso.to_ascii_uppercase(),
            }
        })?;
        Ok(self)
    }

    /// Whether `country_iso` has numbering rules.
    pub fn supports(country_iso: &str) -> bool {
        rule_for_iso(country_iso.trim()).is_some()
    }

    /// The upper-cased SIM country this normalizer interprets national
    /// numbers with.
    pub const fn country_iso(&self) -> &'static str {
        self.home.iso
    }

    /// Canonicalizes `raw` into E.164.
    ///
    /// # Errors
    ///
    /// Returns a [`NormalizationError`] if the input contains anything other
    /// than digits and common separators, or if the resulting number has an
    /// implausible length.
    pub fn normalize(&self, raw: &str) -> Result<String, NormalizationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NormalizationError::Empty);
        }

        let (plus, digits) = strip_separators(trimmed)?;
        if digits.is_empty() {
            return Err(NormalizationError::Empty);
        }

        if plus {
            return international(&digits);
        }
        if let Some(rest) = digits.strip_prefix(self.home.international_prefix) {
            return international(rest);
        }
        self.national(&digits)
    }

    fn national(&self, digits: &str) -> Result<String, NormalizationError> {
        let rule = self.home;
        let nsn = match rule.trunk_prefix {
            // NANP numbers may be dialed as 1-NXX-NXX-XXXX; only strip the
            // trunk digit when it leaves a full ten-digit number.
            Some(trunk) if rule.is_nanp() => match digits.strip_prefix(trunk) {
                Some(rest) if rest.len() == rule.max_len => rest,
                _ => digits,
            },
            Some(trunk) => digits.strip_prefix(trunk).unwrap_or(digits),
            None => digits,
        };

        if nsn.len() < rule.min_len || nsn.len() > rule.max_len {
            return Err(NormalizationError::InvalidLength { digits: nsn.len() });
        }
        if rule.is_nanp() && nsn.starts_with(['0', '1']) {
            return Err(NormalizationError::InvalidLength { digits: nsn.len() });
        }

        Ok(format!("+{}{}", rule.calling_code, nsn))
    }

    /// Formats a number for display in the display country.
    ///
    /// Numbers that cannot be normalized are returned trimmed but otherwise
    /// untouched.
    pub fn format(&self, raw: &str, normalized: Option<&str>) -> String {
        let owned;
        let normalized = match normalized {
            Some(normalized) => normalized,
            None => match self.normalize(raw) {
                Ok(normalized) => {
                    owned = normalized;
                    &owned
                }
                Err(_) => return raw.trim().to_owned(),
            },
        };

        let Some(digits) = normalized.strip_prefix('+') else {
            return raw.trim().to_owned();
        };

        let rule = self.display;
        if let Some(nsn) = digits.strip_prefix(rule.calling_code) {
            if rule.is_nanp() {
                return format_nanp(nsn);
            }
            return format!("{}{}", rule.trunk_prefix.unwrap_or(""), nsn);
        }

        match rule_for_international(digits) {
            Some(foreign) => format!(
                "+{} {}",
                foreign.calling_code,
                &digits[foreign.calling_code.len()..]
            ),
            None => normalized.to_owned(),
        }
    }
}

/// Drops visual separators, returning whether the number started with `+`.
fn strip_separators(input: &str) -> Result<(bool, String), NormalizationError> {
    let mut digits = String::with_capacity(input.len());
    let mut plus = false;

    for (idx, ch) in input.char_indices() {
        match ch {
            '0'..='9' => digits.push(ch),
            '+' if idx == 0 => plus = true,
            ' ' | '\t' | '-' | '.' | '(' | ')' | '/' => {}
            _ => return Err(NormalizationError::InvalidCharacter { ch }),
        }
    }

    Ok((plus, digits))
}

fn international(digits: &str) -> Result<String, NormalizationError> {
    if digits.starts_with('0') {
        return Err(NormalizationError::InvalidCountryCode);
    }
    if digits.len() < 3 || digits.len() > MAX_E164_DIGITS {
        return Err(NormalizationError::InvalidLength {
            digits: digits.len(),
        });
    }

    if let Some(rule) = rule_for_international(digits) {
        let nsn = &digits[rule.calling_code.len()..];
        if nsn.len() < rule.min_len || nsn.len() > rule.max_len {
            return Err(NormalizationError::InvalidLength { digits: nsn.len() });
        }
    }

    Ok(format!("+{digits}"))
}

fn format_nanp(nsn: &str) -> String {
    match nsn.len() {
        10 => format!("({}) {}-{}", &nsn[..3], &nsn[3..6], &nsn[6..]),
        7 => format!("{}-{}", &nsn[..3], &nsn[3..]),
        _ => format!("+1{nsn}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us() -> NumberNormalizer {
        NumberNormalizer::new("us").unwrap()
    }

    #[test]
    fn normalizes_us_national_forms() {
        let n = us();
        assert_eq!(n.normalize("(650) 253-0000").unwrap(), "+16502530000");
        assert_eq!(n.normalize("1-650-253-0000").unwrap(), "+16502530000");
        assert_eq!(n.normalize("650.253.0000").unwrap(), "+16502530000");
        assert_eq!(n.normalize("555-1234").unwrap(), "+15551234");
    }

    #[test]
    fn normalizes_international_forms() {
        let n = us();
        assert_eq!(n.normalize("+44 20 7946 0000").unwrap(), "+442079460000");
        assert_eq!(n.normalize("011 44 20 7946 0000").unwrap(), "+442079460000");
        // Unknown calling code, generic bounds only.
        assert_eq!(n.normalize("+998 90 123 4567").unwrap(), "+998901234567");
    }

    #[test]
    fn strips_trunk_prefix_for_home_country() {
        let gb = NumberNormalizer::new("GB").unwrap();
        assert_eq!(gb.normalize("020 7946 0000").unwrap(), "+442079460000");
        assert_eq!(gb.normalize("0044 20 7946 0000").unwrap(), "+442079460000");

        let jp = NumberNormalizer::new("jp").unwrap();
        assert_eq!(jp.normalize("090-2889-4539").unwrap(), "+819028894539");
        assert_eq!(jp.normalize("+819028894539").unwrap(), "+819028894539");
    }

    #[test]
    fn rejects_garbage() {
        let n = us();
        assert_eq!(n.normalize("   "), Err(NormalizationError::Empty));
        assert_eq!(n.normalize("()-"), Err(NormalizationError::Empty));
        assert_eq!(
            n.normalize("abc"),
            Err(NormalizationError::InvalidCharacter { ch: 'a' })
        );
        assert_eq!(
            n.normalize("12+34"),
            Err(NormalizationError::InvalidCharacter { ch: '+' })
        );
        assert!(matches!(
            n.normalize("12345"),
            Err(NormalizationError::InvalidLength { digits: 5 })
        ));
        assert_eq!(
            n.normalize("+0123456"),
            Err(NormalizationError::InvalidCountryCode)
        );
        assert!(matches!(
            n.normalize("+1234567890123456"),
            Err(NormalizationError::InvalidLength { .. })
        ));
    }

    #[test]
    fn rejects_nanp_numbers_with_invalid_leading_digit() {
        assert!(us().normalize("055-1234").is_err());
    }

    #[test]
    fn unsupported_country_is_an_error() {
        assert_eq!(
            NumberNormalizer::new("zz").unwrap_err(),
            NormalizationError::UnsupportedCountry { iso: "ZZ".into() }
        );
        assert!(NumberNormalizer::supports("de"));
        assert!(!NumberNormalizer::supports("xx"));
        assert_eq!(us().country_iso(), "US");
    }

    #[test]
    fn formats_for_display() {
        let n = us();
        assert_eq!(n.format("6502530000", Some("+16502530000")), "(650) 253-0000");
        assert_eq!(n.format("555-1234", None), "555-1234");
        assert_eq!(n.format("+442079460000", None), "+44 2079460000");
        assert_eq!(n.format("not a number", None), "not a number");

        let gb = NumberNormalizer::new("GB").unwrap();
        assert_eq!(gb.format("+442079460000", None), "02079460000");
    }

    #[test]
    fn display_country_overrides_formatting_only() {
        let n = us().with_display_country("GB").unwrap();
        assert_eq!(n.normalize("650-253-0000").unwrap(), "+16502530000");
        assert_eq!(n.format("+16502530000", None), "+1 6502530000");
        assert!(us().with_display_country("zz").is_err());
    }
}
