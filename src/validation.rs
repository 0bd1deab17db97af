use once_cell::sync::Lazy;
use regex::Regex;

pub fn is_valid_email(string: &str) -> Result<(), String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
        r#"^(?i)(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?|\[(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?|[a-z0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])$"#
    ).unwrap()
    });
    match RE.is_match(string.trim()) {
        true => Ok(()),
        false => Err("invalid email".to_string()),
    }
}

/// Phone numbers may contain spaces, dashes and a leading `+`, but need at
/// least ten digits.
pub fn is_valid_phone(string: &str) -> Result<(), String> {
    let allowed = string
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+' | '(' | ')'));
    let digits = string.chars().filter(|c| c.is_ascii_digit()).count();

    match allowed && digits >= 10 {
        true => Ok(()),
        false => Err("should contain at least 10 digits".to_string()),
    }
}

/// Counts characters (not bytes) after trimming, so that Devanagari input is
/// measured the way a person would count it.
pub fn has_min_chars(string: &str, min: usize) -> bool {
    string.trim().chars().count() >= min
}

/// Collects the problems found while validating a form.
#[derive(Debug, Default)]
pub struct Problems(Vec<String>);

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `msg` unless `ok` holds.
    pub fn check(&mut self, ok: bool, msg: impl Into<String>) {
        if !ok {
            self.0.push(msg.into());
        }
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok` if nothing was recorded, otherwise every problem in the order it
    /// was found.
    pub fn finish(self) -> Result<(), Vec<String>> {
        if self.0.is_empty() { Ok(()) } else { Err(self.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_valid_email("hello@example.com").is_ok());
        assert!(is_valid_email("Ram.Shrestha@Example.com.np").is_ok());
        assert!(is_valid_email("not an email").is_err());
        assert!(is_valid_email("x hello@example.com").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("9841234567").is_ok());
        assert!(is_valid_phone("+977-984-123-4567").is_ok());
        assert!(is_valid_phone("98412").is_err());
        assert!(is_valid_phone("98412345ab").is_err());
    }

    #[test]
    fn min_chars_counts_characters() {
        assert!(has_min_chars("खेल", 3));
        assert!(!has_min_chars("  a ", 2));
    }

    #[test]
    fn problems_keep_order() {
        let mut problems = Problems::new();
        problems.check(true, "never");
        problems.check(false, "first");
        problems.push("second");
        assert_eq!(
            problems.finish(),
            Err(vec!["first".to_string(), "second".to_string()])
        );
    }
}
