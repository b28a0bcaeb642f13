use std::fmt;

use serde::Serialize;

pub const MIN_PASSWORD_LENGTH: usize = 12;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// One rule of the password policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordRule {
    MinLength,
    MaxLength,
    Uppercase,
    Lowercase,
    Number,
    Symbol,
    NoWhitespace,
}

impl PasswordRule {
    /// Checklist order shown next to the password field.
    pub const ALL: [PasswordRule; 7] = [
        PasswordRule::MinLength,
        PasswordRule::MaxLength,
        PasswordRule::Uppercase,
        PasswordRule::Lowercase,
        PasswordRule::Number,
        PasswordRule::Symbol,
        PasswordRule::NoWhitespace,
    ];

    pub fn is_satisfied_by(self, password: &str) -> bool {
        match self {
            Self::MinLength => char_len(password) >= MIN_PASSWORD_LENGTH,
            Self::MaxLength => char_len(password) <= MAX_PASSWORD_LENGTH,
            Self::Uppercase => password.chars().any(|c| c.is_ascii_uppercase()),
            Self::Lowercase => password.chars().any(|c| c.is_ascii_lowercase()),
            Self::Number => password.chars().any(|c| c.is_ascii_digit()),
            Self::Symbol => password.chars().any(|c| !c.is_ascii_alphanumeric()),
            Self::NoWhitespace => !password.chars().any(char::is_whitespace),
        }
    }

    /// Checklist label.
    pub fn label(self) -> &'static str {
        match self {
            Self::MinLength => "At least 12 characters",
            Self::MaxLength => "At most 128 characters",
            Self::Uppercase => "One uppercase letter",
            Self::Lowercase => "One lowercase letter",
            Self::Number => "One number",
            Self::Symbol => "One symbol",
            Self::NoWhitespace => "No spaces",
        }
    }
}

/// Error message for a failed rule.
impl fmt::Display for PasswordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::MinLength => "At least 12 characters.",
            Self::MaxLength => "No more than 128 characters.",
            Self::Uppercase => "One uppercase letter.",
            Self::Lowercase => "One lowercase letter.",
            Self::Number => "One number.",
            Self::Symbol => "One symbol.",
            Self::NoWhitespace => "No spaces.",
        };
        f.write_str(msg)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub const PASSWORD_REQUIREMENTS: [&str; 7] = [
    "At least 12 characters",
    "At most 128 characters",
    "One uppercase letter",
    "One lowercase letter",
    "One number",
    "One symbol",
    "No spaces",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordValidation {
    pub valid: bool,
    /// Failed rules, in error-reporting order.
    pub errors: Vec<PasswordRule>,
}

impl PasswordValidation {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordCheck {
    pub rule: PasswordRule,
    pub label: &'static str,
    pub passed: bool,
}

/// Evaluate every rule.  Errors are reported length first, then
/// whitespace, then the character classes.
pub fn validate_password(password: &str) -> PasswordValidation {
    const ORDER: [PasswordRule; 7] = [
        PasswordRule::MinLength,
        PasswordRule::MaxLength,
        PasswordRule::NoWhitespace,
        PasswordRule::Lowercase,
        PasswordRule::Uppercase,
        PasswordRule::Number,
        PasswordRule::Symbol,
    ];
    let errors: Vec<_> = ORDER
        .into_iter()
        .filter(|rule| !rule.is_satisfied_by(password))
        .collect();
    PasswordValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Per-rule pass/fail for a live checklist.
pub fn password_checks(password: &str) -> Vec<PasswordCheck> {
    PasswordRule::ALL
        .into_iter()
        .map(|rule| PasswordCheck {
            rule,
            label: rule.label(),
            passed: rule.is_satisfied_by(password),
        })
        .collect()
}
