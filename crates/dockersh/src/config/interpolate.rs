//! Placeholder expansion for config values.
//!
//! Supported tokens:
//! - `%h`: the calling user's home directory
//! - `%u`: the calling user's name
//! - `%s`: the fixed shell path [`SHELL_TOKEN_VALUE`]
//!
//! Substitution is a single left-to-right pass. Replacement text is never
//! scanned again, so a home directory containing `%u` stays literal.

use std::borrow::Cow;

/// Value substituted for `%s`.
pub const SHELL_TOKEN_VALUE: &str = "/bin/bash";

/// Per-invocation values for placeholder expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpolationContext {
    pub home: String,
    pub user: String,
}

impl InterpolationContext {
    pub fn new(home: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            user: user.into(),
        }
    }

    /// Expand `%h`, `%u` and `%s` in `template`.
    pub fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '%' {
                let replacement = match chars.peek() {
                    Some('h') => Some(self.home.as_str()),
                    Some('u') => Some(self.user.as_str()),
                    Some('s') => Some(SHELL_TOKEN_VALUE),
                    _ => None,
                };
                if let Some(value) = replacement {
                    out.push_str(value);
                    chars.next();
                    continue;
                }
            }
            out.push(c);
        }

        out
    }

    /// Expand an environment assignment: process variables first, then tokens.
    ///
    /// `$VAR` and `${VAR}` are looked up through `lookup`; unset variables
    /// expand to the empty string.
    pub fn interpolate_env<F>(&self, entry: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded: Cow<str> = shellexpand::env_with_context_no_errors(entry, |name: &str| {
            Some(lookup(name).unwrap_or_default())
        });
        self.interpolate(&expanded)
    }
}
