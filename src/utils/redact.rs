//! Password redaction for logged commands, outputs and metric labels

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// `scheme:[http(s):]//user:password@host...` as used by restic backends
static URL_CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[a-z0-9]+:)?(?:[a-z]+:)?//[^:/@\s]+:)([^@\s]+)(@.*)$")
        .expect("valid credential regex")
});

/// The same credentials anywhere inside free text
static URL_CREDENTIALS_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(//[^:/@\s]+:)([^/@\s]+)(@)").expect("valid credential regex")
});

/// Replaces repository passwords before text reaches a log line
#[derive(Debug, Clone)]
pub struct Redactor {
    password: Option<String>,
    replacement: String,
}

impl Redactor {
    pub fn new(password: Option<&str>, replacement: &str) -> Self {
        Self {
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            replacement: replacement.to_string(),
        }
    }

    /// Hide credentials embedded in a repository URL
    pub fn repository(&self, repo: &str) -> String {
        URL_CREDENTIALS
            .replace(repo, |caps: &Captures| {
                format!("{}{}{}", &caps[1], self.replacement, &caps[3])
            })
            .into_owned()
    }

    /// Hide the configured password and URL credentials anywhere in the text
    pub fn text<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let text = match self.password {
            Some(ref password) if text.contains(password.as_str()) => {
                Cow::Owned(text.replace(password.as_str(), &self.replacement))
            }
            _ => text.into(),
        };

        let redacted = match URL_CREDENTIALS_IN_TEXT.replace_all(&text, |caps: &Captures| {
            format!("{}{}{}", &caps[1], self.replacement, &caps[3])
        }) {
            Cow::Owned(redacted) => Some(redacted),
            Cow::Borrowed(_) => None,
        };

        match redacted {
            Some(redacted) => Cow::Owned(redacted),
            None => text,
        }
    }

    /// [`Redactor::text`] as an owned string, for command lines
    pub fn line(&self, text: &str) -> String {
        self.text(text).into_owned()
    }
}
