use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PiiMatches {
    pub phones: Vec<String>,
    pub emails: Vec<String>,
}

impl PiiMatches {
    pub fn is_empty(&self) -> bool {
        self.phones.is_empty() && self.emails.is_empty()
    }
}

fn uae_phone() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+971\d{8,9}").expect("static regex"))
}

fn email() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").expect("static regex")
    })
}

pub fn detect_pii(text: &str) -> PiiMatches {
    PiiMatches {
        phones: uae_phone()
            .find_iter(text)
            .map(|found| found.as_str().to_string())
            .collect(),
        emails: email()
            .find_iter(text)
            .map(|found| found.as_str().to_string())
            .collect(),
    }
}
