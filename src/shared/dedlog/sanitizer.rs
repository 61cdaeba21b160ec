//! Collapses volatile fragments of log messages so equal failures share a key.
//

use once_cell::sync::Lazy;
use regex::Regex;

struct Rule {
    re: Regex,
    placeholder: &'static str,
}

// Order matters: wider patterns first, bare numbers last.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    [
        (r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:\d{2})\b", "<ts>"),
        (r"\bhttps?://[^\s]+", "<url>"),
        (
            r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
            "<uuid>",
        ),
        (r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b", "<ip4>"),
        (r"\b[0-9a-fA-F]{12,64}\b", "<hex>"),
        (r"\b[A-Za-z][A-Za-z0-9]*[-_][A-Za-z0-9_-]*\d[A-Za-z0-9_-]*\b", "<id>"),
        (r"\b\d+\b", "<n>"),
    ]
    .into_iter()
    .filter_map(|(pattern, placeholder)| {
        Regex::new(pattern).ok().map(|re| Rule { re, placeholder })
    })
    .collect()
});

/// Applies the rule set in order, then collapses whitespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sanitizer;

impl Sanitizer {
    pub fn new() -> Self {
        Self
    }

    pub fn sanitize(&self, msg: &str) -> String {
        if msg.is_empty() {
            return String::new();
        }
        let mut result = msg.to_string();
        for rule in RULES.iter() {
            result = rule.re.replace_all(&result, rule.placeholder).into_owned();
        }
        result.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
