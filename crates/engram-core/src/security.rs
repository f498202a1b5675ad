//! Secret redaction
//!
//! Applied to every chunk and memory before it is embedded or stored.

use regex::Regex;
use std::sync::LazyLock;

/// Marker used for generic credential assignments
pub const SECRET_MARKER: &str = "[SECRET_REDACTED]";

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // AWS
        (r"AKIA[0-9A-Z]{16}", "[AWS_ACCESS_KEY_REDACTED]"),
        (
            r#"(?i)aws[_-]?secret[_-]?access[_-]?key\s*[=:]\s*['"]?[A-Za-z0-9/+=]{40}['"]?"#,
            "[AWS_SECRET_REDACTED]",
        ),
        // GitHub
        (r"gh[pousr]_[a-zA-Z0-9]{36}", "[GITHUB_TOKEN_REDACTED]"),
        // Stripe
        (r"sk_(?:live|test)_[0-9a-zA-Z]{24,}", "[STRIPE_SECRET_REDACTED]"),
        (r"pk_(?:live|test)_[0-9a-zA-Z]{24,}", "[STRIPE_PUBLIC_REDACTED]"),
        // Slack
        (r"xox[bapors]-[0-9a-zA-Z\-]{10,}", "[SLACK_TOKEN_REDACTED]"),
        // Private key headers
        (
            r"-----BEGIN (?:RSA |DSA |EC |OPENSSH |PGP )?PRIVATE KEY-----",
            "[PRIVATE_KEY_REDACTED]",
        ),
        // Anthropic before OpenAI: both start with sk-
        (r"sk-ant-[a-zA-Z0-9\-_]{20,}", "[ANTHROPIC_KEY_REDACTED]"),
        (r"sk-[a-zA-Z0-9]{48}", "[OPENAI_KEY_REDACTED]"),
        // Generic credential assignments
        (
            r#"(?i)["']?(?:api[_-]?key|secret|password|passwd|token|auth)["']?\s*[:=]\s*["'][^"'\n]{8,}["']"#,
            SECRET_MARKER,
        ),
    ]
    .into_iter()
    .map(|(pattern, marker)| {
        (
            Regex::new(pattern).expect("secret patterns are valid regexes"),
            marker,
        )
    })
    .collect()
});

/// Replace every recognised secret with its redaction marker
pub fn scrub_secrets(text: &str) -> String {
    let mut scrubbed = text.to_string();
    for (pattern, marker) in SECRET_PATTERNS.iter() {
        if pattern.is_match(&scrubbed) {
            scrubbed = pattern.replace_all(&scrubbed, *marker).into_owned();
        }
    }
    scrubbed
}
