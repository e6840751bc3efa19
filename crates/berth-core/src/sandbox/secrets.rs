//! Secret-bearing environment variable detection
//!
//! The recognized set is data: exact names plus `*` patterns, matched
//! case-insensitively. New provider keys go into the lists below or into
//! `docker.secret_env` in config.

use glob::Pattern;
use tracing::warn;

/// Provider credentials known by exact name
const SECRET_ENV_NAMES: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_OAUTH_TOKEN",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "GOOGLE_AI_API_KEY",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "OPENROUTER_API_KEY",
    "GROQ_API_KEY",
    "MISTRAL_API_KEY",
    "XAI_API_KEY",
    "DEEPSEEK_API_KEY",
    "ELEVENLABS_API_KEY",
    "TAVILY_API_KEY",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "NPM_TOKEN",
    "DISCORD_BOT_TOKEN",
    "SLACK_BOT_TOKEN",
    "TELEGRAM_BOT_TOKEN",
];

/// Name shapes that carry credentials regardless of provider
const SECRET_ENV_PATTERNS: &[&str] = &[
    "*_API_KEY",
    "*_APIKEY",
    "*_TOKEN",
    "*_SECRET",
    "*_SECRET_KEY",
    "*_PRIVATE_KEY",
    "*PASSWORD*",
    "*_PASSWD",
    "*_CREDENTIALS",
];

/// Decides whether an environment variable name is secret-bearing
#[derive(Debug, Clone)]
pub struct SecretKeyMatcher {
    names: Vec<String>,
    patterns: Vec<Pattern>,
}

impl Default for SecretKeyMatcher {
    fn default() -> Self {
        let mut matcher = Self {
            names: Vec::new(),
            patterns: Vec::new(),
        };
        matcher.extend(SECRET_ENV_NAMES.iter().chain(SECRET_ENV_PATTERNS));
        matcher
    }
}

impl SecretKeyMatcher {
    /// Built-in set plus caller-supplied names or `*` patterns
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        matcher.extend(extra);
        matcher
    }

    fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            let entry = entry.as_ref().trim().to_ascii_uppercase();
            if entry.is_empty() {
                continue;
            }
            if entry.contains('*') {
                match Pattern::new(&entry) {
                    Ok(pattern) => self.patterns.push(pattern),
                    Err(e) => warn!("Ignoring invalid secret env pattern '{}': {}", entry, e),
                }
            } else {
                self.names.push(entry);
            }
        }
    }

    pub fn is_secret(&self, key: &str) -> bool {
        let key = key.trim().to_ascii_uppercase();
        self.names.iter().any(|n| *n == key) || self.patterns.iter().any(|p| p.matches(&key))
    }
}
