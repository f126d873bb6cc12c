use once_cell::sync::Lazy;
use regex::Regex;

/// Known prompt-override phrasings and chat-template control tokens.
static ATTACK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)ignore\s+(previous|all)\s+instructions?",
        r"(?i)system\s*:",
        r"(?i)assistant\s*:",
        r"(?i)<\|im_start\|>",
        r"(?i)<\|im_end\|>",
        r"(?i)\[INST\]",
        r"(?i)\[/INST\]",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("attack pattern must compile"))
    .collect()
});

/// An unbroken run of 50+ base64-alphabet characters ending in padding.
static BASE64_BLOB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9+/]{50,}={1,2}([^A-Za-z0-9+/=]|$)").expect("base64 pattern must compile")
});

/// Ten or more consecutive non-word, non-space characters.
static SYMBOL_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]{10,}").expect("symbol pattern must compile"));

/// Best-effort screen for prompt-injection attempts. This is defense in
/// depth, not a security boundary; the system instruction's priority
/// order is what actually holds the line.
pub fn is_suspicious(text: &str) -> bool {
    ATTACK_PATTERNS.iter().any(|pattern| pattern.is_match(text))
        || BASE64_BLOB.is_match(text)
        || SYMBOL_RUN.is_match(text)
}
