//! Static library of known issue signatures.
//!
//! Each pattern carries a regex, supporting keywords, a confidence value
//! for the confidence axis, and whether the signature is suitable for
//! autonomous handling at all. The library is compiled once at startup and
//! read-only afterwards.

use std::sync::LazyLock;

use regex::Regex;

/// A known issue signature.
pub struct PatternRule {
    pub name: &'static str,
    pub regex: Regex,
    pub keywords: &'static [&'static str],
    /// How confident we are in automated resolution when this pattern hits.
    pub confidence: f64,
    /// Whether issues matching this pattern may be handled autonomously.
    pub automation_suitable: bool,
}

impl PatternRule {
    fn new(
        name: &'static str,
        pattern: &str,
        keywords: &'static [&'static str],
        confidence: f64,
        automation_suitable: bool,
    ) -> Self {
        Self {
            name,
            // Patterns are static literals; a failure here is a programming
            // error caught by the library's own tests.
            regex: Regex::new(pattern).expect("invalid built-in pattern"),
            keywords,
            confidence,
            automation_suitable,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text) || self.keywords.iter().any(|k| text.contains(k))
    }
}

static STANDARD_PATTERNS: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    vec![
        PatternRule::new(
            "typo-fix",
            r"\btypos?\b|\bspelling\b|\bmisspell\w*",
            &["spelled wrong"],
            0.9,
            true,
        ),
        PatternRule::new(
            "missing-import",
            r"missing import|unresolved import|module not found|cannot find module",
            &[],
            0.85,
            true,
        ),
        PatternRule::new(
            "lint-format",
            r"\blint\b|\bformat(ting)?\b|\bclippy\b|\bprettier\b|trailing whitespace",
            &[],
            0.85,
            true,
        ),
        PatternRule::new(
            "test-failure",
            r"test\w* (is |are )?fail\w*|failing test|flaky test|broken test",
            &[],
            0.8,
            true,
        ),
        PatternRule::new(
            "add-tests",
            r"add (unit |integration )?tests?|test coverage|improve coverage",
            &[],
            0.75,
            true,
        ),
        PatternRule::new(
            "null-error",
            r"null pointer|undefined is not|nullpointerexception|panicked at|unwrap\(\) on a",
            &[],
            0.7,
            true,
        ),
        PatternRule::new(
            "doc-update",
            r"\breadme\b|\bdocs?\b|\bdocumentation\b|doc comment|changelog",
            &[],
            0.8,
            true,
        ),
        PatternRule::new(
            "dependency-bump",
            r"bump \w+|upgrade .*(dependency|version)|update .* to v?\d",
            &[],
            0.8,
            true,
        ),
        PatternRule::new(
            "security",
            r"security|vulnerab\w+|\binjection\b|\bxss\b|\bcsrf\b|auth(entication|orization)? bypass|secret leak|leaked (secret|token|credential)",
            &["cve-"],
            0.95,
            false,
        ),
    ]
});

/// Read-only view over the standard pattern set.
pub struct PatternLibrary {
    rules: &'static [PatternRule],
}

impl PatternLibrary {
    pub fn standard() -> Self {
        Self {
            rules: &STANDARD_PATTERNS,
        }
    }

    pub fn rules(&self) -> &[PatternRule] {
        self.rules
    }

    /// Highest-confidence rule matching the text, if any.
    pub fn best_match(&self, text: &str) -> Option<&PatternRule> {
        self.rules
            .iter()
            .filter(|r| r.matches(text))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::standard()
    }
}
