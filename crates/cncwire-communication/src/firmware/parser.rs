//! Line rules and the parser facade

use cncwire_core::{ParseResult, ParsedLine};

/// One pattern recognising a single message shape
///
/// A rule returns `None` when the line does not have its shape, including
/// when a numeric field fails to convert. Rules must never panic.
pub trait LineRule: Send + Sync {
    /// Short rule name used in logs
    fn name(&self) -> &'static str;

    /// Try to parse a trimmed line
    fn parse(&self, line: &str) -> Option<ParsedLine>;
}

/// Ordered rule chain; the first rule that matches wins
pub struct ParserFacade {
    rules: Vec<Box<dyn LineRule>>,
}

impl ParserFacade {
    /// Create a facade over rules in priority order
    pub fn new(rules: Vec<Box<dyn LineRule>>) -> Self {
        Self { rules }
    }

    /// Parse one line
    ///
    /// Never fails: lines no rule recognises yield an `Unrecognized`
    /// result. `raw` is the line exactly as given.
    pub fn parse(&self, line: &str) -> ParseResult {
        let trimmed = line.trim();
        for rule in &self.rules {
            if let Some(parsed) = rule.parse(trimmed) {
                return ParseResult::new(parsed, line);
            }
        }

        tracing::debug!("Unrecognized line: {:?}", line);
        ParseResult::unrecognized(line)
    }

    /// Rule names in priority order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }
}

impl std::fmt::Debug for ParserFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserFacade")
            .field("rules", &self.rule_names())
            .finish()
    }
}

/// Compile a regex once and hand out a `&'static Regex`
macro_rules! line_regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).expect("invalid regex pattern"))
    }};
}
pub(crate) use line_regex;

/// Parse a finite number; `NaN`, infinities and garbage are rejected
pub(crate) fn number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}
