/// Safety Gate - Textual Pre-Check
///
/// Scans raw source text, not the syntax tree, against an ordered list of
/// forbidden patterns. Matching is case-insensitive and stops at the first
/// hit, whose pattern becomes the violation reason.
///
/// **Known limit:** lexical matching cannot see through aliasing,
/// indirection or reflection (`getattr(print, "__self__")` reaches the real
/// builtins module without spelling any forbidden name). The isolation
/// boundary of the sandbox is what contains such code.
use crate::error::{EngineError, Result};
use quest_common::types::SafetyVerdict;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub struct SafetyGate {
    patterns: Vec<Regex>,
}

impl SafetyGate {
    /// Compile the pattern list; any invalid pattern fails the whole gate
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| EngineError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn check(&self, source: &str) -> SafetyVerdict {
        self.patterns
            .iter()
            .find(|pattern| pattern.is_match(source))
            .map(|pattern| SafetyVerdict::unsafe_because(pattern.as_str()))
            .unwrap_or_else(SafetyVerdict::safe)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FORBIDDEN_PATTERNS;

    fn default_gate() -> SafetyGate {
        SafetyGate::new(DEFAULT_FORBIDDEN_PATTERNS).unwrap()
    }

    #[test]
    fn test_plain_code_is_safe() {
        let verdict = default_gate().check("name = 'Ada'\nprint(name)\n");
        assert!(verdict.safe);
        assert_eq!(verdict.violation, None);
    }

    #[test]
    fn test_import_os_rejected() {
        let verdict = default_gate().check("import os\nos.listdir('.')");
        assert!(!verdict.safe);
        assert_eq!(verdict.violation.as_deref(), Some(r"import\s+os"));
    }

    #[test]
    fn test_case_insensitive() {
        let verdict = default_gate().check("IMPORT   SUBPROCESS");
        assert!(!verdict.safe);
        assert_eq!(verdict.violation.as_deref(), Some(r"import\s+subprocess"));
    }

    #[test]
    fn test_first_match_wins() {
        // Both eval( and open( appear; eval comes first in the list
        let verdict = default_gate().check("open('x')\neval('1')");
        assert_eq!(verdict.violation.as_deref(), Some(r"eval\s*\("));
    }

    #[test]
    fn test_from_import_form() {
        let verdict = default_gate().check("from subprocess import run");
        assert!(!verdict.safe);
        assert_eq!(verdict.violation.as_deref(), Some(r"from\s+subprocess\s+import"));
    }

    #[test]
    fn test_raw_primitives_rejected() {
        for source in ["x = input()", "__import__('os')", "exec ('1')", "f = file('a')"] {
            assert!(!default_gate().check(source).safe, "{} should be rejected", source);
        }
    }

    #[test]
    fn test_lexical_match_is_textual() {
        // Patterns match inside strings and comments too
        let verdict = default_gate().check("# never call eval(x)\nprint('ok')");
        assert!(!verdict.safe);
    }

    #[test]
    fn test_reflection_bypass_is_not_caught() {
        // Documented limit: nothing forbidden is spelled out here
        let verdict = default_gate().check("b = getattr(print, '__self__')\nprint(b)");
        assert!(verdict.safe);
    }

    #[test]
    fn test_invalid_pattern_rejected_at_build() {
        let err = SafetyGate::new(["import\\s+(os"]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern { .. }));
    }

    #[test]
    fn test_deterministic() {
        let gate = default_gate();
        let source = "import socket";
        assert_eq!(gate.check(source), gate.check(source));
    }
}
