//! Built-in failure signature table.
//!
//! Order matters: a signature's position is its registration index, used as
//! the final tie-break when two candidates share confidence and severity.

use crate::diagnosis::{Category, FixerRole};
use regex::Regex;
use std::sync::LazyLock;

/// A known failure signature. Fires when any of its patterns is found.
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: String,
    pub description: String,
    pub category: Category,
    /// Static confidence attached to every candidate this signature emits.
    pub confidence: f64,
    pub target: FixerRole,
    patterns: Vec<Regex>,
}

impl Signature {
    pub fn new(
        id: &str,
        description: &str,
        category: Category,
        confidence: f64,
        target: FixerRole,
        patterns: &[&str],
    ) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: id.to_string(),
            description: description.to_string(),
            category,
            confidence,
            target,
            patterns,
        })
    }

    /// Source text of every pattern, for display.
    pub fn pattern_sources(&self) -> Vec<&str> {
        self.patterns.iter().map(|r| r.as_str()).collect()
    }

    /// Locate the first match in `text`, returning its byte range.
    pub fn find(&self, text: &str) -> Option<(usize, usize)> {
        self.patterns
            .iter()
            .filter_map(|r| r.find(text))
            .map(|m| (m.start(), m.end()))
            .min()
    }
}

struct SignatureSpec {
    id: &'static str,
    description: &'static str,
    category: Category,
    confidence: f64,
    target: FixerRole,
    patterns: &'static [&'static str],
}

const SIGNATURE_TABLE: &[SignatureSpec] = &[
    SignatureSpec {
        id: "python_syntax",
        description: "Python parser rejected a generated module",
        category: Category::SyntaxError,
        confidence: 0.9,
        target: FixerRole::Backend,
        patterns: &[
            r"SyntaxError: invalid syntax",
            r"SyntaxError: (?:unexpected EOF|unterminated|EOL while|expected|unmatched|invalid)",
            r"IndentationError",
            r"TabError",
        ],
    },
    SignatureSpec {
        id: "js_syntax",
        description: "JavaScript/TypeScript parser rejected a UI module",
        category: Category::SyntaxError,
        confidence: 0.85,
        target: FixerRole::Frontend,
        patterns: &[
            r"SyntaxError: Unexpected token",
            r"Unterminated (?:string|template|JSX)",
            r"Parsing error:",
        ],
    },
    SignatureSpec {
        id: "python_import",
        description: "Python module or name could not be imported",
        category: Category::ImportError,
        confidence: 0.85,
        target: FixerRole::Backend,
        patterns: &[
            r"ModuleNotFoundError",
            r"ImportError",
            r"No module named",
            r"cannot import name",
        ],
    },
    SignatureSpec {
        id: "js_module_resolution",
        description: "Bundler or Node could not resolve a UI dependency",
        category: Category::ImportError,
        confidence: 0.8,
        target: FixerRole::Frontend,
        patterns: &[
            r"Cannot find module",
            r"Module not found",
            r"Failed to resolve import",
        ],
    },
    SignatureSpec {
        id: "undefined_name",
        description: "Generated code references a name that was never defined or imported",
        category: Category::ImportError,
        confidence: 0.75,
        target: FixerRole::Backend,
        patterns: &[r"NameError: name '[^']+' is not defined"],
    },
    SignatureSpec {
        id: "endpoint_missing",
        description: "Request hit a route the API does not serve",
        category: Category::EndpointMissing,
        confidence: 0.8,
        target: FixerRole::Backend,
        patterns: &[
            r"\b404 Not Found\b",
            r"(?i)(?:status(?:_code)?|HTTP(?:/[\d.]+)?|response)[^\n]{0,20}\b404\b",
            r"\b(?:GET|POST|PUT|PATCH|DELETE)\s+/[^\n]{0,80}\b404\b",
            r"\bassert 404 == 20\d\b",
            r#""detail":\s*"Not Found""#,
            r"405 Method Not Allowed",
            r"No route matches",
        ],
    },
    SignatureSpec {
        id: "assertion",
        description: "A test assertion did not hold",
        category: Category::AssertionFailure,
        confidence: 0.7,
        target: FixerRole::Test,
        patterns: &[
            r"AssertionError",
            r"\bassert .+ == .+",
            r"Expected: .+\s+Received: .+",
        ],
    },
    SignatureSpec {
        id: "db_connection",
        description: "Database server unreachable or refused the connection",
        category: Category::ConnectionError,
        confidence: 0.85,
        target: FixerRole::Database,
        patterns: &[
            r"(?i)connection refused",
            r"(?i)could not connect to (?:server|database)",
            r"ECONNREFUSED",
            r"(?i)database connection (?:failed|timed out)",
        ],
    },
    SignatureSpec {
        id: "schema_mismatch",
        description: "Query references a table or column the schema lacks",
        category: Category::SchemaMismatch,
        confidence: 0.85,
        target: FixerRole::Database,
        patterns: &[
            r"no such table",
            r"no such column",
            r#"relation "[^"]+" does not exist"#,
            r#"column "[^"]+" (?:of relation "[^"]+" )?does not exist"#,
            r"UndefinedTable",
        ],
    },
    SignatureSpec {
        id: "type_mismatch",
        description: "Runtime type or attribute error in generated code",
        category: Category::TypeMismatch,
        confidence: 0.6,
        target: FixerRole::Backend,
        patterns: &[r"TypeError", r"AttributeError"],
    },
    SignatureSpec {
        id: "request_validation",
        description: "API rejected the request body",
        category: Category::ValidationError,
        confidence: 0.7,
        target: FixerRole::Backend,
        patterns: &[
            r"422 Unprocessable Entity",
            r"\b422\b",
            r"pydantic[._a-z]*ValidationError",
        ],
    },
    SignatureSpec {
        id: "test_setup",
        description: "Test collection or fixtures are broken",
        category: Category::TestSetupError,
        confidence: 0.65,
        target: FixerRole::Test,
        patterns: &[
            r"fixture '[^']+' not found",
            r"ERROR collecting",
            r"ImportError while loading conftest",
        ],
    },
];

static DEFAULT_SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    SIGNATURE_TABLE
        .iter()
        .map(|s| {
            Signature::new(
                s.id,
                s.description,
                s.category,
                s.confidence,
                s.target,
                s.patterns,
            )
            .expect("built-in signature patterns are valid regexes")
        })
        .collect()
});

/// The built-in signature table in registration order.
pub fn default_signatures() -> &'static [Signature] {
    &DEFAULT_SIGNATURES
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_signatures_compile() {
        assert_eq!(default_signatures().len(), SIGNATURE_TABLE.len());
    }

    #[test]
    fn test_signature_ids_are_unique() {
        let ids: HashSet<&str> = default_signatures().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), default_signatures().len());
    }

    #[test]
    fn test_signature_confidences_in_range() {
        for sig in default_signatures() {
            assert!(
                (0.0..=1.0).contains(&sig.confidence),
                "{} has confidence {}",
                sig.id,
                sig.confidence
            );
            assert_ne!(sig.target, FixerRole::ManualReview);
        }
    }

    #[test]
    fn test_signature_new_rejects_bad_regex() {
        let result = Signature::new(
            "broken",
            "",
            Category::Other,
            0.5,
            FixerRole::Backend,
            &["(unclosed"],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_find_returns_earliest_match() {
        let sig = Signature::new(
            "multi",
            "",
            Category::Other,
            0.5,
            FixerRole::Backend,
            &["beta", "alpha"],
        )
        .unwrap();
        assert_eq!(sig.find("xx alpha yy beta"), Some((3, 8)));
        assert_eq!(sig.find("gamma"), None);
    }
}
