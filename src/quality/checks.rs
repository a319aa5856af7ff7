//! Structural checks over generated artifacts.
//!
//! Each check applies to some artifact kinds and carries a fixed category,
//! confidence and target. The kind is inferred from the artifact path.

use crate::diagnosis::{Category, FixerRole};
use regex::Regex;
use std::sync::LazyLock;

/// What a generated artifact is, inferred from its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Schema,
    Api,
    Ui,
    Test,
    Other,
}

impl ArtifactKind {
    /// Infer the kind from a path such as `app/routes/users.py` or `src/components/App.tsx`.
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase().replace('\\', "/");
        let file = lower.rsplit('/').next().unwrap_or(&lower);
        let ext = file.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        let in_dir = |dir: &str| lower.starts_with(&format!("{}/", dir)) || lower.contains(&format!("/{}/", dir));

        if file.starts_with("test_")
            || file.ends_with("_test.py")
            || file.contains(".test.")
            || file.contains(".spec.")
            || in_dir("tests")
            || in_dir("__tests__")
        {
            return Self::Test;
        }
        if matches!(ext, "jsx" | "tsx" | "vue" | "svelte")
            || (matches!(ext, "js" | "ts") && (in_dir("components") || in_dir("pages")))
        {
            return Self::Ui;
        }
        if matches!(ext, "sql" | "prisma")
            || matches!(file, "models.py" | "schema.py" | "database.py")
            || (ext == "py" && (in_dir("models") || in_dir("migrations")))
        {
            return Self::Schema;
        }
        if matches!(
            file,
            "main.py" | "app.py" | "api.py" | "routes.py" | "views.py" | "endpoints.py" | "server.js" | "server.ts"
        ) || (matches!(ext, "py" | "js" | "ts")
            && (in_dir("routes") || in_dir("routers") || in_dir("api") || in_dir("endpoints")))
        {
            return Self::Api;
        }
        Self::Other
    }

    /// Fixer that owns artifacts of this kind.
    pub fn owner(self) -> FixerRole {
        match self {
            Self::Schema => FixerRole::Database,
            Self::Api | Self::Other => FixerRole::Backend,
            Self::Ui => FixerRole::Frontend,
            Self::Test => FixerRole::Test,
        }
    }
}

/// A loaded artifact handed to check predicates.
#[derive(Debug, Clone)]
pub struct Artifact<'a> {
    pub path: &'a str,
    pub kind: ArtifactKind,
    pub content: &'a str,
}

impl Artifact<'_> {
    fn extension(&self) -> &str {
        self.path.rsplit_once('.').map(|(_, e)| e).unwrap_or("")
    }
}

/// A predicate over one artifact plus the candidate it produces when it fires.
#[derive(Debug, Clone)]
pub struct QualityCheck {
    pub id: &'static str,
    pub description: &'static str,
    pub applies_to: &'static [ArtifactKind],
    pub category: Category,
    pub confidence: f64,
    pub target: FixerRole,
    /// Returns true when the artifact has the defect.
    pub defect: fn(&Artifact<'_>) -> bool,
}

impl QualityCheck {
    pub fn applies(&self, kind: ArtifactKind) -> bool {
        self.applies_to.contains(&kind)
    }
}

static ROUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@\w+\.(?:get|post|put|patch|delete|route|api_route)\b|APIRouter\(|add_url_rule|\b(?:app|router)\.(?:get|post|put|patch|delete|use)\(",
    )
    .unwrap()
});

static TABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)create\s+table|__tablename__|\bTable\(|models\.Model|^\s*class \w+\(.*\bBase\)|^\s*model \w+ \{")
        .unwrap()
});

static EXPORT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\b|module\.exports|<template>").unwrap());

static TEST_CASE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdef test_\w*|\b(?:it|test|describe)\(").unwrap());

fn unbalanced(artifact: &Artifact<'_>) -> bool {
    let style = match CommentStyle::for_extension(artifact.extension()) {
        CommentStyle::Slash if artifact.kind == ArtifactKind::Ui => CommentStyle::Jsx,
        style => style,
    };
    !delimiters_balanced(artifact.content, style)
}

fn missing_routes(artifact: &Artifact<'_>) -> bool {
    !ROUTE_REGEX.is_match(artifact.content)
}

fn missing_tables(artifact: &Artifact<'_>) -> bool {
    !TABLE_REGEX.is_match(artifact.content)
}

fn missing_export(artifact: &Artifact<'_>) -> bool {
    !EXPORT_REGEX.is_match(artifact.content)
}

fn missing_test_cases(artifact: &Artifact<'_>) -> bool {
    !TEST_CASE_REGEX.is_match(artifact.content)
}

/// Built-in checks in registration order.
pub const DEFAULT_CHECKS: &[QualityCheck] = &[
    QualityCheck {
        id: "unbalanced_delimiters_backend",
        description: "Backend module has unbalanced brackets or braces",
        applies_to: &[ArtifactKind::Api, ArtifactKind::Schema],
        category: Category::SyntaxError,
        confidence: 0.75,
        target: FixerRole::Backend,
        defect: unbalanced,
    },
    QualityCheck {
        id: "unbalanced_delimiters_ui",
        description: "UI component has unbalanced brackets or braces",
        applies_to: &[ArtifactKind::Ui],
        category: Category::SyntaxError,
        confidence: 0.75,
        target: FixerRole::Frontend,
        defect: unbalanced,
    },
    QualityCheck {
        id: "unbalanced_delimiters_test",
        description: "Test module has unbalanced brackets or braces",
        applies_to: &[ArtifactKind::Test],
        category: Category::SyntaxError,
        confidence: 0.75,
        target: FixerRole::Test,
        defect: unbalanced,
    },
    QualityCheck {
        id: "schema_without_tables",
        description: "Schema artifact defines no tables or models",
        applies_to: &[ArtifactKind::Schema],
        category: Category::SchemaMismatch,
        confidence: 0.7,
        target: FixerRole::Database,
        defect: missing_tables,
    },
    QualityCheck {
        id: "api_without_routes",
        description: "API module registers no routes",
        applies_to: &[ArtifactKind::Api],
        category: Category::EndpointMissing,
        confidence: 0.65,
        target: FixerRole::Backend,
        defect: missing_routes,
    },
    QualityCheck {
        id: "ui_without_export",
        description: "UI component exports nothing",
        applies_to: &[ArtifactKind::Ui],
        category: Category::MissingSection,
        confidence: 0.6,
        target: FixerRole::Frontend,
        defect: missing_export,
    },
    QualityCheck {
        id: "test_without_cases",
        description: "Test module contains no test cases",
        applies_to: &[ArtifactKind::Test],
        category: Category::TestSetupError,
        confidence: 0.6,
        target: FixerRole::Test,
        defect: missing_test_cases,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `#` line comments, triple-quoted strings.
    Hash,
    /// `//` and `/* */` comments, template literals.
    Slash,
    /// `--` line comments.
    Sql,
    /// `Slash` plus JSX: quotes in element text are literal characters.
    Jsx,
}

impl CommentStyle {
    pub fn for_extension(ext: &str) -> Self {
        match ext {
            "py" => Self::Hash,
            "sql" => Self::Sql,
            "jsx" | "tsx" => Self::Jsx,
            _ => Self::Slash,
        }
    }
}

/// Whether `()`, `[]` and `{}` nest correctly outside strings and comments.
pub fn delimiters_balanced(content: &str, style: CommentStyle) -> bool {
    let chars: Vec<char> = content.chars().collect();
    let mut stack: Vec<char> = Vec::new();
    let mut frames = vec![JsxFrame::default()];
    let slash = matches!(style, CommentStyle::Slash | CommentStyle::Jsx);
    let jsx = style == CommentStyle::Jsx;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let in_text = jsx && frames.last().is_some_and(JsxFrame::in_text);

        // Element text: quotes, comment markers and stray brackets are literal.
        if in_text && c != '<' && c != '{' {
            i += 1;
            continue;
        }

        if jsx && c == '<' && (in_text || opens_tag(&chars, i)) {
            if let Some(frame) = frames.last_mut() {
                frame.tag = Some((stack.len(), next == Some('/')));
            }
            i += 1;
            continue;
        }
        if jsx && c == '>' {
            if let Some(frame) = frames.last_mut() {
                if let Some((base, closing)) = frame.tag {
                    if base == stack.len() {
                        if closing {
                            frame.elements = frame.elements.saturating_sub(1);
                        } else if i == 0 || chars[i - 1] != '/' {
                            frame.elements += 1;
                        }
                        frame.tag = None;
                        i += 1;
                        continue;
                    }
                }
            }
        }

        match (style, c, next) {
            (CommentStyle::Hash, '#', _) | (CommentStyle::Sql, '-', Some('-')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            (_, '/', Some('/')) if slash => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            (_, '/', Some('*')) if slash => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            _ => {}
        }

        match c {
            '"' | '\'' if style == CommentStyle::Hash && starts_triple(&chars, i, c) => {
                i += 3;
                while i < chars.len() && !starts_triple(&chars, i, c) {
                    i += 1;
                }
                i += 3;
                continue;
            }
            '"' | '\'' => {
                i = skip_string(&chars, i + 1, c, false);
                continue;
            }
            '`' if slash => {
                i = skip_string(&chars, i + 1, c, true);
                continue;
            }
            '{' if jsx => {
                stack.push(c);
                frames.push(JsxFrame {
                    opened_at: stack.len(),
                    ..Default::default()
                });
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                let depth = stack.len();
                if stack.pop() != Some(expected) {
                    return false;
                }
                if c == '}' && frames.len() > 1 && frames.last().is_some_and(|f| f.opened_at == depth) {
                    frames.pop();
                }
            }
            _ => {}
        }
        i += 1;
    }

    stack.is_empty()
}

/// JSX markup state within one `{}` block (or the whole file).
#[derive(Debug, Default)]
struct JsxFrame {
    /// Elements opened and not yet closed in this block.
    elements: usize,
    /// Bracket depth where the current tag started, and whether it is a closing tag.
    tag: Option<(usize, bool)>,
    /// Bracket depth of the `{` that opened this block.
    opened_at: usize,
}

impl JsxFrame {
    fn in_text(&self) -> bool {
        self.tag.is_none() && self.elements > 0
    }
}

/// `<` starts a tag when followed by a name, `/` or `>` and not glued to an
/// identifier (`useState<T>`, `a<b`).
fn opens_tag(chars: &[char], i: usize) -> bool {
    let next_ok = chars
        .get(i + 1)
        .is_some_and(|n| n.is_ascii_alphabetic() || *n == '/' || *n == '>');
    let prev_ok = i == 0 || {
        let prev = chars[i - 1];
        !(prev.is_alphanumeric() || matches!(prev, '_' | '$' | '.' | ')' | ']'))
    };
    next_ok && prev_ok
}

fn starts_triple(chars: &[char], i: usize, quote: char) -> bool {
    chars.len() >= i + 3 && chars[i..i + 3].iter().all(|&c| c == quote)
}

/// Index just past the closing quote. Single-line strings also end at a newline.
fn skip_string(chars: &[char], mut i: usize, quote: char, multiline: bool) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' if !multiline => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}
