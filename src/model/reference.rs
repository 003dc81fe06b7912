//! The `${ref(...)}` token language.
//!
//! Expressions point at other project entities with `${ref(name)}` or
//! `${ref(name).property}`. Names may be bare or quoted with single or
//! double quotes; the property is an identifier (a column, or a metric or
//! dimension nested in the named model).
//!
//! Entity fields that hold a single reference (a model's source, a trace's
//! model) also accept the short `ref(name)` form or a plain name.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static REF_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\$\{\s*ref\(\s*(?:'([^']+)'|"([^"]+)"|([^)'"]+?))\s*\)(?:\.([A-Za-z_][A-Za-z0-9_]*))?\s*\}"#,
    )
    .unwrap()
});

static REF_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:\$\{\s*)?ref\(\s*['"]?([^'")]+?)['"]?\s*\)(?:\s*\})?\s*$"#).unwrap()
});

static REF_SYNTAX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bref\s*\(").unwrap());

/// One `${ref(...)}` occurrence inside an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefToken {
    /// Referenced entity name.
    pub name: String,
    /// Text after the closing parenthesis, if any (`${ref(orders).amount}` -> `amount`).
    pub property: Option<String>,
    /// Byte range of the whole token in the source text.
    pub span: Range<usize>,
}

impl RefToken {
    /// `name` or `name.property`.
    pub fn qualified_name(&self) -> String {
        match &self.property {
            Some(property) => format!("{}.{}", self.name, property),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for RefToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.property {
            Some(property) => write!(f, "${{ref({}).{}}}", self.name, property),
            None => write!(f, "${{ref({})}}", self.name),
        }
    }
}

/// Extract every `${ref(...)}` token from `text`, in order of appearance.
pub fn extract_refs(text: &str) -> Vec<RefToken> {
    REF_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))?
                .as_str()
                .trim()
                .to_string();
            Some(RefToken {
                name,
                property: caps.get(4).map(|m| m.as_str().to_string()),
                span: whole.range(),
            })
        })
        .collect()
}

/// Whether `text` contains at least one well-formed `${ref(...)}` token.
pub fn has_refs(text: &str) -> bool {
    REF_TOKEN.is_match(text)
}

/// Whether `text` uses `ref(` anywhere, well-formed or not.
pub fn contains_ref_syntax(text: &str) -> bool {
    REF_SYNTAX.is_match(text)
}

/// Replace every token in `text` with the callback's output.
///
/// Returning `Ok(None)` keeps the token text as written.
pub fn replace_refs<E, F>(text: &str, mut replace: F) -> Result<String, E>
where
    F: FnMut(&RefToken) -> Result<Option<String>, E>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in extract_refs(text) {
        out.push_str(&text[last..token.span.start]);
        match replace(&token)? {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(&text[token.span.clone()]),
        }
        last = token.span.end;
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Name held by a single-reference field: `ref(x)`, `${ref(x)}` or plain `x`.
pub fn ref_name(field: &str) -> String {
    match REF_FIELD.captures(field) {
        Some(caps) => caps[1].trim().to_string(),
        None => field.trim().to_string(),
    }
}
