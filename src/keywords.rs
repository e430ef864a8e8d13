//! Keyword classification tables for the BML grammar.
//!
//! The preprocessor never consults the parser; everything it needs to know
//! about the token surface lives here.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Functional operator keywords that accept either a delimited inline
/// function (`extract [x + 1]`, `extract a, b [a + b]`) or a bare expression
/// (`extract x + 1`) that the preprocessor wraps.
pub static FUNCTIONAL_KEYWORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["extract", "filter", "combine"].into_iter().collect());

/// Reserved words that begin a statement. A bare expression never starts
/// with one of these.
pub static STATEMENT_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "type",
        "enum",
        "operation",
        "source",
        "rule",
        "import",
        "in",
        "out",
        "let",
        "with",
        "key",
    ]
    .into_iter()
    .collect()
});

/// Switch-like keywords. Once one is seen at nesting depth 0 inside a bare
/// expression, commas separate cases instead of terminating the expression.
pub static SWITCH_KEYWORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["match"].into_iter().collect());

/// Keywords that may begin a continuation line of a multi-line expression,
/// provided the line is indented at least to the expression's start column.
pub static CONTINUATION_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and",
        "or",
        "else",
        "then",
        "otherwise",
        "case",
        "to-string",
        "to-number",
    ]
    .into_iter()
    .collect()
});

/// Operator prefixes that mark a line as continuing the previous one.
/// Ordered longest-first so `..` wins over `.` and `<=` over `<`.
pub const CONTINUATION_OPERATORS: &[&str] = &[
    "..", ":=", "<=", ">=", "!=", ".", "=", "<", ">", "+", "-", "*", "/", "%",
];

/// True for characters that can appear inside an identifier. Hyphens are
/// identifier characters, so `to-string` is one word and `extract-all` does
/// not contain the keyword `extract`.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// True if the word is reserved in any keyword class, meaning it can never be
/// a parameter name or an ordinary identifier.
pub fn is_reserved(word: &str) -> bool {
    FUNCTIONAL_KEYWORDS.contains(word)
        || STATEMENT_KEYWORDS.contains(word)
        || SWITCH_KEYWORDS.contains(word)
        || CONTINUATION_KEYWORDS.contains(word)
}
