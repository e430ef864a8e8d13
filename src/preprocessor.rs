//! Ambiguity-resolving preprocessor
//!
//! The grammar only accepts the delimited inline-function form after the
//! functional operator keywords (`extract [x + 1]`). Source may also write a
//! bare expression (`extract x + 1`), which a predictive parser cannot
//! disambiguate. This pass rewrites every bare-expression site by wrapping
//! the expression in explicit `[` `]` delimiters, so the parser sees one
//! uniform shape.
//!
//! The transformation is purely textual and never fails: unterminated
//! strings or comments degrade to scanning to end of document, and the
//! resulting text is handed to the parser, which reports ordinary syntax
//! errors against it.
//!
//! ```
//! use bml_core::preprocessor::preprocess;
//!
//! assert_eq!(preprocess("extract Foo(item)"), "extract [Foo(item)]");
//! assert_eq!(preprocess("extract [item]"), "extract [item]");
//! assert_eq!(preprocess("extract p1, p2 [p1 + p2]"), "extract p1, p2 [p1 + p2]");
//! ```

use tracing::{debug, trace};

use crate::keywords::{
    is_ident_char, is_reserved, CONTINUATION_KEYWORDS, CONTINUATION_OPERATORS,
    FUNCTIONAL_KEYWORDS, STATEMENT_KEYWORDS, SWITCH_KEYWORDS,
};

// =============================================================================
// PUBLIC API
// =============================================================================

/// One delimiter splice into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Byte offset in the original text the delimiter is inserted before
    pub position: usize,
    pub kind: InsertionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionKind {
    Open,
    Close,
}

/// Rewrite every bare-expression site after a functional operator keyword
/// into the explicitly delimited form.
///
/// The output length is exactly `input + 2N` bytes for `N` rewritten sites.
/// Running the preprocessor on its own output is a no-op.
pub fn preprocess(source: &str) -> String {
    let insertions = insertions(source);
    debug!(sites = insertions.len() / 2, "preprocessed document");
    apply(source, insertions)
}

/// Compute the delimiter insertions without applying them.
///
/// Every `Open` is paired with exactly one `Close` at a strictly greater
/// position, and no insertion lands inside a string literal or comment span.
pub fn insertions(source: &str) -> Vec<Insertion> {
    Scanner::new(source).scan()
}

/// Splice insertions in one pass over the position-sorted list
fn apply(source: &str, mut insertions: Vec<Insertion>) -> String {
    // At equal positions a close is emitted before an open, so an inner
    // expression's close never migrates right of a sibling's open.
    insertions.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| match (a.kind, b.kind) {
                (InsertionKind::Close, InsertionKind::Open) => std::cmp::Ordering::Less,
                (InsertionKind::Open, InsertionKind::Close) => std::cmp::Ordering::Greater,
                _ => std::cmp::Ordering::Equal,
            })
    });

    let mut out = String::with_capacity(source.len() + insertions.len());
    let mut last = 0;
    for ins in &insertions {
        out.push_str(&source[last..ins.position]);
        out.push(match ins.kind {
            InsertionKind::Open => '[',
            InsertionKind::Close => ']',
        });
        last = ins.position;
    }
    out.push_str(&source[last..]);
    out
}

// =============================================================================
// SCANNER
// =============================================================================

/// Outcome of the next-line continuation check
enum LineDecision {
    Continues,
    Ends,
}

struct Scanner<'a> {
    src: &'a str,
    /// (byte offset, char) for the whole document; scanning needs arbitrary
    /// lookahead, so the indexable form beats a peekable iterator here
    chars: Vec<(usize, char)>,
    insertions: Vec<Insertion>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            insertions: Vec::new(),
        }
    }

    fn scan(mut self) -> Vec<Insertion> {
        let mut i = 0;
        while i < self.chars.len() {
            let (_, c) = self.chars[i];
            if c == '"' {
                i = self.skip_string(i);
            } else if self.starts_line_comment(i) {
                i = self.line_comment_end(i);
            } else if self.starts_block_comment(i) {
                i = self.skip_block_comment(i);
            } else if is_ident_char(c) {
                let end = self.word_end(i);
                let word = self.text(i, end);
                if FUNCTIONAL_KEYWORDS.contains(word) {
                    self.handle_keyword(i, end);
                }
                // Scanning resumes past the keyword's end, so nested
                // occurrences inside the expression get their own pair.
                i = end;
            } else {
                i += 1;
            }
        }
        self.insertions
    }

    /// Decide whether the keyword at `kw_start..kw_end` is followed by a bare
    /// expression, and if so record its delimiter pair.
    fn handle_keyword(&mut self, kw_start: usize, kw_end: usize) {
        let Some(expr_start) = self.bare_expression_start(kw_end) else {
            return;
        };
        let open_at = self.chars[expr_start].0;
        let close_at = self.expression_end(expr_start, self.column_of(kw_start));
        trace!(open_at, close_at, "wrapping bare expression");
        self.insertions.push(Insertion {
            position: open_at,
            kind: InsertionKind::Open,
        });
        self.insertions.push(Insertion {
            position: close_at,
            kind: InsertionKind::Close,
        });
    }

    /// Classify what follows the keyword. Returns the char index where a bare
    /// expression starts, or `None` when nothing is to be wrapped:
    /// already-delimited form, named-parameter form, end of input, a reserved
    /// statement keyword, or an externally-owned closing delimiter.
    fn bare_expression_start(&self, kw_end: usize) -> Option<usize> {
        let i = self.skip_trivia(kw_end);
        if i >= self.chars.len() {
            return None;
        }
        match self.chars[i].1 {
            '[' => None,
            ')' | ']' | '}' | ',' => None,
            c if is_ident_char(c) => {
                let word = self.text(i, self.word_end(i));
                if STATEMENT_KEYWORDS.contains(word) {
                    return None;
                }
                if !is_reserved(word) && self.is_named_parameter_form(i) {
                    return None;
                }
                Some(i)
            }
            _ => Some(i),
        }
    }

    /// `kw ident [ ... ]` or `kw ident, ident, ... [ ... ]`. An identifier
    /// list that never reaches an open delimiter is an ordinary bare
    /// expression that happens to start with an identifier.
    fn is_named_parameter_form(&self, first_ident: usize) -> bool {
        let mut i = first_ident;
        loop {
            let end = self.word_end(i);
            if is_reserved(self.text(i, end)) {
                return false;
            }
            let next = self.skip_trivia(end);
            match self.chars.get(next).map(|c| c.1) {
                Some('[') => return true,
                Some(',') => {
                    let after = self.skip_trivia(next + 1);
                    match self.chars.get(after).map(|c| c.1) {
                        Some(c) if is_ident_char(c) => i = after,
                        _ => return false,
                    }
                }
                _ => return false,
            }
        }
    }

    /// Forward-scan the bare expression and return the byte offset for its
    /// closing delimiter.
    ///
    /// Tracks group nesting; at depth 0 a comma (outside a switch-like
    /// expression), an externally-owned closing delimiter, or a
    /// non-continuation line break ends the expression. End of input always
    /// ends it.
    fn expression_end(&self, expr_start: usize, anchor_col: usize) -> usize {
        let expr_start_byte = self.chars[expr_start].0;
        let mut depth = 0usize;
        let mut switch_seen = false;
        // Set while the tail of the current line is a // comment, so a close
        // at the line break can land in front of it.
        let mut trailing_comment: Option<usize> = None;

        let mut i = expr_start;
        while i < self.chars.len() {
            let (byte, c) = self.chars[i];
            match c {
                '"' => {
                    i = self.skip_string(i);
                    trailing_comment = None;
                }
                '/' if self.starts_line_comment(i) => {
                    trailing_comment = Some(byte);
                    i = self.line_comment_end(i);
                }
                '/' if self.starts_block_comment(i) => {
                    i = self.skip_block_comment(i);
                    trailing_comment = None;
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    trailing_comment = None;
                    i += 1;
                }
                ')' | ']' | '}' => {
                    if depth == 0 {
                        return self.close_position(expr_start_byte, byte, None);
                    }
                    depth -= 1;
                    trailing_comment = None;
                    i += 1;
                }
                ',' => {
                    if depth == 0 && !switch_seen {
                        return self.close_position(expr_start_byte, byte, None);
                    }
                    trailing_comment = None;
                    i += 1;
                }
                '\n' => {
                    if depth > 0 {
                        trailing_comment = None;
                        i += 1;
                        continue;
                    }
                    match self.line_continues(i + 1, anchor_col) {
                        LineDecision::Continues => {
                            trailing_comment = None;
                            i += 1;
                        }
                        LineDecision::Ends => {
                            return self.close_position(expr_start_byte, byte, trailing_comment);
                        }
                    }
                }
                ' ' | '\t' | '\r' => i += 1,
                c if is_ident_char(c) => {
                    let end = self.word_end(i);
                    if depth == 0 && SWITCH_KEYWORDS.contains(self.text(i, end)) {
                        switch_seen = true;
                    }
                    trailing_comment = None;
                    i = end;
                }
                _ => {
                    trailing_comment = None;
                    i += 1;
                }
            }
        }
        self.close_position(expr_start_byte, self.src.len(), trailing_comment)
    }

    /// Final byte offset for a closing delimiter: in front of the trailing
    /// comment when one ends the line, then backed up over horizontal
    /// whitespace, never left of the expression start.
    fn close_position(&self, expr_start: usize, terminator: usize, comment: Option<usize>) -> usize {
        let mut pos = comment.unwrap_or(terminator);
        let bytes = self.src.as_bytes();
        while pos > expr_start {
            match bytes[pos - 1] {
                b' ' | b'\t' | b'\r' => pos -= 1,
                _ => break,
            }
        }
        pos.max(expr_start)
    }

    /// Decide whether the line starting at `line_start` (the char index right
    /// after a depth-0 line break) continues the expression. Comment-only
    /// lines directly after the break are skipped before deciding.
    fn line_continues(&self, mut line_start: usize, anchor_col: usize) -> LineDecision {
        loop {
            let first = self.skip_horizontal(line_start);
            match self.chars.get(first) {
                None => return LineDecision::Ends,
                // Blank line: no token to continue with.
                Some((_, '\n')) => return LineDecision::Ends,
                _ => {}
            }

            if self.starts_line_comment(first) {
                // A // comment owns the rest of the line; comment-only.
                let end = self.line_comment_end(first);
                match self.chars.get(end) {
                    Some(_) => {
                        line_start = end + 1;
                        continue;
                    }
                    None => return LineDecision::Ends,
                }
            }

            let col = first - line_start;
            if self.starts_block_comment(first) {
                let after = self.skip_block_comment(first);
                let rest = self.skip_horizontal(after);
                match self.chars.get(rest) {
                    None => return LineDecision::Ends,
                    Some((_, '\n')) => {
                        // Comment-only (possibly multi-line); keep skipping.
                        line_start = rest + 1;
                        continue;
                    }
                    // Content after an inline block comment: the comment
                    // opener was the first token, so indentation decides.
                    Some(_) => return self.indent_decision(col, anchor_col),
                }
            }

            return self.real_line_decision(first, col, anchor_col);
        }
    }

    fn real_line_decision(&self, first: usize, col: usize, anchor_col: usize) -> LineDecision {
        for op in CONTINUATION_OPERATORS {
            if self.matches_at(first, op) {
                return LineDecision::Continues;
            }
        }
        if is_ident_char(self.chars[first].1) {
            let word = self.text(first, self.word_end(first));
            if CONTINUATION_KEYWORDS.contains(word) && col >= anchor_col {
                return LineDecision::Continues;
            }
        }
        self.indent_decision(col, anchor_col)
    }

    fn indent_decision(&self, col: usize, anchor_col: usize) -> LineDecision {
        if col > anchor_col {
            LineDecision::Continues
        } else {
            LineDecision::Ends
        }
    }

    // =========================================================================
    // LOW-LEVEL SCANNING
    // =========================================================================

    fn text(&self, start: usize, end: usize) -> &'a str {
        let from = self.chars[start].0;
        let to = self
            .chars
            .get(end)
            .map(|c| c.0)
            .unwrap_or_else(|| self.src.len());
        &self.src[from..to]
    }

    fn word_end(&self, start: usize) -> usize {
        let mut i = start;
        while i < self.chars.len() && is_ident_char(self.chars[i].1) {
            i += 1;
        }
        i
    }

    /// Column of a char index: characters back to the previous line break
    fn column_of(&self, index: usize) -> usize {
        let mut col = 0;
        let mut i = index;
        while i > 0 && self.chars[i - 1].1 != '\n' {
            col += 1;
            i -= 1;
        }
        col
    }

    fn matches_at(&self, index: usize, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(k, expected)| self.chars.get(index + k).map(|c| c.1) == Some(expected))
    }

    fn starts_line_comment(&self, index: usize) -> bool {
        self.matches_at(index, "//")
    }

    fn starts_block_comment(&self, index: usize) -> bool {
        self.matches_at(index, "/*")
    }

    /// Index past a string literal opened at `index`. An unterminated string
    /// runs to end of input.
    fn skip_string(&self, index: usize) -> usize {
        let mut i = index + 1;
        while i < self.chars.len() {
            match self.chars[i].1 {
                '"' => return i + 1,
                '\\' => i += 2,
                _ => i += 1,
            }
        }
        self.chars.len()
    }

    /// Index of the line break ending a // comment (the break itself is not
    /// part of the comment), or end of input.
    fn line_comment_end(&self, index: usize) -> usize {
        let mut i = index;
        while i < self.chars.len() && self.chars[i].1 != '\n' {
            i += 1;
        }
        i
    }

    /// Index past a block comment opened at `index`; unterminated comments
    /// run to end of input.
    fn skip_block_comment(&self, index: usize) -> usize {
        let mut i = index + 2;
        while i < self.chars.len() {
            if self.matches_at(i, "*/") {
                return i + 2;
            }
            i += 1;
        }
        self.chars.len()
    }

    /// Skip whitespace (including line breaks) and comments
    fn skip_trivia(&self, mut index: usize) -> usize {
        while index < self.chars.len() {
            let c = self.chars[index].1;
            if c.is_whitespace() {
                index += 1;
            } else if self.starts_line_comment(index) {
                index = self.line_comment_end(index);
            } else if self.starts_block_comment(index) {
                index = self.skip_block_comment(index);
            } else {
                break;
            }
        }
        index
    }

    /// Skip spaces and tabs only
    fn skip_horizontal(&self, mut index: usize) -> usize {
        while index < self.chars.len() {
            match self.chars[index].1 {
                ' ' | '\t' | '\r' => index += 1,
                _ => break,
            }
        }
        index
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bare_call_is_wrapped() {
        assert_eq!(preprocess("extract Foo(item)"), "extract [Foo(item)]");
    }

    #[test]
    fn test_delimited_form_unchanged() {
        assert_eq!(preprocess("extract [item]"), "extract [item]");
    }

    #[test]
    fn test_named_parameter_form_unchanged() {
        assert_eq!(
            preprocess("extract p1, p2 [p1 + p2]"),
            "extract p1, p2 [p1 + p2]"
        );
    }

    #[test]
    fn test_named_parameter_list_across_lines() {
        let src = "extract p1,\n    p2 [p1 + p2]";
        assert_eq!(preprocess(src), src);
    }

    #[test]
    fn test_single_identifier_expression() {
        assert_eq!(preprocess("extract item"), "extract [item]");
    }

    #[test]
    fn test_continuation_line_included() {
        let src = "extract Foo(item)\n    and Bar(item)";
        assert_eq!(preprocess(src), "extract [Foo(item)\n    and Bar(item)]");
    }

    #[test]
    fn test_statement_keyword_terminates() {
        let src = "extract Foo(item)\ntype Bar:";
        assert_eq!(preprocess(src), "extract [Foo(item)]\ntype Bar:");
    }

    #[test]
    fn test_operator_start_continues() {
        let src = "extract total\n+ bonus";
        assert_eq!(preprocess(src), "extract [total\n+ bonus]");
    }

    #[test]
    fn test_deeper_indent_continues() {
        let src = "extract total\n    bonus";
        assert_eq!(preprocess(src), "extract [total\n    bonus]");
    }

    #[test]
    fn test_keyword_in_string_ignored() {
        let src = "\"extract Foo(item)\"";
        assert_eq!(preprocess(src), src);
    }

    #[test]
    fn test_keyword_in_line_comment_ignored() {
        let src = "// extract Foo(item)";
        assert_eq!(preprocess(src), src);
    }

    #[test]
    fn test_keyword_in_block_comment_ignored() {
        let src = "/* extract Foo(item) */";
        assert_eq!(preprocess(src), src);
    }

    #[test]
    fn test_keyword_inside_identifier_ignored() {
        assert_eq!(preprocess("extraction of x"), "extraction of x");
        assert_eq!(preprocess("re-extract x"), "re-extract x");
    }

    #[test]
    fn test_comma_terminates_expression() {
        assert_eq!(preprocess("foo(extract a, b)"), "foo(extract [a], b)");
    }

    #[test]
    fn test_external_closer_terminates() {
        assert_eq!(preprocess("(extract a + b)"), "(extract [a + b])");
    }

    #[test]
    fn test_keyword_at_end_of_input() {
        assert_eq!(preprocess("extract"), "extract");
        assert_eq!(preprocess("extract   "), "extract   ");
    }

    #[test]
    fn test_keyword_before_closer_skipped() {
        assert_eq!(preprocess("foo(extract)"), "foo(extract)");
    }

    #[test]
    fn test_statement_keyword_after_operator_keyword() {
        assert_eq!(preprocess("extract\ntype Foo:"), "extract\ntype Foo:");
    }

    #[test]
    fn test_switch_keyword_neutralizes_commas() {
        let src = "extract match status case Active: 1, case Dormant: 2";
        assert_eq!(
            preprocess(src),
            "extract [match status case Active: 1, case Dormant: 2]"
        );
    }

    #[test]
    fn test_trailing_comment_excluded_from_expression() {
        let src = "extract Foo(item) // note\ntype Bar:";
        assert_eq!(preprocess(src), "extract [Foo(item)] // note\ntype Bar:");
    }

    #[test]
    fn test_comment_only_line_skipped_for_continuation() {
        let src = "extract Foo(item)\n// note\n    and Bar(item)";
        assert_eq!(
            preprocess(src),
            "extract [Foo(item)\n// note\n    and Bar(item)]"
        );
    }

    #[test]
    fn test_nested_keywords_get_independent_pairs() {
        assert_eq!(
            preprocess("extract filter Foo(x)"),
            "extract [filter [Foo(x)]]"
        );
    }

    #[test]
    fn test_two_sites_on_separate_lines() {
        let src = "extract Foo(a)\nfilter Bar(b)";
        assert_eq!(preprocess(src), "extract [Foo(a)]\nfilter [Bar(b)]");
    }

    #[test]
    fn test_unterminated_string_degrades_to_eof() {
        let src = "extract \"unterminated";
        assert_eq!(preprocess(src), "extract [\"unterminated]");
    }

    #[test]
    fn test_unterminated_block_comment_no_insertion() {
        let src = "/* extract Foo(item)";
        assert_eq!(preprocess(src), src);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let inputs = [
            "extract Foo(item)",
            "extract Foo(item)\n    and Bar(item)",
            "extract match s case A: 1, case B: 2",
            "foo(extract a, b)",
            "extract filter Foo(x)",
        ];
        for src in inputs {
            let once = preprocess(src);
            assert_eq!(preprocess(&once), once, "not idempotent for {src:?}");
        }
    }

    #[test]
    fn test_insertions_are_paired_and_ordered() {
        let ins = insertions("extract Foo(a)\nfilter Bar(b)\ncombine a + b");
        let opens = ins
            .iter()
            .filter(|i| i.kind == InsertionKind::Open)
            .count();
        let closes = ins
            .iter()
            .filter(|i| i.kind == InsertionKind::Close)
            .count();
        assert_eq!(opens, 3);
        assert_eq!(opens, closes);
        // Pairs are pushed open-then-close with open strictly first.
        for pair in ins.chunks(2) {
            assert_eq!(pair[0].kind, InsertionKind::Open);
            assert_eq!(pair[1].kind, InsertionKind::Close);
            assert!(pair[0].position < pair[1].position);
        }
    }

    #[test]
    fn test_output_length_is_input_plus_two_per_site() {
        let src = "extract Foo(a)\nfilter Bar(b)";
        assert_eq!(preprocess(src).len(), src.len() + 4);
    }
}
