//! End-to-end scenarios for the ambiguity-resolving preprocessor.
//!
//! Each case pairs a source document with the exact transformed text the
//! parser must receive. The property tests at the bottom hold over the whole
//! corpus: idempotence, delimiter pairing, and length accounting.

use bml_core::preprocessor::{insertions, preprocess, InsertionKind};
use pretty_assertions::assert_eq;

const CASES: &[(&str, &str)] = &[
    // Bare call wrapped
    ("extract Foo(item)", "extract [Foo(item)]"),
    // Already delimited: untouched
    ("extract [item]", "extract [item]"),
    // Named-parameter form: untouched
    ("extract p1, p2 [p1 + p2]", "extract p1, p2 [p1 + p2]"),
    // Continuation line at deeper indentation joins the expression
    (
        "extract Foo(item)\n    and Bar(item)",
        "extract [Foo(item)\n    and Bar(item)]",
    ),
    // Statement keyword on the next line terminates the expression
    (
        "extract Foo(item)\ntype Bar:",
        "extract [Foo(item)]\ntype Bar:",
    ),
    // Operator-led continuation
    (
        "extract base\n    + bonus\n    - deductions",
        "extract [base\n    + bonus\n    - deductions]",
    ),
    // Hyphenated continuation keyword
    (
        "extract amount\n    to-string",
        "extract [amount\n    to-string]",
    ),
    // Each functional keyword gets its own independent pair
    (
        "extract Foo(a)\nfilter Bar(b)\ncombine a + b",
        "extract [Foo(a)]\nfilter [Bar(b)]\ncombine [a + b]",
    ),
    // Nested keyword inside a bare expression
    ("extract filter Foo(x)", "extract [filter [Foo(x)]]"),
    // Comma at depth 0 ends the expression
    ("foo(extract a, b)", "foo(extract [a], b)"),
    // Commas inside groups do not
    ("extract Foo(a, b)", "extract [Foo(a, b)]"),
    // Switch-like keyword neutralizes depth-0 commas
    (
        "extract match s case Active: 1, case Dormant: 2",
        "extract [match s case Active: 1, case Dormant: 2]",
    ),
    // Trailing comment stays outside the delimiters
    (
        "extract Foo(item) // audit\ntype Bar:",
        "extract [Foo(item)] // audit\ntype Bar:",
    ),
    // Comment-only line between expression lines
    (
        "extract Foo(item)\n    // explain\n    and Bar(item)",
        "extract [Foo(item)\n    // explain\n    and Bar(item)]",
    ),
    // Keywords inside strings and comments never trigger
    ("\"extract Foo\"", "\"extract Foo\""),
    ("// extract Foo", "// extract Foo"),
    ("/* extract\nFoo */", "/* extract\nFoo */"),
    // Keyword as part of a longer identifier never triggers
    ("extraction x", "extraction x"),
    ("pre-extract x", "pre-extract x"),
    // Nothing after the keyword: nothing to wrap
    ("extract", "extract"),
    ("foo(extract)", "foo(extract)"),
    ("extract\ntype T:", "extract\ntype T:"),
    // Unterminated string degrades to end of document
    ("extract \"open", "extract [\"open]"),
];

#[test]
fn scenarios_transform_exactly() {
    for (input, expected) in CASES {
        assert_eq!(
            preprocess(input),
            *expected,
            "wrong transformation for {input:?}"
        );
    }
}

#[test]
fn preprocessing_is_idempotent() {
    for (input, _) in CASES {
        let once = preprocess(input);
        let twice = preprocess(&once);
        assert_eq!(twice, once, "second pass changed output for {input:?}");
    }
}

#[test]
fn every_open_has_a_close_strictly_after_it() {
    for (input, _) in CASES {
        let recorded = insertions(input);
        assert_eq!(recorded.len() % 2, 0, "odd insertion count for {input:?}");
        for pair in recorded.chunks(2) {
            assert_eq!(pair[0].kind, InsertionKind::Open);
            assert_eq!(pair[1].kind, InsertionKind::Close);
            assert!(
                pair[0].position < pair[1].position,
                "open not strictly before close for {input:?}"
            );
        }
    }
}

#[test]
fn output_length_is_input_plus_two_per_site() {
    for (input, _) in CASES {
        let sites = insertions(input).len() / 2;
        assert_eq!(
            preprocess(input).len(),
            input.len() + 2 * sites,
            "length accounting broken for {input:?}"
        );
    }
}

#[test]
fn insertions_never_land_inside_string_or_comment_spans() {
    // Spans computed by hand for a document mixing all three skip classes.
    let src = "extract \"a [ b\" + c // tail\nextract /* x ] */ d";
    let string_span = 8..15; // "a [ b"
    let line_comment_span = 20..27; // // tail
    let block_comment_span = 36..45; // /* x ] */

    for ins in insertions(src) {
        let p = ins.position;
        assert!(
            !(string_span.contains(&p) && p > string_span.start),
            "insertion at {p} inside string literal"
        );
        assert!(
            !(p > line_comment_span.start && p <= line_comment_span.end),
            "insertion at {p} inside line comment"
        );
        assert!(
            !(p > block_comment_span.start && p < block_comment_span.end),
            "insertion at {p} inside block comment"
        );
    }
}

#[test]
fn multi_line_document_combines_all_rules() {
    let src = "\
type Trade:
    amount: number

operation Total:
    in trade: Trade
    out result: number
    result := extract trade.amount
        + trade.amount // doubled
";
    let expected = "\
type Trade:
    amount: number

operation Total:
    in trade: Trade
    out result: number
    result := extract [trade.amount
        + trade.amount] // doubled
";
    assert_eq!(preprocess(src), expected);
}
