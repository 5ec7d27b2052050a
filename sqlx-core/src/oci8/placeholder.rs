//! Placeholder discovery in statement text.
//!
//! Only the parts of a statement outside string literals, quoted identifiers
//! and comments are searched, so `'?'`, `"A:B"` or `-- :x` never count.

use std::borrow::Cow;
use std::ops::Range;

use memchr::memmem;
use smallvec::SmallVec;

use crate::oci8::options::PlaceholderStyle;

type Spans = SmallVec<[Range<usize>; 8]>;

/// Statement text ready for prepare plus the placeholders it binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedSql<'q> {
    pub(crate) sql: Cow<'q, str>,
    /// Placeholder names (without colon) in position order. A SQL statement
    /// has one position per occurrence; a PL/SQL block one per distinct name.
    pub(crate) names: SmallVec<[String; 8]>,
}

impl ParsedSql<'_> {
    pub(crate) fn placeholder_count(&self) -> usize {
        self.names.len()
    }
}

pub(crate) fn parse(sql: &str, style: PlaceholderStyle) -> ParsedSql<'_> {
    match style {
        PlaceholderStyle::QuestionMark => rewrite_question_marks(sql),
        PlaceholderStyle::Named => ParsedSql {
            names: named_placeholders(sql),
            sql: Cow::Borrowed(sql),
        },
    }
}

/// Byte ranges of `sql` that are neither literals nor comments.
fn code_spans(sql: &str) -> Spans {
    let bytes = sql.as_bytes();
    let mut spans = Spans::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let skip_to = match bytes[i] {
            b'\'' => Some(skip_quoted(bytes, i + 1, b'\'')),
            b'"' => Some(skip_quoted(bytes, i + 1, b'"')),
            b'-' if bytes.get(i + 1) == Some(&b'-') => Some(
                memchr::memchr(b'\n', &bytes[i..])
                    .map(|n| i + n + 1)
                    .unwrap_or(bytes.len()),
            ),
            b'/' if bytes.get(i + 1) == Some(&b'*') => Some(
                memmem::find(&bytes[i + 2..], b"*/")
                    .map(|n| i + 2 + n + 2)
                    .unwrap_or(bytes.len()),
            ),
            _ => None,
        };

        match skip_to {
            Some(end) => {
                if start < i {
                    spans.push(start..i);
                }
                i = end;
                start = end;
            }
            None => i += 1,
        }
    }

    if start < bytes.len() {
        spans.push(start..bytes.len());
    }

    spans
}

/// Index just past the closing `quote`, honouring doubled quotes.
fn skip_quoted(bytes: &[u8], mut from: usize, quote: u8) -> usize {
    loop {
        match memchr::memchr(quote, &bytes[from..]) {
            Some(n) if bytes.get(from + n + 1) == Some(&quote) => from += n + 2,
            Some(n) => return from + n + 1,
            None => return bytes.len(),
        }
    }
}

fn rewrite_question_marks(sql: &str) -> ParsedSql<'_> {
    let mut names = SmallVec::new();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut copied = 0;

    for span in code_spans(sql) {
        for pos in memchr::memchr_iter(b'?', &sql.as_bytes()[span.clone()]) {
            let at = span.start + pos;
            out.push_str(&sql[copied..at]);

            let n = itoa::Buffer::new().format(names.len() + 1).to_owned();
            out.push(':');
            out.push_str(&n);
            names.push(n);

            copied = at + 1;
        }
    }

    if names.is_empty() {
        return ParsedSql {
            sql: Cow::Borrowed(sql),
            names,
        };
    }

    out.push_str(&sql[copied..]);

    ParsedSql {
        sql: Cow::Owned(out),
        names,
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'#')
}

/// `true` when the statement is an anonymous PL/SQL block.
fn is_plsql_block(sql: &str, spans: &Spans) -> bool {
    let Some(text) = spans
        .iter()
        .map(|span| sql[span.clone()].trim_start())
        .find(|text| !text.is_empty())
    else {
        return false;
    };

    let word_len = text
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    let word = &text[..word_len];

    word.eq_ignore_ascii_case("BEGIN") || word.eq_ignore_ascii_case("DECLARE")
}

fn named_placeholders(sql: &str) -> SmallVec<[String; 8]> {
    let bytes = sql.as_bytes();
    let spans = code_spans(sql);
    let distinct = is_plsql_block(sql, &spans);
    let mut names: SmallVec<[String; 8]> = SmallVec::new();

    for span in spans {
        for pos in memchr::memchr_iter(b':', &bytes[span.clone()]) {
            let at = span.start + pos;

            // `:=` is PL/SQL assignment
            let len = bytes[at + 1..span.end]
                .iter()
                .take_while(|b| is_name_byte(**b))
                .count();

            if len == 0 {
                continue;
            }

            let name = &sql[at + 1..at + 1 + len];
            if !distinct || !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_owned());
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_rewrites_question_marks_outside_literals() {
        let parsed = parse(
            "SELECT '?' AS q, \"WHY?\" FROM t -- really?\nWHERE a = ? /* ? */ AND b = ?",
            PlaceholderStyle::QuestionMark,
        );

        assert_eq!(
            parsed.sql,
            "SELECT '?' AS q, \"WHY?\" FROM t -- really?\nWHERE a = :1 /* ? */ AND b = :2"
        );
        assert_eq!(parsed.placeholder_count(), 2);
    }

    #[test]
    fn it_handles_doubled_quotes() {
        let parsed = parse("SELECT 'it''s ?' FROM t WHERE x = ?", PlaceholderStyle::QuestionMark);
        assert_eq!(parsed.sql, "SELECT 'it''s ?' FROM t WHERE x = :1");
    }

    #[test]
    fn it_borrows_text_without_placeholders() {
        let parsed = parse("SELECT 1 FROM dual", PlaceholderStyle::QuestionMark);
        assert!(matches!(parsed.sql, Cow::Borrowed(_)));
        assert_eq!(parsed.placeholder_count(), 0);
    }

    #[test]
    fn it_collects_distinct_names() {
        let parsed = parse(
            "BEGIN :out := f(:id, TO_CHAR(SYSDATE, 'HH24:MI'), :ID, :2); END;",
            PlaceholderStyle::Named,
        );

        assert_eq!(parsed.names.as_slice(), &["out", "id", "2"]);
    }

    #[test]
    fn it_counts_every_occurrence_outside_plsql() {
        let sql = parse("SELECT * FROM t WHERE a = :x OR b = :X", PlaceholderStyle::Named);
        assert_eq!(sql.placeholder_count(), 2);

        let block = parse("begin p(:x, :x); end;", PlaceholderStyle::Named);
        assert_eq!(block.placeholder_count(), 1);

        let declared = parse(
            "/* setup */ DECLARE n NUMBER := :x; BEGIN p(n, :x); END;",
            PlaceholderStyle::Named,
        );
        assert_eq!(declared.placeholder_count(), 1);

        // `BEGINNING` is not a block opener
        assert!(!is_plsql_block("BEGINNING", &code_spans("BEGINNING")));
    }
}
