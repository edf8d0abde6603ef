//! Scanning `${ … }` templates and translating the SpEL-style operators they
//! use into the expression syntax understood by the evaluator.

/// A piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(&'a str),
    Expression(&'a str),
}

/// Split `input` into literal text and `${ … }` expressions.
///
/// Braces inside an expression are balanced and quoted text is skipped, so
/// `${ {'a': 1}['a'] }` is a single expression. An unterminated `${` is kept
/// as literal text.
pub(crate) fn split_template(input: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        let body_start = start + 2;
        let Some(body_len) = closing_brace(&rest[body_start..]) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Expression(
            &rest[body_start..body_start + body_len],
        ));
        rest = &rest[body_start + body_len + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

/// Byte offset of the brace closing an expression body.
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') if depth == 0 => return Some(offset),
            (None, '}') => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Rewrite SpEL operators outside string literals:
/// `#fn(` becomes `fn(`, `&&`/`||`/`!` become `and`/`or`/`not`, `?:` becomes
/// `or` and `null` becomes `none`.
pub(crate) fn to_jinja(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len() + 8);
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, next) {
            ('\'' | '"', _) => {
                quote = Some(c);
                out.push(c);
            }
            ('#', Some(n)) if n.is_alphabetic() || n == '_' => {}
            ('&', Some('&')) => {
                out.push_str(" and ");
                i += 1;
            }
            ('|', Some('|')) => {
                out.push_str(" or ");
                i += 1;
            }
            ('?', Some(':')) => {
                out.push_str(" or ");
                i += 1;
            }
            ('!', Some('=')) => {
                out.push_str("!=");
                i += 1;
            }
            ('!', _) => out.push_str(" not "),
            (c, _) if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word == "null" {
                    out.push_str("none");
                } else {
                    out.push_str(&word);
                }
                continue;
            }
            (c, _) => out.push(c),
        }
        i += 1;
    }

    out.trim().to_string()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
