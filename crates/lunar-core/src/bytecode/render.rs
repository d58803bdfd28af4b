//! Exact, escape-safe display text for constant-pool values.

use core::fmt::Write;

use crate::bytecode::proto::Constant;

/// Display text of a constant.
///
/// - `nil`, `true`, `false`
/// - floats: shortest round-trip text, always with a `.` or an exponent
/// - integers: plain decimal
/// - strings: double-quoted, see [`quote`]
/// - unknown tags: `unknown tag N` (non-fatal)
pub fn render(value: &Constant) -> String {
    match value {
        Constant::Nil => "nil".into(),
        Constant::Boolean(b) => if *b { "true".into() } else { "false".into() },
        Constant::Number(n) => render_number(*n),
        Constant::Integer(i) => i.to_string(),
        Constant::ShortStr(s) | Constant::LongStr(s) => quote(s),
        Constant::Unknown(tag) => format!("unknown tag {tag}"),
    }
}

/// Float text that re-parses to the same `f64`.
///
/// A text made only of digits and signs would read back as an integer, so it
/// gets a trailing `.0`. Infinities use an overflowing exponent.
pub fn render_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "1e9999".into() } else { "-1e9999".into() };
    }
    let mut text = format!("{n:?}");
    if text.bytes().all(|b| b == b'-' || b.is_ascii_digit()) {
        text.push_str(".0");
    }
    text
}

/// Double-quoted literal for an arbitrary byte string.
///
/// `"` and `\` are backslash-escaped, the seven C control escapes use their
/// letter, other non-printable bytes become a 3-digit decimal escape. The
/// result is pure ASCII and [`unquote`] gives the bytes back.
pub fn quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0b => out.push_str("\\v"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03}");
            }
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote`]. `None` if `text` is not a literal `quote` can produce.
pub fn unquote(text: &str) -> Option<Vec<u8>> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let esc = *bytes.get(i)?;
        i += 1;
        let decoded = match esc {
            b'"' => b'"',
            b'\\' => b'\\',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'0'..=b'9' => {
                let digits = bytes.get(i - 1..i + 2)?;
                if !digits.iter().all(u8::is_ascii_digit) {
                    return None;
                }
                i += 2;
                let value = digits.iter().fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
                u8::try_from(value).ok()?
            }
            _ => return None,
        };
        out.push(decoded);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn scalars() {
        assert_eq!(render(&Constant::Nil), "nil");
        assert_eq!(render(&Constant::Boolean(true)), "true");
        assert_eq!(render(&Constant::Boolean(false)), "false");
        assert_eq!(render(&Constant::Integer(3)), "3");
        assert_eq!(render(&Constant::Integer(i64::MIN)), "-9223372036854775808");
        assert_eq!(render(&Constant::Unknown(9)), "unknown tag 9");
    }

    #[test]
    fn floats_never_look_like_integers() {
        assert_eq!(render(&Constant::Number(3.0)), "3.0");
        assert_eq!(render(&Constant::Number(-0.0)), "-0.0");
        assert_eq!(render(&Constant::Number(0.1)), "0.1");
        assert_eq!(render(&Constant::Number(1e100)), "1e100");
        assert_eq!(render(&Constant::Number(2.5e-8)), "2.5e-8");
        assert_eq!(render(&Constant::Number(f64::INFINITY)), "1e9999");
        assert_eq!(render(&Constant::Number(f64::NEG_INFINITY)), "-1e9999");
        assert_eq!(render(&Constant::Number(f64::NAN)), "nan");
    }

    #[test]
    fn strings_escape() {
        assert_eq!(render(&Constant::str("hi")), "\"hi\"");
        assert_eq!(quote(b"a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(quote(b"\x07\x08\x0c\n\r\t\x0b"), r#""\a\b\f\n\r\t\v""#);
        assert_eq!(quote(b"\x00\x1b\x7f\xff"), r#""\000\027\127\255""#);
        // a digit after a decimal escape must not merge with it
        assert_eq!(quote(b"\x001"), r#""\0001""#);
        assert_eq!(unquote(r#""\0001""#), Some(b"\x001".to_vec()));
    }

    #[test]
    fn every_byte_roundtrips() {
        let all: Vec<u8> = (0..=255u8).collect();
        let text = quote(&all);
        assert!(text.is_ascii());
        assert_eq!(unquote(&text), Some(all));
    }

    #[test]
    fn unquote_rejects_garbage() {
        assert_eq!(unquote("abc"), None);
        assert_eq!(unquote(r#""\q""#), None);
        assert_eq!(unquote(r#""\25""#), None);
        assert_eq!(unquote(r#""\256""#), None);
    }

    proptest! {
        #[test]
        fn float_rendering_is_idempotent(n in any::<f64>().prop_filter("nan", |n| !n.is_nan())) {
            let text = render_number(n);
            prop_assert!(text.contains('.') || text.contains('e'));
            let back: f64 = text.parse().unwrap();
            prop_assert_eq!(back.to_bits(), n.to_bits());
            prop_assert_eq!(render_number(back), text);
        }

        #[test]
        fn byte_strings_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(unquote(&quote(&bytes)), Some(bytes));
        }
    }
}
