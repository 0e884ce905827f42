//! Purpose: Render container trees back to JSON text.
//! Exports: `to_string`, `mapping_to_string`, `write_value`, `write_mapping`, `escape_into`.
//! Role: Encoder for every response body; output re-parses to equal data.
//! Invariants: Null entries are written as `null`, never dropped.
//! Invariants: Escaping is the exact inverse of the tokenizer's string decoding.
//! Notes: Decimals with extreme exponents are written in exponent form to keep output bounded.
use std::fmt;
use std::io;

use bigdecimal::BigDecimal;

use crate::json::value::{Mapping, Sequence, Value};

/// Longest run of leading fraction zeros written in plain notation.
const PLAIN_ZEROS_MAX: u64 = 6;

pub fn to_string(value: &Value) -> String {
    let mut out = String::new();
    // fmt::Write for String is infallible.
    let _ = emit_value(&mut out, value);
    out
}

pub fn mapping_to_string(mapping: &Mapping) -> String {
    let mut out = String::new();
    let _ = emit_mapping(&mut out, mapping);
    out
}

pub fn write_value<W: io::Write>(writer: &mut W, value: &Value) -> io::Result<()> {
    let mut adapter = IoAdapter {
        inner: writer,
        error: None,
    };
    emit_value(&mut adapter, value).map_err(|_| adapter.take_error())
}

pub fn write_mapping<W: io::Write>(writer: &mut W, mapping: &Mapping) -> io::Result<()> {
    let mut adapter = IoAdapter {
        inner: writer,
        error: None,
    };
    emit_mapping(&mut adapter, mapping).map_err(|_| adapter.take_error())
}

/// Appends `text` as a quoted JSON string.
pub fn escape_into(out: &mut String, text: &str) {
    let _ = emit_str(out, text);
}

struct IoAdapter<'w, W> {
    inner: &'w mut W,
    error: Option<io::Error>,
}

impl<W> IoAdapter<'_, W> {
    fn take_error(&mut self) -> io::Error {
        self.error
            .take()
            .unwrap_or_else(|| io::Error::other("formatter error"))
    }
}

impl<W: io::Write> fmt::Write for IoAdapter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_all(s.as_bytes()).map_err(|err| {
            self.error = Some(err);
            fmt::Error
        })
    }
}

fn emit_value<W: fmt::Write>(out: &mut W, value: &Value) -> fmt::Result {
    match value {
        Value::Null => out.write_str("null"),
        Value::Bool(true) => out.write_str("true"),
        Value::Bool(false) => out.write_str("false"),
        Value::Integer(value) => write!(out, "{value}"),
        Value::Decimal(value) => emit_decimal(out, value),
        Value::String(value) => emit_str(out, value),
        Value::Object(mapping) => emit_mapping(out, mapping),
        Value::Array(sequence) => emit_sequence(out, sequence),
    }
}

fn emit_mapping<W: fmt::Write>(out: &mut W, mapping: &Mapping) -> fmt::Result {
    out.write_char('{')?;
    for (index, (key, value)) in mapping.iter().enumerate() {
        if index > 0 {
            out.write_char(',')?;
        }
        emit_str(out, key)?;
        out.write_char(':')?;
        emit_value(out, value)?;
    }
    out.write_char('}')
}

fn emit_sequence<W: fmt::Write>(out: &mut W, sequence: &Sequence) -> fmt::Result {
    out.write_char('[')?;
    for (index, value) in sequence.iter().enumerate() {
        if index > 0 {
            out.write_char(',')?;
        }
        emit_value(out, value)?;
    }
    out.write_char(']')
}

fn emit_decimal<W: fmt::Write>(out: &mut W, value: &BigDecimal) -> fmt::Result {
    let (mantissa, scale) = value.as_bigint_and_exponent();
    let text = mantissa.to_string();
    let (sign, digits) = match text.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", text.as_str()),
    };
    out.write_str(sign)?;
    if scale == 0 {
        return out.write_str(digits);
    }
    if scale < 0 {
        return write!(out, "{digits}E{}", scale.unsigned_abs());
    }
    let scale = scale.unsigned_abs();
    let len = digits.len() as u64;
    if scale < len {
        let split = (len - scale) as usize;
        return write!(out, "{}.{}", &digits[..split], &digits[split..]);
    }
    if scale - len <= PLAIN_ZEROS_MAX {
        out.write_str("0.")?;
        for _ in 0..scale - len {
            out.write_char('0')?;
        }
        return out.write_str(digits);
    }
    write!(out, "{digits}E-{scale}")
}

fn emit_str<W: fmt::Write>(out: &mut W, text: &str) -> fmt::Result {
    out.write_char('"')?;
    let mut clean_from = 0;
    for (index, ch) in text.char_indices() {
        let short = match ch {
            '"' => Some("\\\""),
            '\\' => Some("\\\\"),
            '/' => Some("\\/"),
            '\u{0008}' => Some("\\b"),
            '\u{000C}' => Some("\\f"),
            '\n' => Some("\\n"),
            '\r' => Some("\\r"),
            '\t' => Some("\\t"),
            _ => None,
        };
        let needs_unicode = matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}' | '\u{2000}'..='\u{20FF}');
        if short.is_none() && !needs_unicode {
            continue;
        }
        out.write_str(&text[clean_from..index])?;
        match short {
            Some(escape) => out.write_str(escape)?,
            None => write!(out, "\\u{:04X}", u32::from(ch))?,
        }
        clean_from = index + ch.len_utf8();
    }
    out.write_str(&text[clean_from..])?;
    out.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::{mapping_to_string, to_string, write_mapping};
    use crate::core::error::ErrorKind;
    use crate::json::value::{Mapping, Sequence, Value};
    use crate::json::{self, ObjectKind, ResourceLimits};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn decimal(text: &str) -> Value {
        Value::Decimal(BigDecimal::from_str(text).expect("decimal"))
    }

    #[test]
    fn nulls_are_written_not_dropped() {
        let mut mapping = Mapping::generic();
        mapping.insert("dashboard_url", Value::Null);
        mapping.insert("operation", "op-1");
        assert_eq!(
            mapping_to_string(&mapping),
            r#"{"dashboard_url":null,"operation":"op-1"}"#
        );
    }

    #[test]
    fn escapes_match_tokenizer() {
        let text = "q\" b\\ s/ \u{8}\u{c}\n\r\t \u{1} \u{7f} \u{85} \u{2028} é";
        assert_eq!(
            to_string(&Value::from(text)),
            r#""q\" b\\ s\/ \b\f\n\r\t \u0001 \u007F \u0085 \u2028 é""#
        );
    }

    #[test]
    fn decimals_keep_scale_and_stay_bounded() {
        assert_eq!(to_string(&decimal("1.50")), "1.50");
        assert_eq!(to_string(&decimal("-0.25")), "-0.25");
        assert_eq!(to_string(&decimal("0.000001")), "0.000001");
        assert_eq!(to_string(&decimal("1e-30")), "1E-30");
        assert_eq!(to_string(&decimal("12e3")), "12E3");
        assert_eq!(to_string(&decimal("1e999999")), "1E999999");
        assert_eq!(to_string(&decimal("42")), "42");
    }

    #[test]
    fn non_finite_floats_serialize_as_null() {
        let sequence: Sequence = [Value::from(f64::NAN), Value::from(f64::NEG_INFINITY), Value::from(1.5)]
            .into_iter()
            .collect();
        assert_eq!(to_string(&Value::Array(sequence)), "[null,null,1.5]");
    }

    #[test]
    fn output_reparses_to_equal_data_at_max_depth() {
        let max_depth = 8;
        let controls: String = (0u32..0x20)
            .chain(0x7f..0xa0)
            .filter_map(char::from_u32)
            .collect();

        let mut leaf = Mapping::generic();
        leaf.insert("controls", controls.as_str());
        leaf.insert("separators", "line\u{2028}para\u{2029}");
        leaf.insert("slashes", "a/b\\c \"q\"");
        leaf.insert("astral", "\u{1F600} \u{2603}");
        leaf.insert("key\twith\u{1}controls", true);
        leaf.insert("tiny", decimal("1e-30"));
        leaf.insert("huge", decimal("-12e40"));
        leaf.insert("scaled", decimal("1.500"));
        leaf.insert("min", i64::MIN);
        leaf.insert("max", i64::MAX);
        leaf.insert("absent", Value::Null);
        leaf.insert("nan", f64::NAN);

        let mut nested = Value::Object(leaf);
        for level in 0..max_depth - 2 {
            nested = if level % 2 == 0 {
                Value::Array([nested, Value::from(level as i64)].into_iter().collect())
            } else {
                let mut wrapper = Mapping::generic();
                wrapper.insert("next", nested);
                Value::Object(wrapper)
            };
        }
        let mut root = Mapping::generic();
        root.insert("nested", nested);

        let text = mapping_to_string(&root);
        let limits = ResourceLimits::new(1 << 20, 1_000, max_depth);
        let parsed = json::parse_reader(text.as_bytes(), ObjectKind::Generic, limits).expect("reparse");
        assert_eq!(parsed, root);
        assert_eq!(mapping_to_string(&parsed), text);

        let shallower = ResourceLimits::new(1 << 20, 1_000, max_depth - 1);
        let err = json::parse_reader(text.as_bytes(), ObjectKind::Generic, shallower).expect_err("too deep");
        assert_eq!(err.kind(), ErrorKind::TooLarge);
    }

    #[test]
    fn writer_and_string_output_agree() {
        let mut mapping = Mapping::generic();
        mapping.insert("a", [1, 2].into_iter().collect::<Sequence>());
        mapping.insert("b", Mapping::generic());
        let mut buffer = Vec::new();
        write_mapping(&mut buffer, &mapping).expect("write");
        assert_eq!(buffer, mapping_to_string(&mapping).into_bytes());
        assert_eq!(mapping_to_string(&mapping), r#"{"a":[1,2],"b":{}}"#);
    }
}
