//! Purpose: Streaming JSON tokenizer over a byte reader.
//! Exports: `Token`, `TokenKind`, `Lexer`.
//! Role: Feeds the bounded parser one token at a time; knows nothing about nesting.
//! Invariants: The stream always ends with an explicit `Eof` token, never with an error.
//! Invariants: Positions are byte offsets of the first byte of each token.
//! Notes: Integers that fit `i64` stay integers; anything else numeric is a `BigDecimal`.
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::core::error::{Error, ErrorKind};
use crate::json::capped::is_body_too_large;
use crate::json::value::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Value,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Scalar payload for `Value` tokens; `Null` otherwise.
    pub value: Value,
    pub position: u64,
}

impl Token {
    fn punct(kind: TokenKind, position: u64) -> Self {
        Self {
            kind,
            value: Value::Null,
            position,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Value => match &self.value {
                Value::Null => f.write_str("null"),
                Value::Bool(value) => write!(f, "{value}"),
                Value::Integer(value) => write!(f, "{value}"),
                Value::Decimal(value) => write!(f, "{value}"),
                Value::String(_) => f.write_str("string"),
                Value::Object(_) | Value::Array(_) => f.write_str("container"),
            },
            TokenKind::LeftBrace => f.write_str("'{'"),
            TokenKind::RightBrace => f.write_str("'}'"),
            TokenKind::LeftBracket => f.write_str("'['"),
            TokenKind::RightBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

pub struct Lexer<R> {
    reader: BufReader<R>,
    position: u64,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    pub fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_whitespace()?;
        let start = self.position;
        let Some(byte) = self.peek()? else {
            return Ok(Token::punct(TokenKind::Eof, start));
        };
        let kind = match byte {
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'"' => {
                let value = self.read_string()?;
                return Ok(self.value(Value::String(value), start));
            }
            b't' => {
                self.expect_literal(b"true")?;
                return Ok(self.value(Value::Bool(true), start));
            }
            b'f' => {
                self.expect_literal(b"false")?;
                return Ok(self.value(Value::Bool(false), start));
            }
            b'n' => {
                self.expect_literal(b"null")?;
                return Ok(self.value(Value::Null, start));
            }
            b'-' | b'0'..=b'9' => {
                let value = self.read_number()?;
                return Ok(self.value(value, start));
            }
            other => return Err(unexpected_byte(other, start)),
        };
        self.advance();
        Ok(Token::punct(kind, start))
    }

    /// Reads and discards the rest of the stream, stopping at the first error.
    pub fn drain(&mut self) -> Result<(), Error> {
        loop {
            let len = match self.reader.fill_buf() {
                Ok([]) => return Ok(()),
                Ok(buf) => buf.len(),
                Err(err) => return Err(read_error(err, self.position)),
            };
            self.reader.consume(len);
            self.position += len as u64;
        }
    }

    fn value(&self, value: Value, position: u64) -> Token {
        Token {
            kind: TokenKind::Value,
            value,
            position,
        }
    }

    fn peek(&mut self) -> Result<Option<u8>, Error> {
        match self.reader.fill_buf() {
            Ok(buf) => Ok(buf.first().copied()),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => self.peek(),
            Err(err) => Err(read_error(err, self.position)),
        }
    }

    fn advance(&mut self) {
        self.reader.consume(1);
        self.position += 1;
    }

    fn next_byte(&mut self) -> Result<Option<u8>, Error> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.advance();
        }
        Ok(byte)
    }

    fn skip_whitespace(&mut self) -> Result<(), Error> {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek()? {
            self.advance();
        }
        Ok(())
    }

    fn expect_literal(&mut self, literal: &[u8]) -> Result<(), Error> {
        for &expected in literal {
            let position = self.position;
            match self.next_byte()? {
                Some(byte) if byte == expected => {}
                Some(byte) => return Err(unexpected_byte(byte, position)),
                None => return Err(unexpected_end(position)),
            }
        }
        Ok(())
    }

    fn read_string(&mut self) -> Result<String, Error> {
        let start = self.position;
        self.advance();
        let mut out = Vec::new();
        loop {
            let position = self.position;
            match self.next_byte()? {
                None => {
                    return Err(Error::new(ErrorKind::Lex)
                        .with_message("unterminated string")
                        .with_position(start));
                }
                Some(b'"') => break,
                Some(b'\\') => self.read_escape(&mut out)?,
                Some(byte) if byte < 0x20 => {
                    return Err(Error::new(ErrorKind::Lex)
                        .with_message(format!("control character 0x{byte:02X} in string"))
                        .with_position(position));
                }
                Some(byte) => out.push(byte),
            }
        }
        String::from_utf8(out).map_err(|err| {
            Error::new(ErrorKind::Lex)
                .with_message("string is not valid UTF-8")
                .with_position(start)
                .with_source(err)
        })
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) -> Result<(), Error> {
        let position = self.position;
        let decoded = match self.next_byte()? {
            Some(b'"') => '"',
            Some(b'\\') => '\\',
            Some(b'/') => '/',
            Some(b'b') => '\u{0008}',
            Some(b'f') => '\u{000C}',
            Some(b'n') => '\n',
            Some(b'r') => '\r',
            Some(b't') => '\t',
            Some(b'u') => self.read_unicode_escape(position)?,
            Some(byte) => {
                return Err(Error::new(ErrorKind::Lex)
                    .with_message(format!("invalid escape '\\{}'", char::from(byte)))
                    .with_position(position));
            }
            None => return Err(unexpected_end(position)),
        };
        let mut buf = [0u8; 4];
        out.extend_from_slice(decoded.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }

    fn read_unicode_escape(&mut self, position: u64) -> Result<char, Error> {
        let first = self.read_hex4()?;
        let code = match first {
            0xD800..=0xDBFF => {
                let mut marker = [0u8; 2];
                for slot in &mut marker {
                    *slot = self.next_byte()?.unwrap_or(0);
                }
                if marker != *b"\\u" {
                    return Err(lone_surrogate(position));
                }
                let second = self.read_hex4()?;
                if !(0xDC00..=0xDFFF).contains(&second) {
                    return Err(lone_surrogate(position));
                }
                0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(lone_surrogate(position)),
            other => other,
        };
        char::from_u32(code).ok_or_else(|| lone_surrogate(position))
    }

    fn read_hex4(&mut self) -> Result<u32, Error> {
        let mut code = 0u32;
        for _ in 0..4 {
            let position = self.position;
            let digit = match self.next_byte()? {
                Some(byte) => char::from(byte).to_digit(16).ok_or_else(|| {
                    Error::new(ErrorKind::Lex)
                        .with_message(format!("invalid hex digit '{}'", char::from(byte)))
                        .with_position(position)
                })?,
                None => return Err(unexpected_end(position)),
            };
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_number(&mut self) -> Result<Value, Error> {
        let start = self.position;
        let mut text = String::new();
        let mut fractional = false;

        if self.peek()? == Some(b'-') {
            text.push('-');
            self.advance();
        }
        match self.peek()? {
            Some(b'0') => {
                text.push('0');
                self.advance();
                if let Some(b'0'..=b'9') = self.peek()? {
                    return Err(invalid_number("leading zero", start));
                }
            }
            Some(b'1'..=b'9') => {
                self.read_digits(&mut text)?;
            }
            _ => return Err(invalid_number("missing digits", start)),
        }
        if self.peek()? == Some(b'.') {
            fractional = true;
            text.push('.');
            self.advance();
            if self.read_digits(&mut text)? == 0 {
                return Err(invalid_number("missing fraction digits", start));
            }
        }
        if let Some(b'e' | b'E') = self.peek()? {
            fractional = true;
            text.push('e');
            self.advance();
            if let Some(sign @ (b'+' | b'-')) = self.peek()? {
                text.push(char::from(sign));
                self.advance();
            }
            if self.read_digits(&mut text)? == 0 {
                return Err(invalid_number("missing exponent digits", start));
            }
        }

        if !fractional {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Value::Integer(value));
            }
        }
        BigDecimal::from_str(&text)
            .map(Value::Decimal)
            .map_err(|err| invalid_number("out of range", start).with_source(err))
    }

    fn read_digits(&mut self, text: &mut String) -> Result<usize, Error> {
        let mut count = 0;
        while let Some(byte @ b'0'..=b'9') = self.peek()? {
            text.push(char::from(byte));
            self.advance();
            count += 1;
        }
        Ok(count)
    }
}

fn read_error(err: std::io::Error, position: u64) -> Error {
    if is_body_too_large(&err) {
        return Error::new(ErrorKind::TooLarge)
            .with_message("request body too large")
            .with_source(err);
    }
    Error::new(ErrorKind::Io)
        .with_message("failed to read request body")
        .with_position(position)
        .with_source(err)
}

fn unexpected_byte(byte: u8, position: u64) -> Error {
    let shown = if byte.is_ascii_graphic() {
        format!("'{}'", char::from(byte))
    } else {
        format!("0x{byte:02X}")
    };
    Error::new(ErrorKind::Lex)
        .with_message(format!("unexpected character {shown}"))
        .with_position(position)
}

fn unexpected_end(position: u64) -> Error {
    Error::new(ErrorKind::Lex)
        .with_message("unexpected end of input")
        .with_position(position)
}

fn invalid_number(reason: &str, position: u64) -> Error {
    Error::new(ErrorKind::Lex)
        .with_message(format!("invalid number ({reason})"))
        .with_position(position)
}

fn lone_surrogate(position: u64) -> Error {
    Error::new(ErrorKind::Lex)
        .with_message("unpaired surrogate in \\u escape")
        .with_position(position)
}
