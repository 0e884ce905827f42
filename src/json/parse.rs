//! Purpose: Bounded push-down parser that builds a typed container tree from tokens.
//! Exports: `Parser`, `ParseState`.
//! Role: Body decoder for every request; the caller picks the root kind, the registry the rest.
//! Invariants: No recursion over input nesting; all open containers live on an explicit stack.
//! Invariants: Entry and depth limits are checked before the container they guard is touched.
//! Invariants: A body longer than `max_body_bytes` always fails with `TooLarge`.
//! Notes: Single use per stream; `reset` installs a new stream and clears all state.
use std::io::Read;

use crate::core::error::{Error, ErrorKind};
use crate::json::binding::TypeRegistry;
use crate::json::capped::CappedReader;
use crate::json::limits::ResourceLimits;
use crate::json::token::{Lexer, Token, TokenKind};
use crate::json::value::{Mapping, ObjectKind, Sequence, Value};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseState {
    Init,
    InObject,
    InArray,
    PassedKey,
    InFinishedValue,
    Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Expect {
    KeyOrEnd,
    Key,
    Colon,
    Value,
    ValueOrEnd,
    CommaOrEnd,
}

enum Container {
    Object(Mapping),
    Array(Sequence),
}

/// Where a finished container goes once its closing token arrives.
enum Slot {
    Root,
    Key(String),
    Element,
}

struct Frame {
    container: Container,
    slot: Slot,
    expect: Expect,
    key: Option<String>,
}

pub struct Parser<'a, R> {
    lexer: Lexer<CappedReader<R>>,
    registry: &'a TypeRegistry,
    limits: ResourceLimits,
    state: ParseState,
    stack: Vec<Frame>,
}

impl<'a, R: Read> Parser<'a, R> {
    pub fn new(reader: R, registry: &'a TypeRegistry, limits: ResourceLimits) -> Self {
        Self {
            lexer: Lexer::new(CappedReader::new(reader, limits.max_body_bytes)),
            registry,
            limits,
            state: ParseState::Init,
            stack: Vec::new(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Swaps in a new stream; the parser is ready for another `parse`.
    pub fn reset(&mut self, reader: R) {
        self.lexer = Lexer::new(CappedReader::new(reader, self.limits.max_body_bytes));
        self.state = ParseState::Init;
        self.stack.clear();
    }

    /// Fills `root` from the stream. `root` must be a JSON object on the wire.
    pub fn parse(&mut self, root: Mapping) -> Result<Mapping, Error> {
        if self.state != ParseState::Init || !self.stack.is_empty() {
            return Err(Error::new(ErrorKind::Parse)
                .with_message("parser already consumed its stream; reset it first"));
        }
        self.stack.push(Frame {
            container: Container::Object(root),
            slot: Slot::Root,
            expect: Expect::KeyOrEnd,
            key: None,
        });
        match self.run() {
            Ok(root) => Ok(root),
            Err(err) => {
                self.state = ParseState::Error;
                self.stack.clear();
                if err.kind() == ErrorKind::TooLarge {
                    return Err(err);
                }
                match self.lexer.drain() {
                    Err(drained) if drained.kind() == ErrorKind::TooLarge => Err(drained),
                    _ => Err(err),
                }
            }
        }
    }

    fn run(&mut self) -> Result<Mapping, Error> {
        let mut finished = None;
        loop {
            let token = self.lexer.next_token()?;
            match self.state {
                ParseState::Init => match token.kind {
                    TokenKind::LeftBrace => {
                        if self.limits.max_depth == 0 {
                            return Err(too_deep(self.limits.max_depth, token.position));
                        }
                        self.state = ParseState::InObject;
                    }
                    TokenKind::LeftBracket | TokenKind::Value => {
                        return Err(Error::new(ErrorKind::Parse)
                            .with_message("request body must be a JSON object")
                            .with_position(token.position));
                    }
                    _ => return Err(unexpected(&token)),
                },
                ParseState::InObject => {
                    let frame = self.top(&token)?;
                    match (token.kind, frame.expect) {
                        (TokenKind::Value, Expect::KeyOrEnd | Expect::Key) => {
                            let Value::String(key) = token.value else {
                                return Err(Error::new(ErrorKind::Parse)
                                    .with_message("object keys must be strings")
                                    .with_position(token.position));
                            };
                            frame.key = Some(key);
                            frame.expect = Expect::Colon;
                            self.state = ParseState::PassedKey;
                        }
                        (TokenKind::Comma, Expect::CommaOrEnd) => frame.expect = Expect::Key,
                        (TokenKind::RightBrace, Expect::KeyOrEnd | Expect::CommaOrEnd) => {
                            finished = self.close(&token)?;
                        }
                        _ => return Err(unexpected(&token)),
                    }
                }
                ParseState::PassedKey => {
                    let expect = self.top(&token)?.expect;
                    match (token.kind, expect) {
                        (TokenKind::Colon, Expect::Colon) => self.top(&token)?.expect = Expect::Value,
                        (TokenKind::Value, Expect::Value) => {
                            self.assign(token)?;
                            self.state = ParseState::InObject;
                        }
                        (TokenKind::LeftBrace, Expect::Value) => self.open(true, &token)?,
                        (TokenKind::LeftBracket, Expect::Value) => self.open(false, &token)?,
                        _ => return Err(unexpected(&token)),
                    }
                }
                ParseState::InArray => {
                    let expect = self.top(&token)?.expect;
                    match (token.kind, expect) {
                        (TokenKind::Value, Expect::ValueOrEnd | Expect::Value) => self.append(token)?,
                        (TokenKind::LeftBrace, Expect::ValueOrEnd | Expect::Value) => {
                            self.open(true, &token)?
                        }
                        (TokenKind::LeftBracket, Expect::ValueOrEnd | Expect::Value) => {
                            self.open(false, &token)?
                        }
                        (TokenKind::Comma, Expect::CommaOrEnd) => {
                            self.top(&token)?.expect = Expect::Value
                        }
                        (TokenKind::RightBracket, Expect::ValueOrEnd | Expect::CommaOrEnd) => {
                            self.close(&token)?;
                        }
                        _ => return Err(unexpected(&token)),
                    }
                }
                ParseState::InFinishedValue => match (token.kind, finished.take()) {
                    (TokenKind::Eof, Some(root)) => return Ok(root),
                    (_, Some(_)) => {
                        return Err(Error::new(ErrorKind::Parse)
                            .with_message(format!("trailing {token} after body"))
                            .with_position(token.position));
                    }
                    (_, None) => return Err(out_of_sync(token.position)),
                },
                ParseState::Error => return Err(unexpected(&token)),
            }
        }
    }

    fn top(&mut self, token: &Token) -> Result<&mut Frame, Error> {
        self.stack
            .last_mut()
            .ok_or_else(|| out_of_sync(token.position))
    }

    fn assign(&mut self, token: Token) -> Result<(), Error> {
        let max = self.limits.max_container_entries;
        let frame = self.top(&token)?;
        let (Container::Object(mapping), Some(key)) = (&mut frame.container, frame.key.as_deref()) else {
            return Err(out_of_sync(token.position));
        };
        if mapping.len() >= max && !mapping.contains_key(key) {
            return Err(too_many(max, token.position));
        }
        let key = frame.key.take().unwrap_or_default();
        if let Container::Object(mapping) = &mut frame.container {
            mapping.insert(key, token.value);
        }
        frame.expect = Expect::CommaOrEnd;
        Ok(())
    }

    fn append(&mut self, token: Token) -> Result<(), Error> {
        let max = self.limits.max_container_entries;
        let frame = self.top(&token)?;
        let Container::Array(sequence) = &mut frame.container else {
            return Err(out_of_sync(token.position));
        };
        if sequence.len() >= max {
            return Err(too_many(max, token.position));
        }
        sequence.push(token.value);
        frame.expect = Expect::CommaOrEnd;
        Ok(())
    }

    fn open(&mut self, object: bool, token: &Token) -> Result<(), Error> {
        if self.stack.len() >= self.limits.max_depth {
            return Err(too_deep(self.limits.max_depth, token.position));
        }
        let max = self.limits.max_container_entries;
        let registry = self.registry;
        let parent = self.top(token)?;
        let (slot, bound) = match &parent.container {
            Container::Object(mapping) => {
                let Some(key) = parent.key.as_deref() else {
                    return Err(out_of_sync(token.position));
                };
                if mapping.len() >= max && !mapping.contains_key(key) {
                    return Err(too_many(max, token.position));
                }
                let bound = registry.resolve(mapping.kind(), key);
                (Slot::Key(parent.key.take().unwrap_or_default()), bound)
            }
            Container::Array(sequence) => {
                if sequence.len() >= max {
                    return Err(too_many(max, token.position));
                }
                (Slot::Element, sequence.element())
            }
        };
        let (container, expect, state) = if object {
            let kind = bound.unwrap_or(ObjectKind::Generic);
            (Container::Object(Mapping::new(kind)), Expect::KeyOrEnd, ParseState::InObject)
        } else {
            (Container::Array(Sequence::new(bound)), Expect::ValueOrEnd, ParseState::InArray)
        };
        self.stack.push(Frame {
            container,
            slot,
            expect,
            key: None,
        });
        self.state = state;
        Ok(())
    }

    /// Pops the innermost container; returns the root once the outermost one closes.
    fn close(&mut self, token: &Token) -> Result<Option<Mapping>, Error> {
        let frame = self.stack.pop().ok_or_else(|| out_of_sync(token.position))?;
        let value = match (frame.slot, frame.container) {
            (Slot::Root, Container::Object(root)) => {
                self.state = ParseState::InFinishedValue;
                return Ok(Some(root));
            }
            (Slot::Root, Container::Array(_)) => return Err(out_of_sync(token.position)),
            (slot, Container::Object(mapping)) => (slot, Value::Object(mapping)),
            (slot, Container::Array(sequence)) => (slot, Value::Array(sequence)),
        };
        let parent = self
            .stack
            .last_mut()
            .ok_or_else(|| out_of_sync(token.position))?;
        match (value, &mut parent.container) {
            ((Slot::Key(key), value), Container::Object(mapping)) => {
                mapping.insert(key, value);
                self.state = ParseState::InObject;
            }
            ((Slot::Element, value), Container::Array(sequence)) => {
                sequence.push(value);
                self.state = ParseState::InArray;
            }
            _ => return Err(out_of_sync(token.position)),
        }
        parent.expect = Expect::CommaOrEnd;
        Ok(None)
    }
}

fn unexpected(token: &Token) -> Error {
    Error::new(ErrorKind::Parse)
        .with_message(format!("unexpected {token}"))
        .with_position(token.position)
}

fn too_many(max: usize, position: u64) -> Error {
    Error::new(ErrorKind::TooLarge)
        .with_message(format!("container holds more than {max} entries"))
        .with_position(position)
}

fn too_deep(max: usize, position: u64) -> Error {
    Error::new(ErrorKind::TooLarge)
        .with_message(format!("nesting deeper than {max} levels"))
        .with_position(position)
}

fn out_of_sync(position: u64) -> Error {
    Error::new(ErrorKind::Internal)
        .with_message("parser stack out of sync")
        .with_position(position)
}
