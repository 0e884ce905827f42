//! Purpose: Bounded JSON decoding into typed containers, and the matching encoder.
//! Exports: tokenizer, parser, registry, limits, value tree and serializer entrypoints.
//! Role: The only JSON codec on request and response paths; no serde on the wire.
//! Invariants: Every body decode goes through `Parser` with explicit `ResourceLimits`.
//! Invariants: The builtin registry is immutable and shared read-only across threads.

pub mod binding;
pub mod capped;
pub mod limits;
pub mod parse;
pub mod serialize;
pub mod token;
pub mod value;

use std::io::Read;

pub use binding::{TypeRegistry, TypeRegistryBuilder, builtin};
pub use limits::ResourceLimits;
pub use parse::{ParseState, Parser};
pub use serialize::{escape_into, mapping_to_string, to_string, write_mapping, write_value};
pub use token::{Lexer, Token, TokenKind};
pub use value::{Mapping, ObjectKind, Sequence, Value};

use crate::core::error::Error;

/// Parses `reader` into a fresh `root` mapping using the builtin registry.
pub fn parse_reader<R: Read>(reader: R, root: ObjectKind, limits: ResourceLimits) -> Result<Mapping, Error> {
    Parser::new(reader, builtin(), limits).parse(Mapping::new(root))
}

/// Parses a complete document held in memory with default limits.
pub fn parse_str(text: &str, root: ObjectKind) -> Result<Mapping, Error> {
    parse_reader(text.as_bytes(), root, ResourceLimits::default())
}
