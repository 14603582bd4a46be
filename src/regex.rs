//! # Regex
//!
//! Thin layer over Oniguruma, the dialect TextMate grammars are written in. It adds what the
//! tokenizer needs on top of plain searching:
//!  - [`CompiledRegex`] keeps the variants of an expression needed to turn its `\G` and `\A`
//!    anchors off, and can rebuild itself with back-references taken from another match;
//!  - [`find_earliest`] searches with many expressions at once and reports the one whose match
//!    starts first, declaration order breaking ties.

mod api;
mod parsing;

pub use api::{find_earliest, Anchors, CompiledRegex, Match, RegexError};
pub use parsing::escape;
