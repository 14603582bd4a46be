//! # Grammar
//!
//! This module contains the grammar table: the compiled form of a TextMate grammar. The most
//! useful items are:
//!  - [`Grammar`], which owns every rule of a grammar and resolves the references between them;
//!  - [`Rule`] and [`RuleKind`], a single `match` or `begin`/`end` rule;
//!  - [`RawGrammar`], the definition as read from disk, which [`Grammar::build_from_raw`]
//!    compiles.
//!
//! References (`#name`, `$self`, ...) are kept as names and looked up every time the rules
//! of a scope are needed, so repositories may refer to themselves or to each other.

mod ast;
#[allow(clippy::module_inception)]
mod grammar;

pub use ast::{RawCapture, RawCaptures, RawGrammar, RawRule};
pub use grammar::{
    Capture, Captures, Grammar, Pattern, Reference, RepositoryId, Rule, RuleId, RuleKind, Rules,
};
