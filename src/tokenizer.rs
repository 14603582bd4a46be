//! Tokenization of lines of text with a compiled grammar.
//!
//! The [`Tokenizer`] only reads the grammar; what a document has opened so far is kept in a
//! [`TokenizationState`] the caller threads from one line to the next.

mod state;
mod token;
#[allow(clippy::module_inception)]
mod tokenizer;

pub use state::TokenizationState;
pub use token::Token;
pub use tokenizer::{Tokenizer, TokenizerOptions};
