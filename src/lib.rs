//! A TextMate-style tokenizer: a grammar of regular expressions tags every span of a line with
//! the scopes it belongs to, carrying what is left open from one line to the next.

pub mod builder;
pub mod cli;
pub mod error;
pub mod grammar;
pub mod printer;
pub mod regex;
pub mod scope;
pub mod tokenizer;

#[cfg(test)]
mod test_utilities;
