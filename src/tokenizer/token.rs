use crate::scope::Scope;
use itertools::Itertools;
use serde::Serialize;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scopes(names: &[&str]) -> Vec<Scope> {
        names.iter().map(|&name| Scope::from(name)).collect()
    }

    #[test]
    fn produce_skips_empty_and_backward_spans() {
        let mut stream = TokenStream::starting_at(0);
        stream.produce(0, &scopes(&["r"]));
        stream.produce(2, &scopes(&["r"]));
        stream.produce(1, &scopes(&["r", "x"]));
        stream.produce(4, &scopes(&["r", "x"]));
        assert_eq!(
            stream.into_tokens(),
            vec![
                Token::new(0, 2, scopes(&["r"])),
                Token::new(2, 4, scopes(&["r", "x"]))
            ]
        );
    }

    #[test]
    fn finish_merges_and_clips() {
        let mut stream = TokenStream::starting_at(0);
        stream.produce(1, &scopes(&["r"]));
        stream.produce(3, &scopes(&["r"]));
        stream.produce(5, &scopes(&["r", "x"]));
        stream.produce(6, &scopes(&["r"]));
        assert_eq!(
            stream.finish(5, true, &scopes(&["r"])),
            vec![
                Token::new(0, 3, scopes(&["r"])),
                Token::new(3, 5, scopes(&["r", "x"]))
            ]
        );
    }

    #[test]
    fn finish_without_merging() {
        let mut stream = TokenStream::starting_at(0);
        stream.produce(1, &scopes(&["r"]));
        stream.produce(2, &scopes(&["r"]));
        assert_eq!(stream.finish(2, false, &scopes(&["r"])).len(), 2);
    }

    #[test]
    fn empty_line() {
        let mut stream = TokenStream::starting_at(0);
        stream.produce(1, &scopes(&["r", "block"]));
        assert_eq!(
            stream.finish(0, true, &scopes(&["r"])),
            vec![Token::new(0, 0, scopes(&["r"]))]
        );
        assert_eq!(
            TokenStream::starting_at(0).finish(0, true, &scopes(&["r"])),
            vec![Token::new(0, 0, scopes(&["r"]))]
        );
    }

    #[test]
    fn value() {
        let token = Token::new(2, 5, scopes(&["r"]));
        assert_eq!(token.value("a 123 b"), "123");
        assert_eq!(token.len(), 3);
        assert_eq!(
            serde_json::to_string(&token).unwrap(),
            r#"{"start":2,"end":5,"scopes":["r"]}"#
        );
    }
}

/// # Summary
///
/// `Token` is a span of a line with the scopes that apply to it, outermost first. Offsets are
/// byte offsets into the line.
///
/// # Methods
///
/// `start`: the start of the span (inclusive)
/// `end`: the end of the span (exclusive)
/// `scopes`: the scopes of the span, the grammar's root scope first
/// `value`: the text of the span
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    start: usize,
    end: usize,
    scopes: Vec<Scope>,
}

impl Token {
    pub fn new(start: usize, end: usize, scopes: Vec<Scope>) -> Self {
        Self { start, end, scopes }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The text of the token in the line it was produced from.
    pub fn value<'line>(&self, line: &'line str) -> &'line str {
        &line[self.start..self.end]
    }
}

/// Collects the raw spans the engine produces while scanning a line. Each span runs from the
/// end of the previous one, so spans never overlap or leave gaps; spans that would not move
/// forward are dropped.
#[derive(Debug)]
pub(crate) struct TokenStream {
    tokens: Vec<Token>,
    position: usize,
}

impl TokenStream {
    pub fn starting_at(position: usize) -> Self {
        Self {
            tokens: Vec::new(),
            position,
        }
    }

    /// Emit the text from the current position up to `end` with `scopes`.
    pub fn produce(&mut self, end: usize, scopes: &[Scope]) {
        if end <= self.position {
            return;
        }
        self.tokens
            .push(Token::new(self.position, end, scopes.to_vec()));
        self.position = end;
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Turn the collected spans into the tokens of a line of `length` bytes: spans past the
    /// line are cut, and, if `merge` is set, neighbours with the same scopes become one token.
    /// An empty line gets a single empty token with `scopes`, the scopes open at its end.
    pub fn finish(self, length: usize, merge: bool, scopes: &[Scope]) -> Vec<Token> {
        if length == 0 {
            return vec![Token::new(0, 0, scopes.to_vec())];
        }
        let clipped = self
            .tokens
            .into_iter()
            .filter(|token| token.start < length)
            .map(|token| Token {
                end: token.end.min(length),
                ..token
            });
        if !merge {
            return clipped.collect();
        }
        clipped
            .coalesce(|previous, next| {
                if previous.scopes == next.scopes && previous.end == next.start {
                    Ok(Token {
                        end: next.end,
                        ..previous
                    })
                } else {
                    Err((previous, next))
                }
            })
            .collect()
    }
}
