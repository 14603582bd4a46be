//! Source-level rewriting of Oniguruma expressions. None of this parses the expressions: it only
//! walks them escape by escape, which is enough to find anchors and back-references.

use std::ops::Range;


/// What the engine has to know about an expression before searching with it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Uses `\G`, which only matches at the anchor position.
    pub g_anchor: bool,
    /// Uses `\A`, which only matches on the first line.
    pub a_anchor: bool,
    /// Refers to `\1`..`\9`, to be taken from another match.
    pub backreferences: bool,
}

impl Features {
    pub fn of(source: &str) -> Self {
        let mut features = Self::default();
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                continue;
            }
            match chars.next() {
                Some('G') => features.g_anchor = true,
                Some('A') => features.a_anchor = true,
                Some('1'..='9') => features.backreferences = true,
                _ => {}
            }
        }
        features
    }
}

/// Replace every `\<anchor>` escape with `(?!)`, which never matches.
pub fn disable_anchor(source: &str, anchor: char) -> String {
    let mut result = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if next == anchor => result.push_str("(?!)"),
            Some(next) => {
                result.push('\\');
                result.push(next);
            }
            None => result.push('\\'),
        }
    }
    result
}

/// Replace `\n` references with the escaped text of group `n` of a match on `line`.
/// References to groups that did not participate become empty.
pub fn substitute_backreferences(
    source: &str,
    line: &str,
    groups: &[Option<Range<usize>>],
) -> String {
    let mut result = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(digit @ '1'..='9') => {
                chars.next();
                let index = digit as usize - '0' as usize;
                if let Some(text) = groups
                    .get(index)
                    .and_then(|group| group.clone())
                    .and_then(|range| line.get(range))
                {
                    result.push_str(&escape(text));
                }
            }
            Some(next) => {
                chars.next();
                result.push('\\');
                result.push(next);
            }
            None => result.push('\\'),
        }
    }
    result
}

/// Escape `text` so that it matches itself.
pub fn escape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '-' | '\\'
                | '{'
                | '}'
                | '*'
                | '+'
                | '?'
                | '|'
                | '^'
                | '$'
                | '.'
                | ','
                | '['
                | ']'
                | '('
                | ')'
                | '#'
        ) || c.is_whitespace()
        {
            result.push('\\');
        }
        result.push(c);
    }
    result
}
