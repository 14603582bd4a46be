//! # Scopes
//!
//! A scope is a dotted identifier such as `constant.numeric.puppet` that classifies a piece of
//! text. While a line is scanned, the scopes that currently apply are kept in a [`ScopeStack`],
//! outermost first. Grammars do not name scopes directly: they give [`ScopeName`]s, which may
//! hold several scopes separated by spaces and may refer to the captures of the match that
//! pushes them (`$1`, `${2:/downcase}`).

use std::ops::Range;
use std::sync::Arc;


/// A single scope. Shared, so that tokens and states stay cheap to clone and can cross threads.
pub type Scope = Arc<str>;

/// # Summary
///
/// `ScopeName` is the `name` or `contentName` of a rule, or the name of a capture, as written
/// in the grammar.
///
/// # Methods
///
/// `new`: read a scope name
/// `is_dynamic`: whether the name refers to captures
/// `resolve`: produce the scopes to push for a given match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeName {
    source: Arc<str>,
    scopes: Vec<Scope>,
    dynamic: bool,
}

impl ScopeName {
    pub fn new(source: &str) -> Self {
        let dynamic = source.contains('$');
        let scopes = if dynamic {
            Vec::new()
        } else {
            source.split_whitespace().map(Scope::from).collect()
        };
        Self {
            source: Arc::from(source),
            scopes,
            dynamic,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Produce the scopes named, substituting capture references with the text they captured
    /// in `line`. `groups[0]` is the whole match.
    pub fn resolve<'a>(
        &'a self,
        line: &str,
        groups: &[Option<Range<usize>>],
    ) -> impl Iterator<Item = Scope> + 'a {
        let substituted = if self.dynamic {
            substitute(&self.source, line, groups)
                .split_whitespace()
                .map(Scope::from)
                .collect()
        } else {
            Vec::new()
        };
        self.scopes.iter().cloned().chain(substituted)
    }
}

fn captured<'l>(line: &'l str, groups: &[Option<Range<usize>>], index: usize) -> Option<&'l str> {
    let range = groups.get(index)?.clone()?;
    line.get(range).map(|text| text.trim_start_matches('.'))
}

fn read_number(chars: &[char], mut pos: usize) -> Option<(usize, usize)> {
    let start = pos;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    let number = chars[start..pos].iter().collect::<String>().parse().ok()?;
    Some((number, pos))
}

/// Replace `$n`, `${n}` and `${n:/downcase}` / `${n:/upcase}`. Anything that does not refer to
/// an existing capture is copied as is.
fn substitute(source: &str, line: &str, groups: &[Option<Range<usize>>]) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut result = String::with_capacity(source.len());
    let mut pos = 0;
    while pos < chars.len() {
        if chars[pos] != '$' {
            result.push(chars[pos]);
            pos += 1;
            continue;
        }
        if let Some((index, next)) = read_number(&chars, pos + 1) {
            if let Some(text) = captured(line, groups, index) {
                result.push_str(text);
                pos = next;
                continue;
            }
        } else if chars.get(pos + 1) == Some(&'{') {
            if let Some((index, next)) = read_number(&chars, pos + 2) {
                let close = chars[next..].iter().position(|&c| c == '}').map(|i| next + i);
                if let (Some(close), Some(text)) = (close, captured(line, groups, index)) {
                    let modifier: String = chars[next..close].iter().collect();
                    let replacement = match modifier.as_str() {
                        "" => Some(text.to_owned()),
                        ":/downcase" => Some(text.to_lowercase()),
                        ":/upcase" => Some(text.to_uppercase()),
                        _ => None,
                    };
                    if let Some(replacement) = replacement {
                        result.push_str(&replacement);
                        pos = close + 1;
                        continue;
                    }
                }
            }
        }
        result.push('$');
        pos += 1;
    }
    result
}

/// # Summary
///
/// `ScopeStack` is the ordered sequence of scopes active at the scan position, innermost last.
/// Its first element is the grammar's root scope and is never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new(root: Scope) -> Self {
        Self { scopes: vec![root] }
    }

    pub fn extend(&mut self, scopes: impl IntoIterator<Item = Scope>) {
        self.scopes.extend(scopes);
    }

    /// Drop every scope above `depth`. The root scope is kept in any case.
    pub fn truncate(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn innermost(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn as_slice(&self) -> &[Scope] {
        &self.scopes
    }
}
