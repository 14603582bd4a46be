use super::state::{Frame, TokenizationState};
use super::token::{Token, TokenStream};
use crate::error::Result;
use crate::grammar::{Captures, Grammar, RuleId, RuleKind};
use crate::regex::{find_earliest, Anchors, Match};
use crate::scope::ScopeStack;
use fixedbitset::FixedBitSet;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, trace, warn};


/// Settings of a [`Tokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizerOptions {
    /// Neighbouring tokens with the same scopes become one token.
    pub merge_adjacent: bool,
    /// Lines longer than this many bytes are not scanned: they are returned as a single token
    /// with the scopes open before them, and only the line count of the state changes.
    pub max_line_length: Option<usize>,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            merge_adjacent: true,
            max_line_length: None,
        }
    }
}

/// # Summary
///
/// `Tokenizer` turns lines of text into tokens according to a [`Grammar`]. It holds no
/// per-document data: the progress through a document is the [`TokenizationState`] the caller
/// passes to every call.
///
/// # Methods
///
/// `new`: create a tokenizer for a grammar
/// `with_options`: change the settings of the tokenizer
/// `initial_state`: the state to tokenize the first line of a document with
/// `tokenize_line`: tokenize one line
/// `tokenize_document`: tokenize every line of a text
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer<'g> {
    grammar: &'g Grammar,
    options: TokenizerOptions,
}

impl<'g> Tokenizer<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            options: TokenizerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TokenizerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn options(&self) -> TokenizerOptions {
        self.options
    }

    pub fn initial_state(&self) -> TokenizationState {
        TokenizationState::new(self.grammar)
    }

    /// Tokenize `line`, which should not contain line breaks other than a final `\n`, in
    /// `state`. Return the state to tokenize the next line with, and the tokens of this one.
    ///
    /// Any text can be tokenized; the only failure is meeting a reference to a rule the
    /// grammar does not have.
    pub fn tokenize_line(
        &self,
        mut state: TokenizationState,
        line: &str,
    ) -> Result<(TokenizationState, Vec<Token>)> {
        if self
            .options
            .max_line_length
            .map_or(false, |limit| line.len() > limit)
        {
            let token = Token::new(0, line.len(), state.scopes().to_vec());
            state.lines += 1;
            return Ok((state, vec![token]));
        }

        state.start_line();
        let text = if line.ends_with('\n') {
            Cow::Borrowed(line)
        } else {
            Cow::Owned(format!("{line}\n"))
        };
        let anchor = state
            .frames
            .last()
            .and_then(|frame| frame.captured_eol.then_some(0));
        let scan = Scan {
            grammar: self.grammar,
            line: &text,
            first_line: state.lines == 0,
        };
        let mut stream = TokenStream::starting_at(0);
        scan.run(0, anchor, &mut state.scopes, &mut state.frames, &mut stream)?;
        let tokens = stream.finish(line.len(), self.options.merge_adjacent, state.scopes());
        state.lines += 1;
        Ok((state, tokens))
    }

    /// Tokenize every line of `text`, lines being separated by `\n`. Return each line with its
    /// tokens.
    pub fn tokenize_document<'t>(&self, text: &'t str) -> Result<Vec<(&'t str, Vec<Token>)>> {
        let mut state = self.initial_state();
        let mut lines = Vec::new();
        for line in text.strip_suffix('\n').unwrap_or(text).split('\n') {
            let (next, tokens) = self.tokenize_line(state, line)?;
            state = next;
            lines.push((line, tokens));
        }
        debug!(lines = lines.len(), depth = state.depth(), "document tokenized");
        Ok(lines)
    }
}

/// What a search found: a nested rule, or the end of the innermost rule.
#[derive(Debug, Clone, Copy)]
enum Target {
    Rule(RuleId),
    End,
}

/// A pass over (part of) a line.
#[derive(Clone, Copy)]
struct Scan<'a> {
    grammar: &'a Grammar,
    line: &'a str,
    first_line: bool,
}

impl Scan<'_> {
    fn run(
        &self,
        mut position: usize,
        mut anchor: Option<usize>,
        scopes: &mut ScopeStack,
        frames: &mut Vec<Frame>,
        stream: &mut TokenStream,
    ) -> Result<()> {
        let grammar = self.grammar;
        // Rules that matched the empty string at `position`.
        let mut spent = FixedBitSet::with_capacity(grammar.rules().len());
        while position < self.line.len() {
            let Some(frame) = frames.last() else {
                break;
            };
            let Some((target, found)) = self.find_next(position, anchor, frame, &spent)? else {
                break;
            };
            match target {
                Target::End => {
                    let Some(frame) = frames.pop() else {
                        break;
                    };
                    debug!(rule = frame.rule.0, start = found.start(), end = found.end(), "rule ended");
                    stream.produce(found.start(), scopes.as_slice());
                    scopes.truncate(frame.name_depth);
                    if let RuleKind::BeginEnd { end_captures, .. } = grammar[frame.rule].kind() {
                        self.captures(end_captures, &found, scopes, stream)?;
                    }
                    stream.produce(found.end(), scopes.as_slice());
                    scopes.truncate(frame.base_depth);
                    anchor = frame.anchor;
                }
                Target::Rule(id) => {
                    trace!(rule = id.0, start = found.start(), end = found.end(), "match");
                    let rule = &grammar[id];
                    stream.produce(found.start(), scopes.as_slice());
                    let base_depth = scopes.depth();
                    if let Some(name) = rule.name() {
                        scopes.extend(name.resolve(self.line, found.groups()));
                    }
                    let name_depth = scopes.depth();
                    match rule.kind() {
                        RuleKind::Match { captures, .. } => {
                            self.captures(captures, &found, scopes, stream)?;
                            stream.produce(found.end(), scopes.as_slice());
                            scopes.truncate(base_depth);
                        }
                        RuleKind::BeginEnd {
                            begin_captures,
                            end,
                            ..
                        } => {
                            self.captures(begin_captures, &found, scopes, stream)?;
                            stream.produce(found.end(), scopes.as_slice());
                            if let Some(content_name) = rule.content_name() {
                                scopes.extend(content_name.resolve(self.line, found.groups()));
                            }
                            let end = if end.has_backreferences() {
                                match end.with_backreferences(self.line, found.groups()) {
                                    Ok(resolved) => Some(Arc::new(resolved)),
                                    Err(error) => {
                                        warn!(%error, "keeping the end expression unresolved");
                                        None
                                    }
                                }
                            } else {
                                None
                            };
                            debug!(rule = id.0, depth = frames.len(), "rule entered");
                            frames.push(Frame {
                                rule: id,
                                base_depth,
                                name_depth,
                                anchor,
                                captured_eol: found.end() == self.line.len(),
                                end,
                            });
                            anchor = Some(found.end());
                        }
                        RuleKind::Group => scopes.truncate(base_depth),
                    }
                }
            }
            if found.end() > position {
                position = found.end();
                spent.clear();
            }
            if let (Target::Rule(id), true) = (target, found.is_empty()) {
                spent.insert(id.0);
            }
        }
        stream.produce(self.line.len(), scopes.as_slice());
        Ok(())
    }

    /// Search for the end of the innermost rule and for every rule nested in it, and keep the
    /// match that starts first.
    fn find_next(
        &self,
        position: usize,
        anchor: Option<usize>,
        frame: &Frame,
        spent: &FixedBitSet,
    ) -> Result<Option<(Target, Match)>> {
        let grammar = self.grammar;
        let anchors = Anchors {
            first_line: self.first_line,
            at_anchor: anchor == Some(position),
        };
        let candidates = grammar.candidates(frame.rule)?;
        let nested = find_earliest(
            candidates
                .iter()
                .filter_map(|&id| grammar[id].first_regex().map(|regex| (id, regex))),
            self.line,
            position,
            anchors,
            |id: RuleId| spent.contains(id.0),
        );
        let RuleKind::BeginEnd {
            end,
            apply_end_pattern_last,
            ..
        } = grammar[frame.rule].kind()
        else {
            return Ok(nested.map(|(id, found)| (Target::Rule(id), found)));
        };
        let end = frame.end.as_deref().unwrap_or(end);
        let found_end = end.find_at(self.line, position, anchors);
        Ok(match (nested, found_end) {
            (Some((id, found)), Some(found_end))
                if found.start() < found_end.start()
                    || (found.start() == found_end.start() && *apply_end_pattern_last) =>
            {
                Some((Target::Rule(id), found))
            }
            (_, Some(found_end)) => Some((Target::End, found_end)),
            (Some((id, found)), None) => Some((Target::Rule(id), found)),
            (None, None) => None,
        })
    }

    /// Emit the tokens of the captured groups of `found`. Groups nest: a group inside another
    /// gets the scopes of both.
    fn captures(
        &self,
        captures: &Captures,
        found: &Match,
        scopes: &ScopeStack,
        stream: &mut TokenStream,
    ) -> Result<()> {
        // Groups whose scopes are open, with where they end.
        let mut open: Vec<(ScopeStack, usize)> = Vec::new();
        for capture in captures.iter() {
            let Some(range) = found.groups().get(capture.group()).cloned().flatten() else {
                continue;
            };
            if range.is_empty() {
                continue;
            }
            while open.last().map_or(false, |(_, end)| *end <= range.start) {
                if let Some((outer, end)) = open.pop() {
                    stream.produce(end, outer.as_slice());
                }
            }
            let mut inner = open.last().map_or(scopes, |(outer, _)| outer).clone();
            stream.produce(range.start, inner.as_slice());
            if let Some(name) = capture.name() {
                inner.extend(name.resolve(self.line, found.groups()));
            }
            if let Some(rule) = capture.rule() {
                let nested = Scan {
                    line: &self.line[..range.end],
                    first_line: self.first_line && range.start == 0,
                    ..*self
                };
                let mut frames = vec![Frame::group(rule, inner.depth())];
                let mut nested_stream = TokenStream::starting_at(range.start);
                nested.run(range.start, None, &mut inner, &mut frames, &mut nested_stream)?;
                for token in nested_stream.into_tokens() {
                    stream.produce(token.end(), token.scopes());
                }
            } else if capture.name().is_some() {
                open.push((inner, range.end));
            }
        }
        while let Some((outer, end)) = open.pop() {
            stream.produce(end, outer.as_slice());
        }
        Ok(())
    }
}
