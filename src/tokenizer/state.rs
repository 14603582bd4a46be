use crate::grammar::{Grammar, RuleId};
use crate::regex::CompiledRegex;
use crate::scope::{Scope, ScopeStack};
use std::sync::Arc;


/// An entry of the stack of entered rules.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub rule: RuleId,
    /// Depth of the scope stack before the rule's `name` was pushed.
    pub base_depth: usize,
    /// Depth of the scope stack before the rule's `contentName` was pushed.
    pub name_depth: usize,
    /// The anchor position in effect when the rule was entered, restored when it ends.
    pub anchor: Option<usize>,
    /// The begin match consumed the end of its line: `\G` matches at the start of the next.
    pub captured_eol: bool,
    /// The end expression with its back-references substituted.
    pub end: Option<Arc<CompiledRegex>>,
}

impl Frame {
    /// A frame that only provides patterns, such as the top level of a grammar.
    pub fn group(rule: RuleId, depth: usize) -> Self {
        Self {
            rule,
            base_depth: depth,
            name_depth: depth,
            anchor: None,
            captured_eol: false,
            end: None,
        }
    }
}

/// # Summary
///
/// `TokenizationState` is everything the tokenizer needs to carry from a line to the next: the
/// scopes open at the end of the line, and the `begin`/`end` rules still waiting for their end.
///
/// The state is owned by the caller, one per document. It is passed to
/// [`Tokenizer::tokenize_line`](crate::tokenizer::Tokenizer::tokenize_line) and a new one is
/// returned, so independent documents can be tokenized concurrently with the same grammar.
/// Two states that compare equal tokenize the following lines identically.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizationState {
    pub(crate) scopes: ScopeStack,
    /// The grammar's top level first, then every entered `begin`/`end` rule.
    pub(crate) frames: Vec<Frame>,
    pub(crate) lines: usize,
}

impl TokenizationState {
    pub fn new(grammar: &Grammar) -> Self {
        Self {
            scopes: ScopeStack::new(grammar.scope_name().clone()),
            frames: vec![Frame::group(grammar.root(), 1)],
            lines: 0,
        }
    }

    /// The scopes open at the end of the last tokenized line, outermost first.
    pub fn scopes(&self) -> &[Scope] {
        self.scopes.as_slice()
    }

    /// How many `begin`/`end` rules are waiting for their end.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// The `begin`/`end` rules waiting for their end, outermost first, with the anchor
    /// position in effect when each was entered.
    pub fn active_rules(&self) -> impl Iterator<Item = (RuleId, Option<usize>)> + '_ {
        self.frames[1..]
            .iter()
            .map(|frame| (frame.rule, frame.anchor))
    }

    /// How many lines were tokenized to reach this state.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Forget the positions recorded on the previous line.
    pub(crate) fn start_line(&mut self) {
        for frame in &mut self.frames {
            frame.anchor = None;
        }
    }
}
