use super::parsing::{disable_anchor, substitute_backreferences, Features};
use onig::{Region, RegexOptions, SearchOptions, Syntax};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[cfg(test)]
mod tests {
    use super::*;
    use fixedbitset::FixedBitSet;

    fn regex(source: &str) -> CompiledRegex {
        CompiledRegex::new(source).unwrap()
    }

    #[test]
    fn find_at() {
        let digits = regex(r"(\d)(\d)?");
        let found = digits.find_at("ab 42 7", 0, Anchors::default()).unwrap();
        assert_eq!(found.start(), 3);
        assert_eq!(found.end(), 5);
        assert_eq!(found.groups(), &[Some(3..5), Some(3..4), Some(4..5)]);
        assert_eq!(found.text("ab 42 7"), "42");

        let found = digits.find_at("ab 42 7", 5, Anchors::default()).unwrap();
        assert_eq!(found.groups(), &[Some(6..7), Some(6..7), None]);
        assert!(digits.find_at("ab 42 7", 7, Anchors::default()).is_none());
    }

    #[test]
    fn lookbehind_sees_before_the_cursor() {
        let after_dollar = regex(r"(?<=\$)\w+");
        let found = after_dollar.find_at("$foo", 1, Anchors::default()).unwrap();
        assert_eq!(found.start(), 1);
        assert_eq!(found.end(), 4);
    }

    #[test]
    fn g_anchor() {
        let anchored = regex(r"\Gb");
        assert!(anchored.has_anchor());
        let active = Anchors {
            first_line: false,
            at_anchor: true,
        };
        assert_eq!(anchored.find_at("ab", 1, active).unwrap().start(), 1);
        assert!(anchored.find_at("ab", 1, Anchors::default()).is_none());
        assert!(anchored.find_at("ab", 0, active).is_none());
        assert!(anchored.find_at("a\u{FFFF}b", 1, Anchors::default()).is_none());
    }

    #[test]
    fn a_anchor() {
        let shebang = regex(r"\A#!");
        let first = Anchors {
            first_line: true,
            at_anchor: false,
        };
        assert!(shebang.find_at("#!/bin/sh", 0, first).is_some());
        assert!(shebang.find_at("#!/bin/sh", 0, Anchors::default()).is_none());
    }

    #[test]
    fn backreferences() {
        let begin = regex(r"<<(\w+)");
        let end = CompiledRegex::new_end(r"^\1$").unwrap();
        assert!(end.has_backreferences());
        let line = "x = <<EOT";
        let found = begin.find_at(line, 0, Anchors::default()).unwrap();
        let resolved = end.with_backreferences(line, found.groups()).unwrap();
        assert_eq!(resolved.source(), "^EOT$");
        assert!(resolved.find_at("EOT\n", 0, Anchors::default()).is_some());
        assert!(resolved.find_at("EOF\n", 0, Anchors::default()).is_none());
    }

    #[test]
    fn backreferences_inside_their_own_expression() {
        let quoted = regex(r#"(['"])\w+\1"#);
        let found = quoted.find_at(r#"x 'ab" 'cd'"#, 0, Anchors::default()).unwrap();
        assert_eq!((found.start(), found.end()), (7, 11));
    }

    #[test]
    fn malformed() {
        let error = CompiledRegex::new("(unclosed").unwrap_err();
        assert_eq!(error.pattern, "(unclosed");
        assert!(!error.message.is_empty());
    }

    #[test]
    fn group_count() {
        assert_eq!(regex("a").groups_len(), 0);
        assert_eq!(regex("(a)(?:b)(?<name>c)").groups_len(), 2);
    }

    #[test]
    fn earliest_wins_then_declaration_order() {
        let patterns = [regex("b+"), regex("a"), regex("ab")];
        let candidates = patterns.iter().enumerate();
        let (index, found) =
            find_earliest(candidates, "xab", 0, Anchors::default(), |_| false).unwrap();
        assert_eq!(index, 1);
        assert_eq!(found.start(), 1);
        assert_eq!(found.end(), 2);
    }

    #[test]
    fn spent_patterns_skip_empty_matches() {
        let patterns = [regex("x*"), regex("y")];
        let mut spent = FixedBitSet::with_capacity(2);
        let (index, found) =
            find_earliest(patterns.iter().enumerate(), "ay", 0, Anchors::default(), |i| spent.contains(i))
                .unwrap();
        assert_eq!((index, found.start(), found.end()), (0, 0, 0));
        spent.insert(0);
        let (index, found) =
            find_earliest(patterns.iter().enumerate(), "ay", 0, Anchors::default(), |i| spent.contains(i))
                .unwrap();
        // `x*` matches empty again at 1, but `y` is declared later and starts at 1 too.
        assert_eq!((index, found.start(), found.end()), (0, 1, 1));
    }
}

/// # Summary
///
/// `RegexError` reports an expression that Oniguruma refused to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexError {
    pub pattern: String,
    pub message: String,
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/: {}", self.pattern, self.message)
    }
}

/// Which of the conditional anchors may match during a search.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Anchors {
    /// `\A` may match: the line is the first of the document.
    pub first_line: bool,
    /// `\G` may match: the search starts at the anchor position.
    pub at_anchor: bool,
}

/// # Summary
///
/// `Match` represents the successful report of a search. Unlike the search itself, it does
/// not borrow the text it was run on: group positions are byte ranges into that text.
///
/// # Methods
///
/// `start`: return the start position of the match (inclusive)
/// `end`: return the end position of the match (exclusive)
/// `is_empty`: whether the match has zero width
/// `groups`: return the groups of the regex, the whole match first
/// `text`: return the substring of the input that corresponds to the match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    start: usize,
    end: usize,
    groups: Vec<Option<Range<usize>>>,
}

impl Match {
    /// Return the start position of the match (inclusive).
    pub fn start(&self) -> usize {
        self.start
    }

    /// Return the end position of the match (exclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Return the groups of the regex. `groups()[0]` is the whole match; every other group
    /// may or may not have been caught.
    pub fn groups(&self) -> &[Option<Range<usize>>] {
        &self.groups
    }

    /// Return the substring of the input that corresponds to the match.
    pub fn text<'text>(&self, input: &'text str) -> &'text str {
        &input[self.start..self.end]
    }
}

/// # Summary
///
/// `CompiledRegex` is an Oniguruma expression, compiled once when the grammar is loaded, along
/// with the variants needed to switch its `\G` and `\A` anchors off.
///
/// # Methods
///
/// `new`: compile an expression as written
/// `new_end`: compile an `end` expression, whose back-references wait for the begin match
/// `find_at`: search for the first match at or after a position
/// `with_backreferences`: compile a copy where `\1`..`\9` are replaced by text from a match
pub struct CompiledRegex {
    source: Arc<str>,
    features: Features,
    plain: onig::Regex,
    without_g: Option<onig::Regex>,
    without_a: Option<onig::Regex>,
    without_both: Option<onig::Regex>,
}

fn compile(source: &str) -> Result<onig::Regex, RegexError> {
    onig::Regex::with_options(
        source,
        RegexOptions::REGEX_OPTION_CAPTURE_GROUP,
        Syntax::default(),
    )
    .map_err(|error| RegexError {
        pattern: source.to_owned(),
        message: error.to_string(),
    })
}

impl CompiledRegex {
    pub fn new(source: &str) -> Result<Self, RegexError> {
        Self::build(source, source.to_owned())
    }

    /// Compile an `end` expression. Its back-references refer to the begin match, so they
    /// match the empty string until [`with_backreferences`](Self::with_backreferences) fills
    /// them in.
    pub fn new_end(source: &str) -> Result<Self, RegexError> {
        let searched = if Features::of(source).backreferences {
            substitute_backreferences(source, "", &[])
        } else {
            source.to_owned()
        };
        Self::build(source, searched)
    }

    fn build(source: &str, searched: String) -> Result<Self, RegexError> {
        let features = Features::of(source);
        let plain = compile(&searched)?;
        let without_g = features
            .g_anchor
            .then(|| compile(&disable_anchor(&searched, 'G')))
            .transpose()?;
        let without_a = features
            .a_anchor
            .then(|| compile(&disable_anchor(&searched, 'A')))
            .transpose()?;
        let without_both = (features.g_anchor && features.a_anchor)
            .then(|| compile(&disable_anchor(&disable_anchor(&searched, 'A'), 'G')))
            .transpose()?;
        Ok(Self {
            source: Arc::from(source),
            features,
            plain,
            without_g,
            without_a,
            without_both,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of capture groups, the whole match excluded.
    pub fn groups_len(&self) -> usize {
        self.plain.captures_len()
    }

    pub fn has_anchor(&self) -> bool {
        self.features.g_anchor || self.features.a_anchor
    }

    pub fn has_backreferences(&self) -> bool {
        self.features.backreferences
    }

    pub fn with_backreferences(
        &self,
        line: &str,
        groups: &[Option<Range<usize>>],
    ) -> Result<Self, RegexError> {
        Self::new(&substitute_backreferences(&self.source, line, groups))
    }

    fn variant(&self, anchors: Anchors) -> &onig::Regex {
        let variant = match (anchors.first_line, anchors.at_anchor) {
            (true, true) => None,
            (true, false) => self.without_g.as_ref(),
            (false, true) => self.without_a.as_ref(),
            (false, false) => self
                .without_both
                .as_ref()
                .or(self.without_g.as_ref())
                .or(self.without_a.as_ref()),
        };
        variant.unwrap_or(&self.plain)
    }

    /// Search `input` for the first match starting at or after `from`. The whole input stays
    /// visible to look-behinds, and `\G` matches at `from` when `anchors` allows it.
    pub fn find_at(&self, input: &str, from: usize, anchors: Anchors) -> Option<Match> {
        if from > input.len() {
            return None;
        }
        let mut region = Region::new();
        self.variant(anchors).search_with_options(
            input,
            from,
            input.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;
        let (start, end) = region.pos(0)?;
        let groups = (0..region.len())
            .map(|i| region.pos(i).map(|(start, end)| start..end))
            .collect();
        Some(Match { start, end, groups })
    }
}

impl fmt::Debug for CompiledRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledRegex").field(&self.source).finish()
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CompiledRegex {}

/// Search with several expressions at once and report the one whose match starts first. On a
/// tie, the expression yielded first wins.
///
/// Expressions for which `spent` holds already matched the empty string at `from`: an empty
/// match there is ignored and they are searched again one character further.
pub fn find_earliest<'r, Id: Copy>(
    candidates: impl IntoIterator<Item = (Id, &'r CompiledRegex)>,
    input: &str,
    from: usize,
    anchors: Anchors,
    spent: impl Fn(Id) -> bool,
) -> Option<(Id, Match)> {
    let mut best: Option<(Id, Match)> = None;
    for (id, regex) in candidates {
        let Some(found) = find_unspent(regex, input, from, anchors, spent(id))
        else {
            continue;
        };
        if best
            .as_ref()
            .map_or(true, |(_, current)| found.start < current.start)
        {
            let done = found.start == from;
            best = Some((id, found));
            if done {
                break;
            }
        }
    }
    best
}

fn find_unspent(
    regex: &CompiledRegex,
    input: &str,
    from: usize,
    anchors: Anchors,
    spent: bool,
) -> Option<Match> {
    let found = regex.find_at(input, from, anchors)?;
    if !(spent && found.is_empty() && found.start == from) {
        return Some(found);
    }
    let next = input[from..].chars().next().map(|c| from + c.len_utf8())?;
    regex.find_at(
        input,
        next,
        Anchors {
            at_anchor: false,
            ..anchors
        },
    )
}
