use super::ast::{RawCaptures, RawGrammar, RawRule};
use crate::builder::Buildable;
use crate::error::{Error, ErrorKind, Result, Warning, WarningType};
use crate::regex::CompiledRegex;
use crate::scope::{Scope, ScopeName};
use crate::tokenizer::TokenizationState;
use fixedbitset::FixedBitSet;
use newty::newty;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn grammar(definition: serde_json::Value) -> Result<Grammar> {
        Grammar::build_from_raw(serde_json::from_value(definition).unwrap())
    }

    fn candidate_names(grammar: &Grammar, rule: RuleId) -> Vec<String> {
        grammar
            .candidates(rule)
            .unwrap()
            .into_iter()
            .map(|id| grammar[id].name().unwrap().source().to_owned())
            .collect()
    }

    #[test]
    fn top_level_rules_in_order() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [
                { "match": "a", "name": "first" },
                { "begin": "\\(", "end": "\\)", "name": "second" },
                { "patterns": [{ "match": "c", "name": "third" }] },
            ]
        }))
        .unwrap();
        assert_eq!(&**grammar.scope_name(), "source.t");
        assert_eq!(
            candidate_names(&grammar, grammar.root()),
            vec!["first", "second", "third"]
        );
        assert!(matches!(grammar[grammar.root()].kind(), RuleKind::Group));
    }

    #[test]
    fn cyclic_references() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "include": "#a" }],
            "repository": {
                "a": { "patterns": [{ "match": "a", "name": "in.a" }, { "include": "#b" }] },
                "b": { "patterns": [{ "include": "#a" }, { "include": "$self" }, { "match": "b", "name": "in.b" }] },
            }
        }))
        .unwrap();
        assert_eq!(candidate_names(&grammar, grammar.root()), vec!["in.a", "in.b"]);
        grammar.check_references().unwrap();
    }

    #[test]
    fn nested_repositories_are_scoped() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{
                "begin": "\\{",
                "end": "\\}",
                "name": "block",
                "patterns": [{ "include": "#item" }, { "include": "#outer" }],
                "repository": { "item": { "match": "i", "name": "inner.item" } }
            }],
            "repository": {
                "item": { "match": "o", "name": "outer.item" },
                "outer": { "match": "x", "name": "outer.x" }
            }
        }))
        .unwrap();
        let block = grammar.candidates(grammar.root()).unwrap()[0];
        assert_eq!(
            candidate_names(&grammar, block),
            vec!["inner.item", "outer.x"]
        );
    }

    #[test]
    fn own_scope_references() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "include": "source.t#num" }],
            "repository": { "num": { "match": "\\d", "name": "num" } }
        }))
        .unwrap();
        assert_eq!(candidate_names(&grammar, grammar.root()), vec!["num"]);
    }

    #[test]
    fn unresolved_references_fail_when_used() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "include": "#nowhere" }, { "include": "source.other" }]
        }))
        .unwrap();
        let error = grammar.candidates(grammar.root()).unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::UnresolvedRuleReference { reference } if reference == "#nowhere"
        ));
        assert!(grammar.check_references().is_err());
    }

    #[test]
    fn structural_errors() {
        let both = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "match": "a", "begin": "b", "end": "c" }]
        }))
        .unwrap_err();
        assert!(matches!(
            both.kind(),
            ErrorKind::GrammarLoad { location, .. } if location == "patterns[0]"
        ));

        let no_end = grammar(json!({
            "scopeName": "source.t",
            "repository": { "r": { "patterns": [{ "begin": "b" }] } }
        }))
        .unwrap_err();
        assert!(matches!(
            no_end.kind(),
            ErrorKind::GrammarLoad { location, .. } if location == "repository.r.patterns[0]"
        ));

        let malformed = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "match": "(" }]
        }))
        .unwrap_err();
        assert!(matches!(
            malformed.kind(),
            ErrorKind::GrammarLoad { location, .. } if location == "patterns[0].match"
        ));

        let bad_capture = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{ "match": "(a)", "captures": { "one": { "name": "x" } } }]
        }))
        .unwrap_err();
        assert!(matches!(bad_capture.kind(), ErrorKind::GrammarLoad { .. }));
    }

    #[test]
    fn warnings() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [
                { "comment": "nothing here" },
                { "begin": "a", "while": "b" },
                { "match": "(a)", "captures": { "3": { "name": "x" } } }
            ]
        }))
        .unwrap();
        let kinds: Vec<_> = grammar.warnings().iter().map(|w| w.warning_type().clone()).collect();
        assert_eq!(
            kinds,
            vec![
                WarningType::EmptyRule,
                WarningType::UnsupportedWhile,
                WarningType::CaptureOutOfRange { group: 3, groups: 1 }
            ]
        );
        let locations: Vec<_> = grammar.warnings().iter().map(|w| w.location()).collect();
        assert_eq!(locations, vec!["patterns[0]", "patterns[1]", "patterns[2].captures.3"]);
        assert!(grammar.candidates(grammar.root()).unwrap().len() == 1);
    }

    #[test]
    fn captures_are_sorted_and_fall_back() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "patterns": [{
                "begin": "(a)(b)(c)(d)(e)(f)(g)(h)(i)(j)(k)",
                "end": "(z)",
                "captures": {
                    "10": { "name": "ten" },
                    "2": { "name": "two", "patterns": [{ "match": "b", "name": "bee" }] }
                }
            }]
        }))
        .unwrap();
        let rule = &grammar[grammar.candidates(grammar.root()).unwrap()[0]];
        let RuleKind::BeginEnd { begin_captures, end_captures, .. } = rule.kind() else {
            panic!("expected a begin/end rule");
        };
        let groups: Vec<_> = begin_captures.iter().map(Capture::group).collect();
        assert_eq!(groups, vec![2, 10]);
        assert!(begin_captures.iter().next().unwrap().rule().is_some());
        // `(z)` has a single group, capture 2 and 10 are out of range for the end.
        assert!(end_captures.is_empty());
    }
}

newty! {
    #[derive(PartialOrd, Ord)]
    pub id RuleId
}

newty! {
    pub id RepositoryId
}

newty! {
    pub vec Rules(Rule)[RuleId]
}

newty! {
    vec Repositories(Repository)[RepositoryId]
}

/// # Summary
///
/// `Rule` is a single entry of a grammar. Matchable rules are either a `match` rule or a
/// `begin`/`end` rule; [`RuleKind::Group`] rules only hold patterns and are used for the
/// grammar's top level and for captures that are tokenized further.
///
/// # Methods
///
/// `id`: the index of the rule in its grammar
/// `name`: the scope pushed for the whole match
/// `content_name`: the scope pushed between the begin and the end matches
/// `kind`: the expressions of the rule
/// `patterns`: the nested rules, in declaration order
#[derive(Debug)]
pub struct Rule {
    id: RuleId,
    name: Option<ScopeName>,
    content_name: Option<ScopeName>,
    kind: RuleKind,
    patterns: Vec<Pattern>,
}

impl Rule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn name(&self) -> Option<&ScopeName> {
        self.name.as_ref()
    }

    pub fn content_name(&self) -> Option<&ScopeName> {
        self.content_name.as_ref()
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// The expression searched for to start matching this rule.
    pub fn first_regex(&self) -> Option<&CompiledRegex> {
        match &self.kind {
            RuleKind::Match { regex, .. } => Some(regex),
            RuleKind::BeginEnd { begin, .. } => Some(begin),
            RuleKind::Group => None,
        }
    }
}

#[derive(Debug)]
pub enum RuleKind {
    Match {
        regex: CompiledRegex,
        captures: Captures,
    },
    BeginEnd {
        begin: CompiledRegex,
        end: CompiledRegex,
        begin_captures: Captures,
        end_captures: Captures,
        apply_end_pattern_last: bool,
    },
    Group,
}

/// Captures of an expression, ordered by group index.
#[derive(Debug, Default)]
pub struct Captures(Vec<Capture>);

impl Captures {
    pub fn iter(&self) -> std::slice::Iter<'_, Capture> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug)]
pub struct Capture {
    group: usize,
    name: Option<ScopeName>,
    rule: Option<RuleId>,
}

impl Capture {
    pub fn group(&self) -> usize {
        self.group
    }

    pub fn name(&self) -> Option<&ScopeName> {
        self.name.as_ref()
    }

    /// The group rule holding the patterns the captured text is tokenized with, if any.
    pub fn rule(&self) -> Option<RuleId> {
        self.rule
    }
}

/// An entry of a rule list: either a rule, or a reference to a list of rules, looked up by
/// name every time it is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Rule(RuleId),
    Include(Reference),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `$self`
    Itself,
    /// `$base`
    Base,
    /// `#name`, looked up from `repository` outwards.
    Local {
        repository: RepositoryId,
        name: Arc<str>,
    },
    /// `scope.name` or `scope.name#name`.
    External {
        scope: Arc<str>,
        name: Option<Arc<str>>,
    },
}

impl Reference {
    fn parse(include: &str, repository: RepositoryId) -> Self {
        match include {
            "$self" => Self::Itself,
            "$base" => Self::Base,
            _ => {
                if let Some(name) = include.strip_prefix('#') {
                    Self::Local {
                        repository,
                        name: Arc::from(name),
                    }
                } else {
                    let (scope, name) = match include.split_once('#') {
                        Some((scope, name)) => (scope, Some(Arc::from(name))),
                        None => (include, None),
                    };
                    Self::External {
                        scope: Arc::from(scope),
                        name,
                    }
                }
            }
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Itself => write!(f, "$self"),
            Reference::Base => write!(f, "$base"),
            Reference::Local { name, .. } => write!(f, "#{name}"),
            Reference::External {
                scope,
                name: Some(name),
            } => write!(f, "{scope}#{name}"),
            Reference::External { scope, name: None } => write!(f, "{scope}"),
        }
    }
}

#[derive(Debug)]
struct Repository {
    parent: Option<RepositoryId>,
    entries: BTreeMap<Arc<str>, Vec<Pattern>>,
}

/// Where the rules of an expanded reference come from, to expand each list once.
#[derive(Debug, PartialEq, Eq, Hash)]
enum Origin<'g> {
    Root,
    Entry(RepositoryId, &'g str),
}

/// # Summary
///
/// `Grammar` is a compiled TextMate grammar. It is immutable once built and can be shared
/// between threads tokenizing different documents.
///
/// # Methods
///
/// `build_from_raw`: compile a grammar definition
/// `initial_state`: the state to tokenize the first line of a document with
/// `candidates`: the rules that may match inside a given rule, in priority order
/// `check_references`: resolve every reference of the grammar
#[derive(Debug)]
pub struct Grammar {
    scope_name: Scope,
    name: Option<String>,
    rules: Rules,
    repositories: Repositories,
    root: RuleId,
    warnings: Vec<Warning>,
}

impl Grammar {
    pub fn build_from_raw(raw: RawGrammar) -> Result<Self> {
        let mut compiler = Compiler::default();
        let top = compiler.repository(&raw.repository, None, "repository")?;
        let patterns = compiler.patterns(&raw.patterns, top, "patterns")?;
        let root = compiler.push(None, None, RuleKind::Group, patterns);
        debug!(
            scope = raw.scope_name.as_str(),
            rules = compiler.rules.len(),
            warnings = compiler.warnings.len(),
            "grammar loaded"
        );
        Ok(Self {
            scope_name: Scope::from(raw.scope_name.as_str()),
            name: raw.name,
            rules: compiler.rules,
            repositories: compiler.repositories,
            root,
            warnings: compiler.warnings,
        })
    }

    /// The root scope, carried by every token.
    pub fn scope_name(&self) -> &Scope {
        &self.scope_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The group rule holding the top-level patterns.
    pub fn root(&self) -> RuleId {
        self.root
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Top-level repository entries, sorted by name.
    pub fn repository(&self) -> impl Iterator<Item = (&str, &[Pattern])> {
        self.repositories[RepositoryId(0)]
            .entries
            .iter()
            .map(|(name, patterns)| (&**name, &patterns[..]))
    }

    pub fn initial_state(&self) -> TokenizationState {
        TokenizationState::new(self)
    }

    fn lookup(&self, mut repository: RepositoryId, name: &str) -> Option<(Origin<'_>, &[Pattern])> {
        loop {
            let table = &self.repositories[repository];
            if let Some((key, patterns)) = table.entries.get_key_value(name) {
                return Some((Origin::Entry(repository, &**key), patterns));
            }
            repository = table.parent?;
        }
    }

    fn locate(&self, reference: &Reference) -> Option<(Origin<'_>, &[Pattern])> {
        match reference {
            Reference::Itself | Reference::Base => Some((Origin::Root, &self.rules[self.root].patterns)),
            Reference::Local { repository, name } => self.lookup(*repository, name),
            Reference::External { scope, name } if **scope == *self.scope_name => match name {
                Some(name) => self.lookup(RepositoryId(0), name),
                None => Some((Origin::Root, &self.rules[self.root].patterns)),
            },
            Reference::External { .. } => None,
        }
    }

    /// Find the rules a reference stands for.
    pub fn resolve(&self, reference: &Reference) -> Result<&[Pattern]> {
        self.locate(reference)
            .map(|(_, patterns)| patterns)
            .ok_or_else(|| unresolved(reference))
    }

    /// The matchable rules nested in `rule`, with every reference expanded, in declaration
    /// order. A rule reachable through several references is listed once, at its first
    /// position.
    pub fn candidates(&self, rule: RuleId) -> Result<Vec<RuleId>> {
        let mut candidates = Vec::new();
        let mut seen = FixedBitSet::with_capacity(self.rules.len());
        let mut expanded = HashSet::new();
        if rule == self.root {
            expanded.insert(Origin::Root);
        }
        self.expand(
            &self.rules[rule].patterns,
            &mut candidates,
            &mut seen,
            &mut expanded,
        )?;
        Ok(candidates)
    }

    fn expand<'g>(
        &'g self,
        patterns: &'g [Pattern],
        candidates: &mut Vec<RuleId>,
        seen: &mut FixedBitSet,
        expanded: &mut HashSet<Origin<'g>>,
    ) -> Result<()> {
        for pattern in patterns {
            match pattern {
                Pattern::Rule(id) => {
                    if !seen.put(id.0) {
                        candidates.push(*id);
                    }
                }
                Pattern::Include(reference) => {
                    let (origin, included) =
                        self.locate(reference).ok_or_else(|| unresolved(reference))?;
                    if expanded.insert(origin) {
                        self.expand(included, candidates, seen, expanded)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve every reference of the grammar, reporting the first that cannot be.
    pub fn check_references(&self) -> Result<()> {
        let lists = self
            .rules
            .iter()
            .map(|rule| &rule.patterns)
            .chain(self.repositories.iter().flat_map(|table| table.entries.values()));
        for patterns in lists {
            for pattern in patterns {
                if let Pattern::Include(reference) = pattern {
                    self.resolve(reference)?;
                }
            }
        }
        Ok(())
    }
}

impl Buildable for Grammar {
    type Definition = RawGrammar;

    fn build_from_definition(definition: RawGrammar) -> Result<Self> {
        Self::build_from_raw(definition)
    }
}

impl std::ops::Index<RuleId> for Grammar {
    type Output = Rule;

    fn index(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }
}

fn unresolved(reference: &Reference) -> Error {
    Error::new(ErrorKind::UnresolvedRuleReference {
        reference: reference.to_string(),
    })
}

#[derive(Default)]
struct Compiler {
    rules: Rules,
    repositories: Repositories,
    warnings: Vec<Warning>,
}

impl Compiler {
    fn push(
        &mut self,
        name: Option<ScopeName>,
        content_name: Option<ScopeName>,
        kind: RuleKind,
        patterns: Vec<Pattern>,
    ) -> RuleId {
        let id = RuleId(self.rules.len());
        self.rules.push(Rule {
            id,
            name,
            content_name,
            kind,
            patterns,
        });
        id
    }

    fn warn(&mut self, location: &str, warning_type: WarningType) {
        self.warnings.push(Warning::new(location, warning_type));
    }

    fn repository(
        &mut self,
        raw: &BTreeMap<String, RawRule>,
        parent: Option<RepositoryId>,
        location: &str,
    ) -> Result<RepositoryId> {
        let id = RepositoryId(self.repositories.len());
        self.repositories.push(Repository {
            parent,
            entries: BTreeMap::new(),
        });
        for (name, rule) in raw {
            let mut patterns = Vec::new();
            self.pattern(rule, id, &format!("{location}.{name}"), &mut patterns)?;
            self.repositories[id]
                .entries
                .insert(Arc::from(name.as_str()), patterns);
        }
        Ok(id)
    }

    fn patterns(
        &mut self,
        raw: &[RawRule],
        repository: RepositoryId,
        location: &str,
    ) -> Result<Vec<Pattern>> {
        let mut patterns = Vec::new();
        for (i, rule) in raw.iter().enumerate() {
            self.pattern(rule, repository, &format!("{location}[{i}]"), &mut patterns)?;
        }
        Ok(patterns)
    }

    fn regex(&self, source: &str, location: String) -> Result<CompiledRegex> {
        CompiledRegex::new(source).map_err(|error| Error::new(ErrorKind::load(location, error)))
    }

    fn end_regex(&self, source: &str, location: String) -> Result<CompiledRegex> {
        CompiledRegex::new_end(source).map_err(|error| Error::new(ErrorKind::load(location, error)))
    }

    /// Compile `raw` and append what it contributes to `patterns`: nothing, a rule, a
    /// reference, or, for rules that only group patterns, each of those.
    fn pattern(
        &mut self,
        raw: &RawRule,
        repository: RepositoryId,
        location: &str,
        patterns: &mut Vec<Pattern>,
    ) -> Result<()> {
        let repository = match &raw.repository {
            Some(nested) => {
                self.repository(nested, Some(repository), &format!("{location}.repository"))?
            }
            None => repository,
        };
        if let Some(include) = &raw.include {
            patterns.push(Pattern::Include(Reference::parse(include, repository)));
            return Ok(());
        }
        let name = raw.name.as_deref().map(ScopeName::new);
        let content_name = raw.content_name.as_deref().map(ScopeName::new);
        let nested = match &raw.patterns {
            Some(nested) => self.patterns(nested, repository, &format!("{location}.patterns"))?,
            None => Vec::new(),
        };
        let kind = match (&raw.match_, &raw.begin) {
            (Some(_), Some(_)) => {
                return ErrorKind::load(location, "a rule cannot have both `match` and `begin`")
                    .err()
            }
            (Some(_), None) if raw.end.is_some() || raw.while_.is_some() => {
                return ErrorKind::load(location, "a `match` rule cannot have an `end` or a `while`")
                    .err()
            }
            (Some(source), None) => {
                let regex = self.regex(source, format!("{location}.match"))?;
                let captures = self.captures(
                    raw.captures.as_ref(),
                    &regex,
                    repository,
                    &format!("{location}.captures"),
                )?;
                RuleKind::Match { regex, captures }
            }
            (None, Some(_)) if raw.while_.is_some() => {
                self.warn(location, WarningType::UnsupportedWhile);
                return Ok(());
            }
            (None, Some(begin)) => {
                let Some(end) = &raw.end else {
                    return ErrorKind::load(location, "a `begin` rule needs an `end`").err();
                };
                let begin = self.regex(begin, format!("{location}.begin"))?;
                let end = self.end_regex(end, format!("{location}.end"))?;
                let begin_captures = self.captures(
                    raw.begin_captures.as_ref().or(raw.captures.as_ref()),
                    &begin,
                    repository,
                    &format!("{location}.beginCaptures"),
                )?;
                let end_captures = self.captures(
                    raw.end_captures.as_ref().or(raw.captures.as_ref()),
                    &end,
                    repository,
                    &format!("{location}.endCaptures"),
                )?;
                RuleKind::BeginEnd {
                    begin,
                    end,
                    begin_captures,
                    end_captures,
                    apply_end_pattern_last: raw.apply_end_pattern_last,
                }
            }
            (None, None) if raw.end.is_some() || raw.while_.is_some() => {
                return ErrorKind::load(location, "`end` and `while` need a `begin`").err()
            }
            (None, None) => {
                if raw.patterns.is_none() {
                    self.warn(location, WarningType::EmptyRule);
                }
                patterns.extend(nested);
                return Ok(());
            }
        };
        let id = self.push(name, content_name, kind, nested);
        patterns.push(Pattern::Rule(id));
        Ok(())
    }

    fn captures(
        &mut self,
        raw: Option<&RawCaptures>,
        regex: &CompiledRegex,
        repository: RepositoryId,
        location: &str,
    ) -> Result<Captures> {
        let mut captures = Vec::new();
        for (key, capture) in raw.into_iter().flatten() {
            let location = format!("{location}.{key}");
            let Ok(group) = key.parse::<usize>() else {
                return ErrorKind::load(location, format!("`{key}` is not a group index")).err();
            };
            if group > regex.groups_len() {
                self.warn(
                    &location,
                    WarningType::CaptureOutOfRange {
                        group,
                        groups: regex.groups_len(),
                    },
                );
                continue;
            }
            let rule = match &capture.patterns {
                Some(nested) => {
                    let patterns =
                        self.patterns(nested, repository, &format!("{location}.patterns"))?;
                    Some(self.push(None, None, RuleKind::Group, patterns))
                }
                None => None,
            };
            captures.push(Capture {
                group,
                name: capture.name.as_deref().map(ScopeName::new),
                rule,
            });
        }
        captures.sort_by_key(Capture::group);
        Ok(Captures(captures))
    }
}
