use crate::grammar::{Captures, Grammar, Pattern, RuleKind};
use ptree::{print_tree, write_tree, TreeBuilder};
use std::io;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utilities::grammar;
    use serde_json::json;

    #[test]
    fn shows_rules_and_repository() {
        let grammar = grammar(json!({
            "scopeName": "source.t",
            "name": "Test",
            "patterns": [
                { "include": "#strings" },
                { "match": "(\\d+)", "name": "num", "captures": { "1": { "name": "digits" } } }
            ],
            "repository": {
                "strings": { "begin": "\"", "end": "\"", "contentName": "string.body" }
            }
        }));
        let mut output = Vec::new();
        write_grammar(&grammar, &mut output).unwrap();
        let output = String::from_utf8(output).unwrap();
        for expected in [
            "source.t (Test)",
            "include #strings",
            "match /(\\d+)/ num",
            "capture 1 digits",
            "strings",
            "begin /\"/ end /\"/ content string.body",
        ] {
            assert!(output.contains(expected), "{expected:?} missing from\n{output}");
        }
    }
}

fn build_captures(tree: &mut TreeBuilder, grammar: &Grammar, label: &str, captures: &Captures) {
    if captures.is_empty() {
        return;
    }
    tree.begin_child(label.to_string());
    for capture in captures.iter() {
        let mut description = format!("capture {}", capture.group());
        if let Some(name) = capture.name() {
            description.push(' ');
            description.push_str(name.source());
        }
        match capture.rule() {
            Some(rule) => {
                tree.begin_child(description);
                build_patterns(tree, grammar, grammar[rule].patterns());
                tree.end_child();
            }
            None => {
                tree.add_empty_child(description);
            }
        }
    }
    tree.end_child();
}

fn build_patterns(tree: &mut TreeBuilder, grammar: &Grammar, patterns: &[Pattern]) {
    for pattern in patterns {
        let id = match pattern {
            Pattern::Include(reference) => {
                tree.add_empty_child(format!("include {reference}"));
                continue;
            }
            Pattern::Rule(id) => *id,
        };
        let rule = &grammar[id];
        let mut description = match rule.kind() {
            RuleKind::Match { regex, .. } => format!("match /{}/", regex.source()),
            RuleKind::BeginEnd {
                begin,
                end,
                apply_end_pattern_last,
                ..
            } => {
                let mut description = format!("begin /{}/ end /{}/", begin.source(), end.source());
                if *apply_end_pattern_last {
                    description.push_str(" (end last)");
                }
                description
            }
            RuleKind::Group => String::from("group"),
        };
        if let Some(name) = rule.name() {
            description.push(' ');
            description.push_str(name.source());
        }
        if let Some(content_name) = rule.content_name() {
            description.push_str(" content ");
            description.push_str(content_name.source());
        }
        tree.begin_child(description);
        match rule.kind() {
            RuleKind::Match { captures, .. } => build_captures(tree, grammar, "captures", captures),
            RuleKind::BeginEnd {
                begin_captures,
                end_captures,
                ..
            } => {
                build_captures(tree, grammar, "beginCaptures", begin_captures);
                build_captures(tree, grammar, "endCaptures", end_captures);
            }
            RuleKind::Group => {}
        }
        build_patterns(tree, grammar, rule.patterns());
        tree.end_child();
    }
}

fn build_tree(grammar: &Grammar) -> TreeBuilder {
    let title = match grammar.name() {
        Some(name) => format!("{} ({name})", grammar.scope_name()),
        None => grammar.scope_name().to_string(),
    };
    let mut tree = TreeBuilder::new(title);
    tree.begin_child(String::from("patterns"));
    build_patterns(&mut tree, grammar, grammar[grammar.root()].patterns());
    tree.end_child();
    tree.begin_child(String::from("repository"));
    for (name, patterns) in grammar.repository() {
        tree.begin_child(name.to_string());
        build_patterns(&mut tree, grammar, patterns);
        tree.end_child();
    }
    tree.end_child();
    tree
}

pub fn print_grammar(grammar: &Grammar) -> io::Result<()> {
    let tree = build_tree(grammar).build();
    print_tree(&tree)
}

pub fn write_grammar(grammar: &Grammar, writer: impl io::Write) -> io::Result<()> {
    let tree = build_tree(grammar).build();
    write_tree(&tree, writer)
}
