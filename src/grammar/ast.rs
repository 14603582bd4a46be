//! The grammar definition as written on disk, before anything is compiled.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_textmate_json() {
        let grammar: RawGrammar = serde_json::from_str(
            r##"{
                "name": "Test",
                "scopeName": "source.test",
                "comment": "ignored",
                "patterns": [
                    { "include": "#strings" },
                    { "match": "\\d+", "name": "constant.numeric" }
                ],
                "repository": {
                    "strings": {
                        "begin": "\"",
                        "end": "\"",
                        "name": "string.quoted.double",
                        "applyEndPatternLast": 1,
                        "beginCaptures": { "0": { "name": "punctuation.begin" } }
                    }
                }
            }"##,
        )
        .unwrap();
        assert_eq!(grammar.scope_name, "source.test");
        assert_eq!(grammar.name.as_deref(), Some("Test"));
        assert_eq!(grammar.patterns.len(), 2);
        assert_eq!(grammar.patterns[0].include.as_deref(), Some("#strings"));
        let strings = &grammar.repository["strings"];
        assert!(strings.apply_end_pattern_last);
        assert_eq!(
            strings.begin_captures.as_ref().unwrap()["0"].name.as_deref(),
            Some("punctuation.begin")
        );
    }

    #[test]
    fn reads_yaml() {
        let grammar: RawGrammar = serde_yaml::from_str(
            "scopeName: source.test\npatterns:\n  - match: 'a+'\n    name: letter.a\n    applyEndPatternLast: true\n",
        )
        .unwrap();
        assert_eq!(grammar.patterns[0].match_.as_deref(), Some("a+"));
        assert!(grammar.patterns[0].apply_end_pattern_last);
    }

    #[test]
    fn compiled_round_trip() {
        let grammar: RawGrammar = serde_json::from_str(
            r#"{ "scopeName": "source.t", "patterns": [{ "match": "x", "applyEndPatternLast": 0 }] }"#,
        )
        .unwrap();
        let blob = bincode::serialize(&grammar).unwrap();
        let back: RawGrammar = bincode::deserialize(&blob).unwrap();
        assert_eq!(back, grammar);
    }
}

/// # Summary
///
/// `RawGrammar` is a TextMate grammar definition. Keys follow the usual `tmLanguage` spelling
/// (`scopeName`, `beginCaptures`, ...); keys the engine has no use for are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrammar {
    pub scope_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    #[serde(default)]
    pub repository: BTreeMap<String, RawRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_name: Option<String>,
    #[serde(default, rename = "match")]
    pub match_: Option<String>,
    #[serde(default)]
    pub begin: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, rename = "while")]
    pub while_: Option<String>,
    #[serde(default)]
    pub captures: Option<RawCaptures>,
    #[serde(default)]
    pub begin_captures: Option<RawCaptures>,
    #[serde(default)]
    pub end_captures: Option<RawCaptures>,
    #[serde(default)]
    pub patterns: Option<Vec<RawRule>>,
    #[serde(default)]
    pub repository: Option<BTreeMap<String, RawRule>>,
    #[serde(default, deserialize_with = "flag")]
    pub apply_end_pattern_last: bool,
}

/// Captures are keyed by group index, written as a string.
pub type RawCaptures = BTreeMap<String, RawCapture>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCapture {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub patterns: Option<Vec<RawRule>>,
}

/// `tmLanguage` files write flags either as booleans or as `0`/`1`. Compiled blobs always hold
/// booleans.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct FlagVisitor;

    impl<'de> de::Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a boolean or an integer")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            Ok(value != 0)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            Ok(value != 0)
        }
    }

    if deserializer.is_human_readable() {
        deserializer.deserialize_any(FlagVisitor)
    } else {
        deserializer.deserialize_bool(FlagVisitor)
    }
}
