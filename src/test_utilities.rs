use crate::grammar::Grammar;
use crate::tokenizer::Tokenizer;

/// Build a grammar from its JSON definition.
pub(crate) fn grammar(definition: serde_json::Value) -> Grammar {
    Grammar::build_from_raw(serde_json::from_value(definition).unwrap()).unwrap()
}

/// Tokenize consecutive lines of a document, each token as its text and its scopes.
pub(crate) fn tokenize_lines(grammar: &Grammar, lines: &[&str]) -> Vec<Vec<(String, Vec<String>)>> {
    let tokenizer = Tokenizer::new(grammar);
    let mut state = tokenizer.initial_state();
    let mut result = Vec::new();
    for line in lines {
        let (next, tokens) = tokenizer.tokenize_line(state, line).unwrap();
        state = next;
        result.push(
            tokens
                .iter()
                .map(|token| {
                    (
                        token.value(line).to_string(),
                        token.scopes().iter().map(|scope| scope.to_string()).collect(),
                    )
                })
                .collect(),
        );
    }
    result
}

/// Tokenize a single line, as the first of its document.
pub(crate) fn line_tokens(grammar: &Grammar, line: &str) -> Vec<(String, Vec<String>)> {
    tokenize_lines(grammar, &[line]).remove(0)
}

#[macro_export]
macro_rules! tokens {
    ($($text: expr => [$($scope: expr),* $(,)?]),* $(,)?) => {
	vec![$(
	    (
		::std::string::String::from($text),
		vec![$(::std::string::String::from($scope)),*],
	    )
	),*]
    };
}
