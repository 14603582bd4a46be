use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tmlex::builder::Buildable;
use tmlex::cli::{Action, Cli};
use tmlex::grammar::Grammar;
use tmlex::printer::print_grammar;
use tmlex::tokenizer::{Tokenizer, TokenizerOptions};
use tracing::warn;

/// Log to stderr, only when `RUST_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn load(path: &Path) -> Result<Grammar> {
    let grammar = Grammar::build_from_path(path)
        .with_context(|| format!("failed to load the grammar {}", path.display()))?;
    for warning in grammar.warnings() {
        warn!(%warning, "grammar warning");
    }
    Ok(grammar)
}

fn read_source(source: Option<&Path>) -> Result<String> {
    match source {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read the standard input")?;
            Ok(text)
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.action {
        Action::Tokenize {
            json,
            no_merge,
            max_line_length,
            grammar,
            source,
        } => {
            let grammar = load(&grammar)?;
            let text = read_source(source.as_deref())?;
            let tokenizer = Tokenizer::new(&grammar).with_options(TokenizerOptions {
                merge_adjacent: !no_merge,
                max_line_length,
            });
            let lines = tokenizer.tokenize_document(&text)?;
            let mut output = BufWriter::new(io::stdout().lock());
            for (line, tokens) in lines {
                if json {
                    serde_json::to_writer(&mut output, &tokens)?;
                    writeln!(output)?;
                    continue;
                }
                for token in tokens {
                    let scopes: Vec<&str> = token.scopes().iter().map(|scope| &**scope).collect();
                    writeln!(
                        output,
                        "{}..{} {:?} {}",
                        token.start(),
                        token.end(),
                        token.value(line),
                        scopes.join(" ")
                    )?;
                }
            }
            output.flush()?;
        }
        Action::Compile {
            output_path,
            grammar,
        } => {
            let definition = Grammar::definition_from_path(&grammar)
                .with_context(|| format!("failed to read the grammar {}", grammar.display()))?;
            let blob = Grammar::compile_definition(&definition)?;
            // Only grammars that load are written.
            Grammar::build_from_definition(definition)?;
            let output_path = output_path
                .unwrap_or_else(|| grammar.with_extension(Grammar::COMPILED_EXTENSION));
            fs::write(&output_path, blob)
                .with_context(|| format!("failed to write {}", output_path.display()))?;
        }
        Action::Check { grammar } => {
            let loaded = load(&grammar)?;
            for warning in loaded.warnings() {
                println!("warning: {warning}");
            }
            loaded.check_references()?;
            println!(
                "{}: {} rules, {} warnings",
                loaded.scope_name(),
                loaded.rules().len(),
                loaded.warnings().len()
            );
        }
        Action::Show { grammar } => {
            let loaded = load(&grammar)?;
            print_grammar(&loaded)?;
        }
    }
    Ok(())
}
