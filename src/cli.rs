use clap::{Parser as CliParser, Subcommand};
use std::path::PathBuf;

#[derive(CliParser)]
#[command(author, version, about, long_about=None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand)]
pub enum Action {
    /// Tokenize a file, line by line
    Tokenize {
        /// Print the tokens as JSON, one line of tokens per line of input
        #[arg(short, long)]
        json: bool,
        /// Keep neighbouring tokens with the same scopes apart
        #[arg(long)]
        no_merge: bool,
        /// Do not scan lines longer than this many bytes
        #[arg(long, value_name = "BYTES")]
        max_line_length: Option<usize>,
        /// Specify the grammar
        #[arg(id = "grammar")]
        grammar: PathBuf,
        /// The file to tokenize (standard input if omitted)
        source: Option<PathBuf>,
    },
    /// Compile a grammar to a binary blob that loads faster
    Compile {
        /// The path of the resulting compiled blob
        #[arg(short = 'o', long = "output")]
        output_path: Option<PathBuf>,
        /// The path to the grammar
        #[arg(id = "grammar")]
        grammar: PathBuf,
    },
    /// Load a grammar and resolve all of its references
    Check {
        #[arg(id = "grammar")]
        grammar: PathBuf,
    },
    /// Print the rules of a grammar as a tree
    Show {
        #[arg(id = "grammar")]
        grammar: PathBuf,
    },
}
