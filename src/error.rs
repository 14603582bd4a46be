use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_wraps_the_kind() {
        let result: Result<()> = ErrorKind::UnresolvedRuleReference {
            reference: String::from("#missing"),
        }
        .err();
        let error = result.unwrap_err();
        assert!(matches!(
            error.kind(),
            ErrorKind::UnresolvedRuleReference { reference } if reference == "#missing"
        ));
        assert_eq!(error.to_string(), "unresolved rule reference `#missing`");
    }

    #[test]
    fn io_errors_remember_the_file() {
        let error = Error::with_file(
            io::Error::new(io::ErrorKind::NotFound, "gone"),
            "grammars/nope.json",
        );
        assert_eq!(error.to_string(), "could not read grammars/nope.json: gone");
    }

    #[test]
    fn warnings_display() {
        let warning = Warning::new(
            "repository.strings.captures.4",
            WarningType::CaptureOutOfRange {
                group: 4,
                groups: 2,
            },
        );
        assert_eq!(
            warning.to_string(),
            "repository.strings.captures.4: capture group 4 does not exist, the expression only has 2"
        );
    }
}

/// # Summary
///
/// `ErrorKind` lists everything that can go wrong while loading a grammar or
/// tokenizing with it.
///
/// # Kinds
///
/// `GrammarLoad`: the grammar is structurally invalid, or one of its expressions is malformed.
/// `UnresolvedRuleReference`: an `include` names a rule the grammar does not have.
/// `GrammarNotFound`: no grammar file matches the requested path.
/// `UnrecognisedExtension`: the grammar file extension does not select any loader.
/// `Io`: a file could not be read or written.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid grammar at {location}: {message}")]
    GrammarLoad { location: String, message: String },
    #[error("unresolved rule reference `{reference}`")]
    UnresolvedRuleReference { reference: String },
    #[error("grammar file {} not found", path.display())]
    GrammarNotFound { path: PathBuf },
    #[error("unrecognised grammar extension {extension:?} for {}", path.display())]
    UnrecognisedExtension { extension: OsString, path: PathBuf },
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ErrorKind {
    pub fn err<T>(self) -> Result<T> {
        Err(Error::new(self))
    }

    pub(crate) fn load(location: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::GrammarLoad {
            location: location.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self(Box::new(kind))
    }

    pub fn with_file(error: io::Error, path: impl AsRef<Path>) -> Self {
        Self::new(ErrorKind::Io {
            path: path.as_ref().to_owned(),
            source: error,
        })
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A problem found while loading a grammar that does not prevent using it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    location: String,
    warning_type: WarningType,
}

impl Warning {
    pub fn new(location: impl Into<String>, warning_type: WarningType) -> Self {
        Self {
            location: location.into(),
            warning_type,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn warning_type(&self) -> &WarningType {
        &self.warning_type
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.warning_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningType {
    /// The rule has no `match`, `begin`, `include` nor `patterns`.
    EmptyRule,
    /// `begin`/`while` rules are skipped.
    UnsupportedWhile,
    CaptureOutOfRange { group: usize, groups: usize },
}

impl fmt::Display for WarningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningType::EmptyRule => write!(f, "rule matches nothing and is ignored"),
            WarningType::UnsupportedWhile => {
                write!(f, "begin/while rules are not supported, rule ignored")
            }
            WarningType::CaptureOutOfRange { group, groups } => write!(
                f,
                "capture group {group} does not exist, the expression only has {groups}"
            ),
        }
    }
}
