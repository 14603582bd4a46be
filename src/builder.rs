use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result as BResult};


/// How a grammar file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Compiled,
}

#[derive(Debug)]
pub enum FileResult<T> {
    Valid(T),
    WrongExtension(OsString),
    NonExisting,
}

/// Pick the format of `path` from its extension. If it has none, try every extension and keep
/// the most recently modified file that exists.
pub fn select_format<'a, T>(
    path: &Path,
    extensions: &'a [(&'static str, T)],
) -> FileResult<(PathBuf, &'a T)> {
    if let Some(extension) = path.extension() {
        for (ext, format) in extensions {
            if *ext == extension {
                return FileResult::Valid((path.to_owned(), format));
            }
        }
        FileResult::WrongExtension(extension.to_owned())
    } else {
        let mut current_path: Option<(PathBuf, _)> = None;
        let mut try_path = path.to_owned();
        for (ext, format) in extensions {
            try_path.set_extension(ext);
            if !try_path.exists() {
                continue;
            }
            let newer = match current_path {
                None => true,
                Some((ref old_path, _)) => matches!(
                    (
                        old_path.metadata().and_then(|md| md.modified()),
                        try_path.metadata().and_then(|md| md.modified()),
                    ),
                    (Ok(time_old), Ok(time_new)) if time_old < time_new,
                ),
            };
            if newer {
                current_path = Some((try_path.clone(), format));
            }
        }
        if let Some(format) = current_path {
            FileResult::Valid(format)
        } else {
            FileResult::NonExisting
        }
    }
}

fn load_error(path: &Path, error: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::load(path.display().to_string(), error))
}

/// Something that is built from a definition stored in a file, either written by hand in
/// JSON or YAML, or compiled to a binary blob.
pub trait Buildable: Sized {
    type Definition: Serialize + DeserializeOwned;

    const COMPILED_EXTENSION: &'static str = "ctm";
    const JSON_EXTENSION: &'static str = "json";
    const YAML_EXTENSIONS: [&'static str; 2] = ["yaml", "yml"];

    fn build_from_definition(definition: Self::Definition) -> BResult<Self>;

    fn formats() -> [(&'static str, Format); 4] {
        [
            (Self::COMPILED_EXTENSION, Format::Compiled),
            (Self::JSON_EXTENSION, Format::Json),
            (Self::YAML_EXTENSIONS[0], Format::Yaml),
            (Self::YAML_EXTENSIONS[1], Format::Yaml),
        ]
    }

    /// Read a definition written in `format`. `path` only names the blob in errors.
    fn decode(blob: &[u8], format: Format, path: &Path) -> BResult<Self::Definition> {
        match format {
            Format::Json => serde_json::from_slice(blob).map_err(|err| load_error(path, err)),
            Format::Yaml => serde_yaml::from_slice(blob).map_err(|err| load_error(path, err)),
            Format::Compiled => bincode::deserialize(blob).map_err(|err| load_error(path, err)),
        }
    }

    /// Read a definition from `blob`, whose format is given by the extension of `path`.
    fn definition_from_blob(blob: &[u8], path: &Path) -> BResult<Self::Definition> {
        let formats = Self::formats();
        match select_format(path, &formats) {
            FileResult::Valid((actual_path, format)) => Self::decode(blob, *format, &actual_path),
            FileResult::NonExisting => ErrorKind::GrammarNotFound {
                path: path.to_owned(),
            }
            .err(),
            FileResult::WrongExtension(extension) => ErrorKind::UnrecognisedExtension {
                extension,
                path: path.to_owned(),
            }
            .err(),
        }
    }

    fn definition_from_path(path: &Path) -> BResult<Self::Definition> {
        let formats = Self::formats();
        match select_format(path, &formats) {
            FileResult::Valid((actual_path, format)) => {
                let blob =
                    fs::read(&actual_path).map_err(|err| Error::with_file(err, &actual_path))?;
                debug!(path = %actual_path.display(), ?format, "reading definition");
                Self::decode(&blob, *format, &actual_path)
            }
            FileResult::NonExisting => ErrorKind::GrammarNotFound {
                path: path.to_owned(),
            }
            .err(),
            FileResult::WrongExtension(extension) => ErrorKind::UnrecognisedExtension {
                extension,
                path: path.to_owned(),
            }
            .err(),
        }
    }

    fn build_from_blob(blob: &[u8], path: &Path) -> BResult<Self> {
        Self::build_from_definition(Self::definition_from_blob(blob, path)?)
    }

    fn build_from_path(path: &Path) -> BResult<Self> {
        Self::build_from_definition(Self::definition_from_path(path)?)
    }

    /// Serialize a definition to the compiled format.
    fn compile_definition(definition: &Self::Definition) -> BResult<Vec<u8>> {
        bincode::serialize(definition)
            .map_err(|err| Error::new(ErrorKind::load("compiled definition", err)))
    }
}

/// Build a grammar from a file embedded in the binary. The path is relative to the file the
/// macro is invoked in, and its extension selects the format.
#[macro_export]
macro_rules! include_grammar {
    ($path:literal $(,)?) => {
        <$crate::grammar::Grammar as $crate::builder::Buildable>::build_from_blob(
            include_bytes!($path),
            ::std::path::Path::new($path),
        )
    };
}
