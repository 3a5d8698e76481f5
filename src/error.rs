use std::path::PathBuf;

use crate::diagram::DiagramError;
use crate::migration::ParseError;

/// Problems with a schema that can be skipped while emitting migrations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Field {class}.{field} has no type. Skipping.")]
    UnknownFieldType { class: String, field: String },
    #[error("Field {class}.{field} has an unsupported type '{typ}'. Skipping.")]
    UnsupportedTypeForTarget {
        class: String,
        field: String,
        typ: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{file}: {source}")]
    Migration {
        file: String,
        #[source]
        source: ParseError,
    },
    #[error("Diagram error: {0}")]
    Diagram(#[from] DiagramError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} already exists, use --force to overwrite", .0.display())]
    Exists(PathBuf),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
