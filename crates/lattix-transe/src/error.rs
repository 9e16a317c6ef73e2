use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which vocabulary a symbol was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Entity,
    Relation,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => f.write_str("entity"),
            Self::Relation => f.write_str("relation"),
        }
    }
}

/// Errors that can occur in lattix-transe.
#[derive(Error, Debug)]
pub enum Error {
    /// A triples file could not be opened or read.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A line does not hold a (head, relation, tail) triple.
    #[error("{}:{line}: expected 3 fields (head, relation, tail), got {content:?}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },
    /// A closed vocabulary does not contain the symbol.
    #[error("{}:{line}: unknown {kind} {symbol:?}", path.display())]
    UnknownSymbol {
        path: PathBuf,
        line: usize,
        kind: SymbolKind,
        symbol: String,
    },
    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Supplied parameters do not fit the model.
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Training produced a NaN or infinite minibatch cost.
    #[error("bad cost detected at epoch {epoch}, minibatch {batch}: cost is {cost}")]
    NonFiniteLoss { epoch: usize, batch: usize, cost: f32 },
}

/// Result type alias for lattix-transe.
pub type Result<T> = std::result::Result<T, Error>;
