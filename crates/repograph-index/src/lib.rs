//! Structural extraction from a repository checkout.
//!
//! [`namespaces`] infers the code modules of a (mono)repo, [`extractor`] walks the tree and
//! produces one [`FileIr`] per source file plus the [`SymbolIr`] declarations found by the
//! per-language pattern tables in [`patterns`]. Extraction is best-effort: it is line-pattern
//! based, not a grammar-driven parser.

pub mod error;
pub mod extractor;
pub mod ids;
pub mod languages;
pub mod namespaces;
pub(crate) mod patterns;
pub mod paths;

pub use error::{IndexError, Result};
pub use extractor::{
    FileIr, ParseOutput, SkipReason, SkippedFile, SymbolIr, SymbolKind, parse_repository,
};
pub use languages::{BlockStyle, Lang, detect_language};
pub use namespaces::{CodeNamespace, detect_namespaces, resolve_file_namespace};
