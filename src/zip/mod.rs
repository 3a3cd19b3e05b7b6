//! ZIP archive parsing and extraction.
//!
//! - [`structures`]: records of the ZIP format (EOCD, ZIP64, file headers)
//! - [`parser`]: reading those records from any [`ReadAt`](crate::io::ReadAt) source
//! - [`extractor`]: unpacking a whole archive into a directory
//!
//! Supported: standard and ZIP64 archives, STORED and DEFLATE entries.
//! Not supported: encryption, multi-disk archives, other compression methods.

mod extractor;
mod parser;
mod structures;

pub use extractor::{ArchiveExtractor, ExtractError, ExtractErrorKind, ExtractStats};
pub use parser::ZipParser;
pub use structures::*;

use thiserror::Error;

/// Low-level failure while decoding archive structures.
#[derive(Debug, Error)]
pub enum ZipError {
    #[error("{0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ZipError {
    pub fn format(reason: impl Into<String>) -> Self {
        ZipError::Format(reason.into())
    }
}
