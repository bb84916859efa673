use std::path::PathBuf;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Errors surfaced by the parser.
///
/// Malformed indentation never fails a parse; segmentation degrades to
/// best-effort instead. The only fatal condition is source that cannot be
/// read at all, in which case no partial tree is returned.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
