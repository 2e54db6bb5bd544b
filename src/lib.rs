//! # adahuff
//!
//! One-pass adaptive Huffman compression.  Nothing describing the code table is
//! ever stored in the compressed stream.  The encoder and decoder each keep a
//! frequency model of the symbols seen so far and rebuild the same Huffman tree
//! after every symbol, so they stay in lockstep.
//!
//! * `tools::bit_stream` packs and unpacks bit fields over byte channels
//! * `tools::heap` is the binary heap both the model and the tree builder rely on
//! * `tools::adaptive_huff` is the symbol model
//! * `huff` is the codec itself, including file and slice helpers

pub mod tools;
pub mod huff;

type DYNERR = Box<dyn std::error::Error>;

/// Codec Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("file format mismatch")]
    FileFormatMismatch,
    #[error("file too large")]
    FileTooLarge,
    #[error("compressed stream ended in the middle of a symbol")]
    Truncated,
    #[error("codec session already failed")]
    SessionFailed,
    #[error("codec session already closed")]
    SessionClosed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error)
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Truncated => std::io::Error::new(std::io::ErrorKind::UnexpectedEof,Error::Truncated),
            e => std::io::Error::new(std::io::ErrorKind::Other,e)
        }
    }
}
