//! Building blocks for the codec

pub mod bit_stream;
pub mod heap;
pub mod adaptive_huff;
