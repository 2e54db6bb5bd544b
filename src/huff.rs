//! One-pass Adaptive Huffman Compression
//!
//! The compressed data is a bare bit stream, no header, no code table, no length.
//! Each byte is coded with the current code of its leaf in the adaptive model:
//! * a byte seen before is written as its code
//! * a new byte is written as the code of the NEW symbol followed by the 8 raw bits
//! * the END symbol is written when the encoder is closed, if any byte was written
//!
//! In all cases the code is taken from the tree as it was before the byte was counted.
//! The decoder walks the same tree, counts the byte, and so arrives at the same new tree.
//! The last byte is padded with zeros.  Empty input gives empty output.
//!
//! Nothing in the stream can detect corruption, a damaged stream decodes to the wrong
//! bytes, or runs out of bits in the middle of a symbol.

use std::io::{Cursor,Read,Write,Seek,SeekFrom,BufReader,BufWriter,ErrorKind};
use crate::tools::bit_stream::{BitReader,BitWriter};
use crate::tools::adaptive_huff::{Symbol,SymbolModel};
use crate::{DYNERR,Error};

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64,
    /// return error if the input is larger
    pub max_file_size: u64
}

pub const STD_OPTIONS: Options = Options {
    in_offset: 0,
    out_offset: 0,
    max_file_size: u32::MAX as u64
};

#[derive(Clone,Copy,PartialEq,Debug)]
enum State {
    Open,
    /// encoder was closed, or decoder found the end of the stream
    Finished,
    Failed
}

/// map running out of input to `Error::Truncated`
fn truncation(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::UnexpectedEof => Error::Truncated,
        _ => Error::Io(e)
    }
}

/// Compresses bytes into the underlying sink.
/// Must be closed in order to write the END symbol and the last partial byte.
pub struct Encoder<W: Write> {
    model: SymbolModel,
    writer: BitWriter<W>,
    state: State,
    /// error held back by `write` until the bytes before it are reported
    deferred: Option<Error>
}

impl <W: Write> Encoder<W> {
    pub fn new(out: W) -> Self {
        log::debug!("start encoding session");
        Self {
            model: SymbolModel::new(),
            writer: BitWriter::new(out),
            state: State::Open,
            deferred: None
        }
    }
    pub fn model(&self) -> &SymbolModel {
        &self.model
    }
    fn check_open(&self) -> Result<(),Error> {
        match self.state {
            State::Open => Ok(()),
            State::Finished => Err(Error::SessionClosed),
            State::Failed => Err(Error::SessionFailed)
        }
    }
    /// write the current code of leaf `id`
    fn put_code(&mut self,id: usize) -> Result<(),Error> {
        let (code,count) = self.model.code(id);
        log::trace!("code {:0width$b}",code,width=count as usize);
        self.writer.write_bits_unmasked(code,count)?;
        Ok(())
    }
    fn encode_byte(&mut self,b: u8) -> Result<(),Error> {
        match self.model.lookup(Symbol::Byte(b)) {
            Some(id) => {
                self.put_code(id)?;
                self.model.update(id);
            },
            None => {
                self.put_code(self.model.new_character())?;
                self.writer.write_byte(b)?;
                self.model.insert(b);
            }
        }
        Ok(())
    }
    /// Compress one byte.  The bits are not necessarily sent until the encoder is closed.
    pub fn write_symbol(&mut self,b: u8) -> Result<(),Error> {
        self.check_open()?;
        let res = self.encode_byte(b);
        if res.is_err() {
            self.state = State::Failed;
        }
        res
    }
    fn end_stream(&mut self) -> Result<u8,Error> {
        // an empty stream is left empty
        if self.model.leaf_count() > 2 {
            self.put_code(self.model.end_of_stream())?;
        }
        self.model.log_code_table();
        Ok(self.writer.close()?)
    }
    /// Write the END symbol, pad out the last byte, and flush.
    /// Returns the number of padding bits.  Closing again does nothing.
    pub fn close(&mut self) -> Result<u8,Error> {
        match self.state {
            State::Finished => return Ok(0),
            State::Failed => return Err(Error::SessionFailed),
            State::Open => {}
        }
        match self.end_stream() {
            Ok(unset) => {
                log::debug!("close encoding session, {} padding bits",unset);
                self.state = State::Finished;
                Ok(unset)
            },
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }
    /// Close and give back the sink.
    pub fn finish(mut self) -> Result<W,Error> {
        self.close()?;
        Ok(self.writer.into_inner()?)
    }
}

impl <W: Write> Write for Encoder<W> {
    /// If a byte fails after others were accepted, the count of accepted bytes is
    /// returned, and the error comes with the next call.
    fn write(&mut self,buf: &[u8]) -> std::io::Result<usize> {
        if let Some(e) = self.deferred.take() {
            return Err(e.into());
        }
        for (i,b) in buf.iter().enumerate() {
            match self.write_symbol(*b) {
                Ok(()) => {},
                Err(e) if i > 0 => {
                    self.deferred = Some(e);
                    return Ok(i);
                },
                Err(e) => return Err(e.into())
            }
        }
        Ok(buf.len())
    }
    /// Only whole bytes can be flushed, use `close` to finish the stream.
    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Expands bytes from the underlying source until the END symbol.
pub struct Decoder<R: Read> {
    model: SymbolModel,
    reader: BitReader<R>,
    state: State,
    /// error held back by `read` until the bytes before it are delivered
    deferred: Option<Error>
}

impl <R: Read> Decoder<R> {
    pub fn new(inp: R) -> Self {
        log::debug!("start decoding session");
        Self {
            model: SymbolModel::new(),
            reader: BitReader::new(inp),
            state: State::Open,
            deferred: None
        }
    }
    pub fn model(&self) -> &SymbolModel {
        &self.model
    }
    fn decode_byte(&mut self) -> Result<Option<u8>,Error> {
        let mut id = self.model.root();
        let mut depth = 0;
        // travel from root to leaf, 0 is left, 1 is right
        while let Some((left,right)) = self.model.node(id).children() {
            let bit = match self.reader.read_one_bit() {
                Ok(bit) => bit,
                Err(e) if e.kind()==ErrorKind::UnexpectedEof && depth==0 => {
                    log::debug!("source exhausted at a symbol boundary");
                    return Ok(None);
                },
                Err(e) => return Err(truncation(e))
            };
            id = match bit {
                true => right,
                false => left
            };
            depth += 1;
        }
        match self.model.node(id).symbol() {
            Some(Symbol::Byte(b)) => {
                self.model.update(id);
                Ok(Some(b))
            },
            Some(Symbol::NewCharacter) => {
                let b = self.reader.read_byte().map_err(truncation)?;
                match self.model.lookup(Symbol::Byte(b)) {
                    // only a damaged stream escapes a known byte
                    Some(known) => {
                        log::warn!("NEW followed by known byte {:02X}",b);
                        self.model.update(known);
                    },
                    None => {
                        self.model.insert(b);
                    }
                }
                Ok(Some(b))
            },
            Some(Symbol::EndOfStream) => {
                log::debug!("found END symbol");
                Ok(None)
            },
            None => unreachable!("leaf without a symbol")
        }
    }
    /// Expand one byte, `None` means the end of the stream was reached.
    /// Once the end is reached, every further call returns `None`.
    pub fn read_symbol(&mut self) -> Result<Option<u8>,Error> {
        match self.state {
            State::Open => {},
            State::Finished => return Ok(None),
            State::Failed => return Err(Error::SessionFailed)
        }
        match self.decode_byte() {
            Ok(Some(b)) => Ok(Some(b)),
            Ok(None) => {
                self.model.log_code_table();
                self.state = State::Finished;
                Ok(None)
            },
            Err(e) => {
                log::error!("decoding failed: {}",e);
                self.state = State::Failed;
                Err(e)
            }
        }
    }
}

impl <R: Read> Read for Decoder<R> {
    /// If decoding fails after some bytes were produced, those bytes are returned,
    /// and the error comes with the next call.
    fn read(&mut self,buf: &mut [u8]) -> std::io::Result<usize> {
        if let Some(e) = self.deferred.take() {
            return Err(e.into());
        }
        for i in 0..buf.len() {
            match self.read_symbol() {
                Ok(Some(b)) => buf[i] = b,
                Ok(None) => return Ok(i),
                Err(e) if i > 0 => {
                    self.deferred = Some(e);
                    return Ok(i);
                },
                Err(e) => return Err(e.into())
            }
        }
        Ok(buf.len())
    }
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut expanded_length = expanded_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > expanded_length {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    expanded_length -= opt.in_offset;
    if expanded_length > opt.max_file_size {
        return Err(Box::new(Error::FileTooLarge));
    }
    expanded_in.seek(SeekFrom::Start(opt.in_offset))?;
    compressed_out.seek(SeekFrom::Start(opt.out_offset))?;
    let mut reader = BufReader::new(&mut *expanded_in);
    let mut encoder = Encoder::new(&mut *compressed_out);
    let in_size = std::io::copy(&mut reader,&mut encoder)?;
    log::debug!("encoded {} bytes using {} symbols",in_size,encoder.model().leaf_count() - 2);
    encoder.finish()?;
    Ok((expanded_length,compressed_out.stream_position()? - opt.out_offset))
}

/// Main decompression function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut compressed_size = compressed_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > compressed_size {
        return Err(Box::new(Error::FileFormatMismatch));
    }
    compressed_size -= opt.in_offset;
    if compressed_size > opt.max_file_size {
        return Err(Box::new(Error::FileTooLarge));
    }
    compressed_in.seek(SeekFrom::Start(opt.in_offset))?;
    expanded_out.seek(SeekFrom::Start(opt.out_offset))?;
    let mut decoder = Decoder::new(&mut *compressed_in);
    let mut writer = BufWriter::new(&mut *expanded_out);
    let out_size = std::io::copy(&mut decoder,&mut writer)?;
    writer.flush()?;
    drop(writer);
    log::debug!("decoded {} bytes using {} symbols",out_size,decoder.model().leaf_count() - 2);
    Ok((compressed_size,expanded_out.stream_position()? - opt.out_offset))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[cfg(test)]
struct BrokenPipe;

#[cfg(test)]
impl Write for BrokenPipe {
    fn write(&mut self,_buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(ErrorKind::BrokenPipe,"sink is gone"))
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(ErrorKind::BrokenPipe,"sink is gone"))
    }
}

#[cfg(test)]
fn decode_all(dat: &[u8]) -> (Vec<u8>,Option<Error>) {
    let mut decoder = Decoder::new(dat);
    let mut ans = Vec::new();
    loop {
        match decoder.read_symbol() {
            Ok(Some(b)) => ans.push(b),
            Ok(None) => return (ans,None),
            Err(e) => return (ans,Some(e))
        }
    }
}

#[test]
fn empty_stream() {
    let compressed = compress_slice(&[],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,Vec::<u8>::new());
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded,Vec::<u8>::new());
    let mut decoder = Decoder::new(&compressed[..]);
    assert!(matches!(decoder.read_symbol(),Ok(None)));
    assert!(matches!(decoder.read_symbol(),Ok(None)));
}

#[test]
fn single_byte() {
    // NEW is `0` in the 2 leaf tree, END is `0` in the 3 leaf tree
    let mut expected = bit_vec::BitVec::new();
    expected.push(false);
    expected.append(&mut bit_vec::BitVec::from_bytes(&[0x41]));
    expected.push(false);
    let mut encoder = Encoder::new(Vec::new());
    encoder.write_symbol(0x41).expect("compression failed");
    assert_eq!(encoder.close().expect("close failed"),6);
    let compressed = encoder.finish().expect("close failed");
    assert_eq!(compressed,expected.to_bytes());
    assert_eq!(compressed,hex::decode("2080").unwrap());
    assert_eq!(decode_all(&compressed).0,vec![0x41]);
}

#[test]
fn repeated_byte() {
    // literal, then `11`, then `0` once the byte catches up with the control symbols,
    // then END as `01` since the byte has moved to the right
    let compressed = compress_slice("AAA".as_bytes(),&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("20E2").unwrap());
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded,"AAA".as_bytes().to_vec());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data = "12345123456789123456789\n".as_bytes();
    let compressed = compress_slice(test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn invertibility_binary() {
    let mut seed: u32 = 7;
    let mut test_data = Vec::new();
    for i in 0..5000 {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        // skewed distribution so that the tree gets lopsided
        let b = match i % 3 {
            0 => (seed >> 24) as u8,
            _ => ((seed >> 16) % 8) as u8
        };
        test_data.push(b);
    }
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < test_data.len());
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn long_run() {
    let test_data = vec![0u8;10000];
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    // the byte quickly gets a 1 bit code
    assert!(compressed.len() < 1300);
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn every_byte_value() {
    let test_data: Vec<u8> = (0..=255u8).collect();
    let mut encoder = Encoder::new(Vec::new());
    encoder.write_all(&test_data).expect("compression failed");
    // 258 leaves of equal frequency
    for (_sym,bits) in encoder.model().code_table() {
        assert!(bits.len() == 8 || bits.len() == 9);
    }
    let compressed = encoder.finish().expect("close failed");
    let (expanded,err) = decode_all(&compressed);
    assert!(err.is_none());
    assert_eq!(expanded,test_data);

    let test_data: Vec<u8> = (0..=255u8).rev().chain(0..=255u8).collect();
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded,test_data);
}

#[test]
fn stream_adapters() {
    let test_data = "She sells sea shells by the sea shore.".repeat(20);
    let mut encoder = Encoder::new(Vec::new());
    std::io::copy(&mut test_data.as_bytes(),&mut encoder).expect("compression failed");
    let compressed = encoder.finish().expect("close failed");
    let mut decoder = Decoder::new(compressed.as_slice());
    let mut expanded = String::new();
    decoder.read_to_string(&mut expanded).expect("expansion failed");
    assert_eq!(expanded,test_data);
    // models on both sides end up identical
    let mut encoder = Encoder::new(Vec::new());
    encoder.write_all(test_data.as_bytes()).expect("compression failed");
    assert_eq!(encoder.model().code_table(),decoder.model().code_table());
}

#[test]
fn truncated_literal() {
    // "AAA" is 20 E2, cutting the second byte leaves the literal incomplete
    let (expanded,err) = decode_all(&[0x20]);
    assert_eq!(expanded,Vec::<u8>::new());
    assert!(matches!(err,Some(Error::Truncated)));
}

#[test]
fn truncated_walk() {
    // literal A, then A as `11`, then `0`, three more as `1`, then `0` leads into the NEW/END branch
    // 0 01000001 11 0 1 1 1 0
    let mut decoder = Decoder::new(&[0x20u8,0xee][..]);
    for _i in 0..6 {
        assert_eq!(decoder.read_symbol().expect("expansion failed"),Some(b'A'));
    }
    assert!(matches!(decoder.read_symbol(),Err(Error::Truncated)));
    assert!(matches!(decoder.read_symbol(),Err(Error::SessionFailed)));
    let mut decoder = Decoder::new(&[0x20u8,0xee][..]);
    let mut ans = Vec::new();
    match decoder.read_to_end(&mut ans) {
        Err(e) => assert_eq!(e.kind(),ErrorKind::UnexpectedEof),
        Ok(_) => panic!("truncation was not detected")
    }
    // bytes decoded ahead of the error are not lost
    assert_eq!(ans,vec![b'A';6]);
}

#[test]
fn cut_at_symbol_boundary() {
    // seven A's fill exactly two bytes, the third byte holds END
    // 0 01000001 11 0 1 1 1 1 | 01 000000
    let compressed = compress_slice(&[b'A';7],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,vec![0x20,0xef,0x40]);
    // dropping the last byte loses END, the rest decodes without complaint
    let (expanded,err) = decode_all(&compressed[0..2]);
    assert!(err.is_none());
    assert_eq!(expanded,vec![b'A';7]);
    let expanded = expand_slice(&compressed[0..2],&STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded,vec![b'A';7]);
}

#[test]
fn escaped_known_byte() {
    // NEW 'A', then NEW 'A' again, which no encoder would produce
    // 0 01000001 10 01000001 0 00 000
    let mut decoder = Decoder::new(&[0x20u8,0xc8,0x20][..]);
    let mut ans = Vec::new();
    let res = decoder.read_to_end(&mut ans);
    // the repeat is counted, then the walk ends in a literal that runs out
    assert_eq!(ans,vec![b'A';3]);
    match res {
        Err(e) => assert_eq!(e.kind(),ErrorKind::UnexpectedEof),
        Ok(_) => panic!("truncation was not detected")
    }
    assert_eq!(decoder.model().leaf_count(),3);
    let a = decoder.model().lookup(Symbol::Byte(b'A')).expect("missing symbol");
    assert_eq!(decoder.model().node(a).frequency(),3);
}

#[test]
fn session_lifecycle() {
    let mut encoder = Encoder::new(Vec::new());
    encoder.write_symbol(b'x').expect("compression failed");
    let unset = encoder.close().expect("close failed");
    assert_eq!(encoder.close().expect("close failed"),0);
    assert!(unset < 8);
    assert!(matches!(encoder.write_symbol(b'y'),Err(Error::SessionClosed)));
    let compressed = encoder.finish().expect("close failed");
    let (expanded,err) = decode_all(&compressed);
    assert_eq!(expanded,vec![b'x']);
    assert!(err.is_none());
}

#[test]
fn partial_write() {
    // enough incompressible data to overflow the output buffer
    let mut seed: u32 = 99;
    let test_data: Vec<u8> = (0..20000).map(|_i| {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        (seed >> 16) as u8
    }).collect();
    let mut encoder = Encoder::new(BrokenPipe);
    let n = encoder.write(&test_data).expect("bytes ahead of the failure should be accepted");
    assert!(n > 0 && n < test_data.len());
    match encoder.write(&test_data[n..]) {
        Err(e) => assert_eq!(e.kind(),ErrorKind::BrokenPipe),
        Ok(_) => panic!("sink failure was not reported")
    }
    assert!(matches!(encoder.write_symbol(0),Err(Error::SessionFailed)));
}

#[test]
fn failed_sink() {
    let mut encoder = Encoder::new(BrokenPipe);
    encoder.write_all(b"nothing gets through").expect("buffered write failed");
    assert!(matches!(encoder.close(),Err(Error::Io(_))));
    assert!(matches!(encoder.write_symbol(b'!'),Err(Error::SessionFailed)));
    assert!(matches!(encoder.close(),Err(Error::SessionFailed)));
}

#[test]
fn offsets_and_limits() {
    let test_data = "XXXXI am Sam. Sam I am.".as_bytes();
    let mut opt = STD_OPTIONS;
    opt.in_offset = 4;
    opt.out_offset = 2;
    let mut src = Cursor::new(test_data);
    let mut dst = Cursor::new(vec![0xaa,0xbb]);
    let (in_size,out_size) = compress(&mut src,&mut dst,&opt).expect("compression failed");
    assert_eq!(in_size,test_data.len() as u64 - 4);
    let compressed = dst.into_inner();
    assert_eq!(out_size,compressed.len() as u64 - 2);
    assert_eq!(compressed[0..2].to_vec(),vec![0xaa,0xbb]);
    assert_eq!(compressed[2..].to_vec(),compress_slice(&test_data[4..],&STD_OPTIONS).expect("compression failed"));

    opt.out_offset = 0;
    let mut src = Cursor::new(compressed.as_slice());
    let mut dst = Cursor::new(Vec::new());
    opt.in_offset = 2;
    let (_,out_size) = expand(&mut src,&mut dst,&opt).expect("expansion failed");
    assert_eq!(out_size,test_data.len() as u64 - 4);
    assert_eq!(dst.into_inner(),test_data[4..].to_vec());

    opt.in_offset = 100;
    assert!(compress_slice(test_data,&opt).is_err());
    let mut opt = STD_OPTIONS;
    opt.max_file_size = 8;
    assert!(compress_slice(test_data,&opt).is_err());
}
