//! Bit level reading and writing over byte channels.
//!
//! Bits are packed MSB first: the first bit written lands in bit 7 of the
//! first byte.  Both ends keep a single partial byte plus a count of pending
//! bits, so fields of any width from 1 to 64 can straddle byte boundaries.
//! The underlying channels are wrapped in `BufReader` and `BufWriter`.

use std::io::{Read,Write,BufReader,BufWriter,ErrorKind};

/// mask with the lowest `n` bits set, `n` can be 0 through 64
fn low_mask(n: u8) -> u64 {
    match n {
        64 => u64::MAX,
        _ => (1 << n) - 1
    }
}

pub struct BitWriter<W: Write> {
    out: BufWriter<W>,
    /// bits waiting to be written, packed from the left
    buf: u8,
    /// number of valid bits in `buf`, always less than 8
    count: u8
}

pub struct BitReader<R: Read> {
    inp: BufReader<R>,
    /// bits not yet consumed, packed on the right
    buf: u8,
    /// number of valid bits in `buf`, always less than 8
    count: u8
}

impl <W: Write> BitWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::new(out),
            buf: 0,
            count: 0
        }
    }
    /// number of bits waiting for the current byte to fill up
    pub fn pending(&self) -> u8 {
        self.count
    }
    /// Write one whole byte, fast path if we are aligned.
    pub fn write_byte(&mut self,b: u8) -> std::io::Result<()> {
        if self.count == 0 {
            return self.out.write_all(&[b]);
        }
        self.write_unaligned_byte(b)
    }
    /// the byte is split, the leading bits complete the pending byte,
    /// the trailing bits become the new pending byte
    fn write_unaligned_byte(&mut self,b: u8) -> std::io::Result<()> {
        let count = self.count;
        self.out.write_all(&[self.buf | b >> count])?;
        self.buf = (b & ((1 << count) - 1)) << (8 - count);
        Ok(())
    }
    /// Write the `n` lowest bits of `val`, most significant first.
    /// Bits above position `n-1` are ignored.  Panics unless 1 <= n <= 64.
    pub fn write_bits(&mut self,val: u64,n: u8) -> std::io::Result<()> {
        assert!(n >= 1 && n <= 64,"bit field width out of range");
        self.write_bits_unmasked(val & low_mask(n),n)
    }
    /// Same as `write_bits`, but `val` must not have any bits set at or above position `n`.
    /// Stray high bits would be OR'd into bits that were already written.
    pub fn write_bits_unmasked(&mut self,val: u64,mut n: u8) -> std::io::Result<()> {
        debug_assert!(n >= 1 && n <= 64);
        debug_assert!(val & !low_mask(n) == 0,"unmasked value wider than field");
        let total = self.count + n;
        if total < 8 {
            self.buf |= (val as u8) << (8 - total);
            self.count = total;
            return Ok(());
        }
        // complete the pending byte with the leading bits
        let free = 8 - self.count;
        n -= free;
        self.out.write_all(&[self.buf | (val >> n) as u8])?;
        while n >= 8 {
            n -= 8;
            self.out.write_all(&[(val >> n) as u8])?;
        }
        if n > 0 {
            self.buf = ((val as u8) & ((1 << n) - 1)) << (8 - n);
            self.count = n;
        } else {
            self.buf = 0;
            self.count = 0;
        }
        Ok(())
    }
    pub fn write_bit(&mut self,bit: bool) -> std::io::Result<()> {
        if self.count == 7 {
            let b = match bit {
                true => self.buf | 1,
                false => self.buf
            };
            self.out.write_all(&[b])?;
            self.buf = 0;
            self.count = 0;
            return Ok(());
        }
        self.count += 1;
        if bit {
            self.buf |= 1 << (8 - self.count);
        }
        Ok(())
    }
    /// Move to the next byte boundary, writing out any pending bits.
    /// Returns the number of zero bits that were added as padding.
    pub fn align(&mut self) -> std::io::Result<u8> {
        if self.count == 0 {
            return Ok(0);
        }
        self.out.write_all(&[self.buf])?;
        let unset = 8 - self.count;
        self.buf = 0;
        self.count = 0;
        Ok(unset)
    }
    /// Align and flush everything to the underlying sink, returns the number of padding bits.
    pub fn close(&mut self) -> std::io::Result<u8> {
        let unset = self.align()?;
        self.out.flush()?;
        Ok(unset)
    }
    /// Close and give back the underlying sink.
    pub fn into_inner(mut self) -> std::io::Result<W> {
        self.close()?;
        self.out.into_inner().map_err(|e| e.into_error())
    }
}

impl <W: Write> Write for BitWriter<W> {
    /// When aligned, bytes go straight through, otherwise each one is split.
    fn write(&mut self,buf: &[u8]) -> std::io::Result<usize> {
        if self.count == 0 {
            return self.out.write(buf);
        }
        for b in buf {
            self.write_unaligned_byte(*b)?;
        }
        Ok(buf.len())
    }
    /// Flushes whole bytes only, pending bits stay put until `align` or `close`.
    fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

impl <R: Read> BitReader<R> {
    pub fn new(inp: R) -> Self {
        Self {
            inp: BufReader::new(inp),
            buf: 0,
            count: 0
        }
    }
    /// number of bits left over from the last byte that was read
    pub fn pending(&self) -> u8 {
        self.count
    }
    /// next byte from the channel, running out gives `ErrorKind::UnexpectedEof`
    fn next_byte(&mut self) -> std::io::Result<u8> {
        let mut by: [u8;1] = [0];
        self.inp.read_exact(&mut by)?;
        Ok(by[0])
    }
    /// Read one whole byte, fast path if we are aligned.
    pub fn read_byte(&mut self) -> std::io::Result<u8> {
        if self.count == 0 {
            return self.next_byte();
        }
        self.read_unaligned_byte()
    }
    /// pending bits become the leading bits, the next byte supplies the rest
    fn read_unaligned_byte(&mut self) -> std::io::Result<u8> {
        let count = self.count;
        let next = self.next_byte()?;
        let b = (self.buf << (8 - count)) | (next >> count);
        self.buf = next & ((1 << count) - 1);
        Ok(b)
    }
    /// Read `n` bits and return them as the lowest bits of the result,
    /// first bit read is the most significant.  Panics unless 1 <= n <= 64.
    pub fn read_bits(&mut self,n: u8) -> std::io::Result<u64> {
        assert!(n >= 1 && n <= 64,"bit field width out of range");
        if n < self.count {
            let shift = self.count - n;
            let ans = (self.buf >> shift) as u64;
            self.buf &= (1 << shift) - 1;
            self.count = shift;
            return Ok(ans);
        }
        let mut n = n - self.count;
        let mut ans = self.buf as u64;
        self.buf = 0;
        self.count = 0;
        while n >= 8 {
            ans = (ans << 8) | self.next_byte()? as u64;
            n -= 8;
        }
        if n > 0 {
            let next = self.next_byte()?;
            let shift = 8 - n;
            ans = (ans << n) | (next >> shift) as u64;
            self.buf = next & ((1 << shift) - 1);
            self.count = shift;
        }
        Ok(ans)
    }
    pub fn read_one_bit(&mut self) -> std::io::Result<bool> {
        if self.count == 0 {
            let next = self.next_byte()?;
            self.buf = next & 0x7f;
            self.count = 7;
            return Ok(next & 0x80 > 0);
        }
        self.count -= 1;
        let bit = self.buf & (1 << self.count) > 0;
        self.buf &= (1 << self.count) - 1;
        Ok(bit)
    }
    /// Skip to the next byte boundary, returns the number of bits thrown away.
    pub fn align(&mut self) -> u8 {
        let unread = self.count;
        self.buf = 0;
        self.count = 0;
        unread
    }
}

impl <R: Read> Read for BitReader<R> {
    /// When aligned, bytes come straight through, otherwise each one is assembled
    /// from two neighboring bytes.  Stops short at the end of the channel.
    fn read(&mut self,buf: &mut [u8]) -> std::io::Result<usize> {
        if self.count == 0 {
            return self.inp.read(buf);
        }
        for i in 0..buf.len() {
            match self.read_unaligned_byte() {
                Ok(b) => buf[i] = b,
                Err(e) if e.kind()==ErrorKind::UnexpectedEof => return Ok(i),
                Err(e) => return Err(e)
            }
        }
        Ok(buf.len())
    }
}

// *************** TESTS *****************

#[test]
fn write_fields_across_bytes() {
    let mut writer = BitWriter::new(Vec::new());
    writer.write_bits(0b101,3).expect("write err");
    writer.write_bits(0x1234,16).expect("write err");
    writer.write_bit(true).expect("write err");
    assert_eq!(writer.pending(),4);
    let out = writer.into_inner().expect("close err");
    // 101 0001 0010 0011 0100 1 + 0000 padding
    assert_eq!(out,hex::decode("A24690").unwrap());
}

#[test]
fn write_bits_ignores_high_bits() {
    let mut writer = BitWriter::new(Vec::new());
    writer.write_bits(0xff,1).expect("write err");
    writer.write_bits(0x1234,8).expect("write err");
    writer.write_bits(u64::MAX,7).expect("write err");
    let out = writer.into_inner().expect("close err");
    assert_eq!(out,vec![0x9a,0x7f]);
}

#[test]
fn full_width_fields() {
    let vals = [0u64,1,0xdead_beef_0bad_f00d,u64::MAX,0x8000_0000_0000_0000];
    let mut writer = BitWriter::new(Vec::new());
    writer.write_bit(true).expect("write err");
    for v in vals {
        writer.write_bits(v,64).expect("write err");
    }
    let out = writer.into_inner().expect("close err");
    assert_eq!(out.len(),41);
    let mut reader = BitReader::new(out.as_slice());
    assert!(reader.read_one_bit().expect("read err"));
    for v in vals {
        assert_eq!(reader.read_bits(64).expect("read err"),v);
    }
    assert_eq!(reader.align(),7);
}

#[test]
fn mixed_width_round_trip() {
    // every width, with a value that uses all of its bits and one that uses only the lowest
    let mut expected: Vec<(u64,u8)> = Vec::new();
    for n in 1..=64u8 {
        expected.push((low_mask(n),n));
        expected.push((1,n));
        expected.push((0x5555_5555_5555_5555 & low_mask(n),n));
    }
    let mut writer = BitWriter::new(Vec::new());
    let mut total_bits: usize = 0;
    for (v,n) in &expected {
        writer.write_bits(*v,*n).expect("write err");
        total_bits += *n as usize;
    }
    let out = writer.into_inner().expect("close err");
    assert_eq!(out.len(),(total_bits + 7) / 8);
    let mut reader = BitReader::new(out.as_slice());
    for (v,n) in &expected {
        assert_eq!(reader.read_bits(*n).expect("read err"),*v);
    }
}

#[test]
fn align_reports_padding() {
    for k in 0..8u8 {
        let mut writer = BitWriter::new(Vec::new());
        writer.write_bits(0xff,8).expect("write err");
        for _i in 0..k {
            writer.write_bit(true).expect("write err");
        }
        let expected = match k {
            0 => 0,
            _ => 8 - k
        };
        assert_eq!(writer.align().expect("align err"),expected);
        assert_eq!(writer.pending(),0);
    }
}

#[test]
fn reader_align_discards() {
    let dat = [0b1011_0000,0xc3];
    let mut reader = BitReader::new(&dat[..]);
    assert_eq!(reader.read_bits(3).expect("read err"),0b101);
    assert_eq!(reader.align(),5);
    assert_eq!(reader.read_byte().expect("read err"),0xc3);
    assert_eq!(reader.align(),0);
}

#[test]
fn unaligned_bytes() {
    let mut writer = BitWriter::new(Vec::new());
    writer.write_bits(0b11,2).expect("write err");
    writer.write_byte(0x41).expect("write err");
    writer.write_all(b"hi").expect("write err");
    let out = writer.into_inner().expect("close err");
    // 11 01000001 01101000 01101001 000000
    assert_eq!(out,vec![0xd0,0x5a,0x1a,0x40]);
    let mut reader = BitReader::new(out.as_slice());
    assert_eq!(reader.read_bits(2).expect("read err"),0b11);
    assert_eq!(reader.read_byte().expect("read err"),0x41);
    let mut s: [u8;2] = [0;2];
    reader.read_exact(&mut s).expect("read err");
    assert_eq!(&s,b"hi");
    assert_eq!(reader.pending(),6);
}

#[test]
fn aligned_pass_through() {
    let mut writer = BitWriter::new(Vec::new());
    writer.write_all(b"abc").expect("write err");
    writer.write_bit(true).expect("write err");
    assert_eq!(writer.close().expect("close err"),7);
    let out = writer.into_inner().expect("close err");
    assert_eq!(out,vec![b'a',b'b',b'c',0x80]);
    let mut reader = BitReader::new(out.as_slice());
    let mut ans = Vec::new();
    reader.read_to_end(&mut ans).expect("read err");
    assert_eq!(ans,out);
}

#[test]
fn exhausted_channel() {
    let dat = [0xffu8];
    let mut reader = BitReader::new(&dat[..]);
    assert_eq!(reader.read_bits(5).expect("read err"),0x1f);
    match reader.read_bits(4) {
        Err(e) => assert_eq!(e.kind(),ErrorKind::UnexpectedEof),
        Ok(_) => panic!("read past the end")
    }
    let mut reader = BitReader::new(&dat[..]);
    for _i in 0..8 {
        assert!(reader.read_one_bit().expect("read err"));
    }
    match reader.read_one_bit() {
        Err(e) => assert_eq!(e.kind(),ErrorKind::UnexpectedEof),
        Ok(_) => panic!("read past the end")
    }
}
