//! # Bit level treatment of 5.25 inch floppy tracks
//!
//! The drive hardware saw a track as a circular stream of bits, with the
//! controller forming "nibbles" by shifting bits in until the high bit was
//! set.  Everything here works on that stream: finding sector markers,
//! encoding and decoding the 6&2 scheme, and synthesizing blank tracks.

use log::info;
use crate::img::NibbleError;

const CHUNK62: usize = 0x56;
/// Try this many address fields before declaring a track bad
const MAX_SECTOR_REPS: usize = 32;
/// Bytes in a standard track bit buffer (WOZ stores 13 blocks per track)
pub const TRACK_BYTE_CAPACITY: usize = 13*512;

const DISK_BYTES_62: [u8;64] = [
    0x96, 0x97, 0x9a, 0x9b, 0x9d, 0x9e, 0x9f, 0xa6,
    0xa7, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb2, 0xb3,
    0xb4, 0xb5, 0xb6, 0xb7, 0xb9, 0xba, 0xbb, 0xbc,
    0xbd, 0xbe, 0xbf, 0xcb, 0xcd, 0xce, 0xcf, 0xd3,
    0xd6, 0xd7, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde,
    0xdf, 0xe5, 0xe6, 0xe7, 0xe9, 0xea, 0xeb, 0xec,
    0xed, 0xee, 0xef, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6,
    0xf7, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff
];

/// map from disk byte back to 6-bit value, 0xff marks an illegal byte
fn invert_62() -> [u8;256] {
    let mut ans = [0xffu8;256];
    for (i,b) in DISK_BYTES_62.iter().enumerate() {
        ans[*b as usize] = i as u8;
    }
    ans
}

/// 4&4 encoding, odd bits in the first byte, even bits in the second
pub fn encode_44(val: u8) -> [u8;2] {
    [(val >> 1) | 0xaa, val | 0xaa]
}

pub fn decode_44(nibs: [u8;2]) -> u8 {
    ((nibs[0] << 1) | 0x01) & nibs[1]
}

/// swap the low 2 bits, used throughout the 6&2 scheme
fn swap2(v: u8) -> u8 {
    ((v & 1) << 1) | ((v & 2) >> 1)
}

/// A circular track at bit resolution.  Construction fixes both the backing
/// buffer and the number of live bits; trailing pad bits are never visited.
pub struct TrackBits {
    pos: usize,
    bit_count: usize,
    buf: Vec<u8>
}

impl TrackBits {
    pub fn new(buf: Vec<u8>,bit_count: usize) -> Self {
        Self {
            pos: 0,
            bit_count,
            buf
        }
    }
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn bit_count(&self) -> usize {
        self.bit_count
    }
    pub fn reset(&mut self) {
        self.pos = 0;
    }
    pub fn shift_fwd(&mut self,bits: usize) {
        self.pos = (self.pos + bits) % self.bit_count;
    }
    pub fn shift_rev(&mut self,bits: usize) {
        self.pos = (self.pos + self.bit_count - bits % self.bit_count) % self.bit_count;
    }
    /// Read the bit under the pointer and advance, returning it in the LSB.
    pub fn next(&mut self) -> u8 {
        let bit = (self.buf[self.pos/8] >> (7 - self.pos%8)) & 1;
        self.shift_fwd(1);
        bit
    }
    /// Copy `num_bits` from the track into `data`, MSB first, wrapping as
    /// needed.  Pad bits of the final byte are left alone.
    pub fn read(&mut self,data: &mut [u8],num_bits: usize) {
        for i in 0..num_bits {
            let mask = 0x80 >> (i%8);
            match self.next() {
                0 => data[i/8] &= !mask,
                _ => data[i/8] |= mask
            }
        }
    }
    /// Copy `num_bits` from `data` onto the track, MSB first, wrapping as
    /// needed.  Pad bits of the final byte are ignored.
    pub fn write(&mut self,data: &[u8],num_bits: usize) {
        for i in 0..num_bits {
            let src = (data[i/8] >> (7 - i%8)) & 1;
            let mask = 0x80 >> (self.pos%8);
            match src {
                0 => self.buf[self.pos/8] &= !mask,
                _ => self.buf[self.pos/8] |= mask
            }
            self.shift_fwd(1);
        }
    }
    /// Emulate the controller's soft latch: shift bits in until the high bit
    /// is set, then return the byte.  This is how aligned nibbles form.
    pub fn read_latch(&mut self) -> u8 {
        let mut latch: u8 = 0;
        for _try in 0..self.bit_count {
            latch = (latch << 1) | self.next();
            if latch & 0x80 > 0 {
                break;
            }
        }
        latch
    }
    /// One revolution of aligned nibbles, for display purposes
    pub fn to_nibbles(&mut self) -> Vec<u8> {
        let mut ans: Vec<u8> = Vec::new();
        self.reset();
        let mut consumed = 0;
        while consumed < self.bit_count {
            let mark = self.pos;
            ans.push(self.read_latch());
            // a latch that never fills consumes a full revolution
            consumed += (self.pos + self.bit_count - mark - 1) % self.bit_count + 1;
        }
        ans
    }
    /// the backing buffer with the bits packed in
    pub fn to_buffer(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

#[derive(PartialEq)]
pub enum NibbleType {
    Enc44,
    Enc53,
    Enc62
}

pub struct SectorAddressFormat {
    pub prolog: [u8;3],
    pub epilog: [u8;3],
    chk_seed: u8,
    verify_chk: bool,
    verify_track: bool,
    verify_epilog_count: usize
}

impl SectorAddressFormat {
    /// standard 16 sector address field markers
    pub fn create_std() -> Self {
        Self {
            prolog: [0xd5,0xaa,0x96],
            epilog: [0xde,0xaa,0xeb],
            chk_seed: 0x00,
            verify_chk: true,
            verify_track: true,
            verify_epilog_count: 2
        }
    }
    /// 13 sector address field markers
    pub fn create_13() -> Self {
        Self {
            prolog: [0xd5,0xaa,0xb5],
            ..Self::create_std()
        }
    }
}

pub struct SectorDataFormat {
    pub prolog: [u8;3],
    pub epilog: [u8;3],
    chk_seed: u8,
    verify_chk: bool,
    nib: NibbleType
}

impl SectorDataFormat {
    pub fn create_std() -> Self {
        Self {
            prolog: [0xd5,0xaa,0xad],
            epilog: [0xde,0xaa,0xeb],
            chk_seed: 0x00,
            verify_chk: true,
            nib: NibbleType::Enc62
        }
    }
    /// 13 sector data fields use 5&3 nibbles, which we can locate but not decode
    pub fn create_13() -> Self {
        Self {
            nib: NibbleType::Enc53,
            ..Self::create_std()
        }
    }
}

/// Run a shift register over the track until `patt_len` bits (high bits of
/// `patt`, up to 32) come through in order.  Returns bits consumed, or None
/// after one full revolution without a match.
fn seek_pattern(trk: &mut TrackBits,patt: u32,patt_len: usize) -> Option<usize> {
    if patt_len == 0 {
        return Some(0);
    }
    let mask = match patt_len {
        32 => u32::MAX,
        n => (1 << n) - 1
    };
    let target = match patt_len {
        32 => patt,
        n => patt >> (32 - n)
    };
    let mut reg: u32 = 0;
    for consumed in 1..=trk.bit_count() {
        reg = ((reg << 1) | trk.next() as u32) & mask;
        if consumed >= patt_len && reg == target {
            return Some(consumed);
        }
    }
    None
}

/// the (vol,track,sector,chksum) tuple of a 4&4 address field
fn decode_addr(trk: &mut TrackBits) -> (u8,u8,u8,u8) {
    let mut buf: [u8;8] = [0;8];
    trk.read(&mut buf,64);
    (
        decode_44([buf[0],buf[1]]),
        decode_44([buf[2],buf[3]]),
        decode_44([buf[4],buf[5]]),
        decode_44([buf[6],buf[7]])
    )
}

fn marker_pattern(marker: &[u8;3],count: usize) -> (u32,usize) {
    (u32::from_be_bytes([marker[0],marker[1],marker[2],0]),count*8)
}

/// Leave the bit pointer just past the data field prolog of the physical
/// sector named by `ts`, returning the volume from the address field.
pub fn find_sector_data(
trk: &mut TrackBits,
ts: [u8;2],
adr_fmt: &SectorAddressFormat,
dat_fmt: &SectorDataFormat) -> Result<u8,NibbleError> {
    let (adr_patt,adr_len) = marker_pattern(&adr_fmt.prolog,3);
    let (epi_patt,epi_len) = marker_pattern(&adr_fmt.epilog,adr_fmt.verify_epilog_count);
    let (dat_patt,dat_len) = marker_pattern(&dat_fmt.prolog,3);
    for _try in 0..MAX_SECTOR_REPS {
        if seek_pattern(trk,adr_patt,adr_len).is_none() {
            // went all the way around without an address field
            return Err(NibbleError::BitPatternNotFound);
        }
        let (vol,track,sector,chksum) = decode_addr(trk);
        if adr_fmt.verify_track && track != ts[0] {
            info!("track mismatch (want {}, got {})",ts[0],track);
            continue;
        }
        if adr_fmt.verify_chk && adr_fmt.chk_seed ^ vol ^ track ^ sector ^ chksum != 0 {
            info!("address field checksum error");
            continue;
        }
        if seek_pattern(trk,epi_patt,epi_len).is_none() {
            continue;
        }
        if sector != ts[1] {
            continue;
        }
        return match seek_pattern(trk,dat_patt,dat_len) {
            Some(_) => Ok(vol),
            None => Err(NibbleError::BitPatternNotFound)
        };
    }
    // as many attempts as there could be sectors, give up
    Err(NibbleError::BadTrack)
}

/// 6&2 encode 256 bytes and write them at the bit pointer, checksum included
pub fn encode_sector(trk: &mut TrackBits,dat: &[u8],dat_fmt: &SectorDataFormat) -> Result<(),NibbleError> {
    if dat_fmt.nib != NibbleType::Enc62 {
        return Err(NibbleError::NibbleType);
    }
    // 86 low-bit pairs come first, then the 256 high sextets
    let mut aux = [0u8;CHUNK62];
    for i in 0..256 {
        aux[CHUNK62 - 1 - i%CHUNK62] |= swap2(dat[i]) << (2*(i/CHUNK62));
    }
    let mut field = [0u8;343];
    let mut prev = dat_fmt.chk_seed;
    for (i,a) in aux.iter().rev().enumerate() {
        field[i] = DISK_BYTES_62[(*a ^ prev) as usize & 0x3f];
        prev = *a;
    }
    for i in 0..256 {
        let top = dat[i] >> 2;
        field[CHUNK62 + i] = DISK_BYTES_62[(top ^ prev) as usize & 0x3f];
        prev = top;
    }
    field[342] = DISK_BYTES_62[prev as usize & 0x3f];
    trk.write(&field,343*8);
    Ok(())
}

/// 6&2 decode 256 bytes at the bit pointer, verifying the checksum
pub fn decode_sector(trk: &mut TrackBits,dat_fmt: &SectorDataFormat) -> Result<Vec<u8>,NibbleError> {
    if dat_fmt.nib != NibbleType::Enc62 {
        return Err(NibbleError::NibbleType);
    }
    let mut field = [0u8;343];
    trk.read(&mut field,343*8);
    let inv = invert_62();
    let mut sextets = [0u8;343];
    let mut running = dat_fmt.chk_seed;
    for i in 0..343 {
        let val = inv[field[i] as usize];
        if val == 0xff {
            return Err(NibbleError::InvalidByte);
        }
        running ^= val;
        sextets[i] = running;
    }
    if dat_fmt.verify_chk && running != 0 {
        return Err(NibbleError::BadChecksum);
    }
    let mut ans: Vec<u8> = Vec::new();
    for i in 0..256 {
        // the aux bytes arrived in reverse, sextets[j] is aux[85-j]
        let pair = (sextets[i%CHUNK62] >> (2*(i/CHUNK62))) & 3;
        ans.push((sextets[CHUNK62 + i] << 2) | swap2(pair));
    }
    Ok(ans)
}

/// lay down `num` 10-bit self-sync bytes
fn write_sync_gap(trk: &mut TrackBits,num: usize) {
    for _i in 0..num {
        trk.write(&[0xff,0x00],10);
    }
}

/// Synthesize a standard 16 sector track, data fields zeroed.  The bit count
/// of the returned track covers only the bits actually laid down.
pub fn create_track(vol: u8,track: u8,adr_fmt: &SectorAddressFormat,dat_fmt: &SectorDataFormat) -> Result<TrackBits,NibbleError> {
    if dat_fmt.nib != NibbleType::Enc62 {
        return Err(NibbleError::NibbleType);
    }
    let mut ans = TrackBits::new(vec![0;TRACK_BYTE_CAPACITY],TRACK_BYTE_CAPACITY*8);
    write_sync_gap(&mut ans,40);
    for sector in 0..16 {
        ans.write(&adr_fmt.prolog,24);
        for val in [vol,track,sector,adr_fmt.chk_seed ^ vol ^ track ^ sector] {
            ans.write(&encode_44(val),16);
        }
        ans.write(&adr_fmt.epilog,24);
        write_sync_gap(&mut ans,10);
        ans.write(&dat_fmt.prolog,24);
        encode_sector(&mut ans,&[0;256],dat_fmt)?;
        ans.write(&dat_fmt.epilog,24);
        write_sync_gap(&mut ans,20);
    }
    // nothing wrapped, so the pointer is the used bit count
    ans.bit_count = ans.pos;
    ans.reset();
    Ok(ans)
}

/// Find the given physical sector and decode its data field
pub fn read_sector(trk: &mut TrackBits,track: u8,psec: u8,adr_fmt: &SectorAddressFormat,dat_fmt: &SectorDataFormat) -> Result<Vec<u8>,NibbleError> {
    find_sector_data(trk,[track,psec],adr_fmt,dat_fmt)?;
    decode_sector(trk,dat_fmt)
}

/// Find the given physical sector and overwrite its data field
pub fn write_sector(trk: &mut TrackBits,dat: &[u8],track: u8,psec: u8,adr_fmt: &SectorAddressFormat,dat_fmt: &SectorDataFormat) -> Result<(),NibbleError> {
    find_sector_data(trk,[track,psec],adr_fmt,dat_fmt)?;
    encode_sector(trk,dat,dat_fmt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_and_four() {
        let coded = encode_44(0xfe);
        // every 4&4 byte has all odd bits set
        assert!(coded.iter().all(|b| b & 0xaa == 0xaa));
        assert_eq!(decode_44(coded),0xfe);
    }

    #[test]
    fn sector_codec_round_trip() {
        let fmt = SectorDataFormat::create_std();
        let dat: Vec<u8> = (0..256).map(|i| (i*7 % 256) as u8).collect();
        let mut trk = TrackBits::new(vec![0;400],400*8);
        encode_sector(&mut trk,&dat,&fmt).expect("encode failed");
        // every byte written must be a valid disk byte
        let buf = trk.to_buffer();
        let inv = invert_62();
        assert!(buf[0..343].iter().all(|b| inv[*b as usize] != 0xff));
        trk.reset();
        assert_eq!(decode_sector(&mut trk,&fmt).expect("decode failed"),dat);
    }

    #[test]
    fn blank_track_reads_back() {
        let adr_fmt = SectorAddressFormat::create_std();
        let dat_fmt = SectorDataFormat::create_std();
        let mut trk = create_track(254,17,&adr_fmt,&dat_fmt).expect("create failed");
        for psec in [0u8,7,15] {
            trk.reset();
            let vol = find_sector_data(&mut trk,[17,psec],&adr_fmt,&dat_fmt).expect("sector not found");
            assert_eq!(vol,254);
            assert_eq!(decode_sector(&mut trk,&dat_fmt).expect("decode failed"),vec![0;256]);
        }
    }
}
