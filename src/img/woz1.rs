//! ## Support for WOZ v1 disk images
//!
//! This uses the nibble machinery in `img::nibbles` to handle the bit streams.
//! The `DiskStruct` trait is used to flatten and unflatten the wrapper structures.
//! WOZ v1 stores each track in a fixed 6656 byte slot; the INFO chunk does not
//! record the boot sector format, so a 13 sector disk can only be recognized
//! by probing the bits, which we leave to higher levels via `change_kind`.

use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;
use log::{debug,error,info};
use crate::img;
use crate::img::DiskImage;
use crate::img::nibbles::{self,TrackBits,SectorAddressFormat,SectorDataFormat};
use crate::img::woz::{self,INFO_ID,TMAP_ID,TRKS_ID,META_ID,WRIT_ID};
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const WOZ1_SIGNATURE: [u8;4] = [0x57,0x4f,0x5a,0x31];
const TRACK_BYTE_CAPACITY_V1: usize = 6646;
const TRK_SLOT_SIZE: usize = 6656;

pub fn file_extensions() -> Vec<String> {
    vec!["woz".to_string()]
}

#[derive(DiskStruct)]
pub struct Header {
    vers: [u8;4],
    high_bits: u8,
    lfcrlf: [u8;3],
    crc32: [u8;4]
}

#[derive(DiskStruct)]
pub struct Info {
    id: [u8;4],
    size: [u8;4],
    vers: u8,
    disk_type: u8,
    write_protected: u8,
    synchronized: u8,
    cleaned: u8,
    creator: [u8;32],
    pad: [u8;23]
}

#[derive(DiskStruct)]
pub struct TMap {
    id: [u8;4],
    size: [u8;4],
    map: [u8;160]
}

#[derive(DiskStruct,Clone,Copy)]
pub struct Trk {
    bits: [u8;TRACK_BYTE_CAPACITY_V1],
    bytes_used: [u8;2],
    bit_count: [u8;2],
    splice_point: [u8;2],
    splice_nib: u8,
    splice_bit_count: u8,
    reserved: [u8;2]
}

pub struct Trks {
    id: [u8;4],
    size: [u8;4],
    tracks: Vec<Trk>
}

pub struct Woz1 {
    kind: img::DiskKind,
    header: Header,
    info: Info,
    tmap: TMap,
    trks: Trks,
    meta: Option<Vec<u8>>,
    writ: Option<Vec<u8>>
}

impl Header {
    fn create() -> Self {
        Self {
            vers: WOZ1_SIGNATURE,
            high_bits: 0xff,
            lfcrlf: [0x0a,0x0d,0x0a],
            crc32: [0,0,0,0]
        }
    }
}

impl Info {
    fn create() -> Self {
        let stamp = img::names::creator_string();
        let mut creator: [u8;32] = [0x20;32];
        creator[0..stamp.len()].copy_from_slice(stamp.as_bytes());
        Self {
            id: u32::to_le_bytes(INFO_ID),
            size: u32::to_le_bytes(60),
            vers: 1,
            disk_type: 1,
            write_protected: 0,
            synchronized: 0,
            cleaned: 0,
            creator,
            pad: [0;23]
        }
    }
}

impl TMap {
    /// quarter tracks 1 step from the nominal position resolve to the same bits
    fn create() -> Self {
        let mut map: [u8;160] = [0xff;160];
        for t in 0..35 {
            if t > 0 {
                map[t*4-1] = t as u8;
            }
            map[t*4] = t as u8;
            map[t*4+1] = t as u8;
        }
        Self {
            id: u32::to_le_bytes(TMAP_ID),
            size: u32::to_le_bytes(160),
            map
        }
    }
}

impl Trks {
    fn create(vol: u8) -> Result<Self,DYNERR> {
        let mut ans = Trks::new();
        ans.id = u32::to_le_bytes(TRKS_ID);
        ans.size = u32::to_le_bytes((35*TRK_SLOT_SIZE) as u32);
        let adr_fmt = SectorAddressFormat::create_std();
        let dat_fmt = SectorDataFormat::create_std();
        for track in 0..35 {
            let track_obj = nibbles::create_track(vol,track,&adr_fmt,&dat_fmt)?;
            let buf = track_obj.to_buffer();
            let bit_count = track_obj.bit_count();
            let bytes_used = (bit_count + 7) / 8;
            let mut bits: [u8;TRACK_BYTE_CAPACITY_V1] = [0;TRACK_BYTE_CAPACITY_V1];
            bits[0..bytes_used].copy_from_slice(&buf[0..bytes_used]);
            ans.tracks.push(Trk {
                bits,
                bytes_used: u16::to_le_bytes(bytes_used as u16),
                bit_count: u16::to_le_bytes(bit_count as u16),
                splice_point: u16::to_le_bytes(0xffff),
                splice_nib: 0,
                splice_bit_count: 0,
                reserved: [0,0]
            });
        }
        Ok(ans)
    }
}

impl DiskStruct for Trks {
    fn new() -> Self where Self: Sized {
        Self {
            id: [0,0,0,0],
            size: [0,0,0,0],
            tracks: Vec::new()
        }
    }
    fn len(&self) -> usize {
        8 + u32::from_le_bytes(self.size) as usize
    }
    fn update_from_bytes(&mut self,bytes: &[u8]) -> Result<(),DiskStructError> {
        if bytes.len() < 8 {
            return Err(DiskStructError::OutOfData);
        }
        self.id = bytes[0..4].try_into().or(Err(DiskStructError::OutOfData))?;
        self.size = bytes[4..8].try_into().or(Err(DiskStructError::OutOfData))?;
        let chunk_size = u32::from_le_bytes(self.size) as usize;
        if chunk_size%TRK_SLOT_SIZE > 0 || bytes.len() < 8+chunk_size {
            error!("WOZ v1 TRKS chunk is not an even number of track slots");
            return Err(DiskStructError::IllegalValue);
        }
        self.tracks = Vec::new();
        for slot in bytes[8..8+chunk_size].chunks_exact(TRK_SLOT_SIZE) {
            self.tracks.push(Trk::from_bytes(slot)?);
        }
        Ok(())
    }
    fn from_bytes(bytes: &[u8]) -> Result<Self,DiskStructError> where Self: Sized {
        let mut ans = Trks::new();
        ans.update_from_bytes(bytes)?;
        Ok(ans)
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans: Vec<u8> = Vec::new();
        ans.extend_from_slice(&self.id);
        ans.extend_from_slice(&self.size);
        for trk in &self.tracks {
            ans.append(&mut trk.to_bytes());
        }
        ans
    }
}

impl Woz1 {
    fn new() -> Self {
        Self {
            kind: img::DiskKind::Unknown,
            header: Header::new(),
            info: Info::new(),
            tmap: TMap::new(),
            trks: Trks::new(),
            meta: None,
            writ: None
        }
    }
    /// Create a formatted 16 sector image; 13 sector images cannot be
    /// created since we do not write 5&3 nibbles.
    pub fn create(vol: u8,kind: img::DiskKind) -> Result<Self,DYNERR> {
        if kind != img::DiskKind::A2_525_16 {
            error!("WOZ v1 can only create 16 sector 5.25 inch disks");
            return Err(Box::new(img::Error::UnknownDiskKind));
        }
        Ok(Self {
            kind,
            header: Header::create(),
            info: Info::create(),
            tmap: TMap::create(),
            trks: Trks::create(vol)?,
            meta: None,
            writ: None
        })
    }
    fn sanity_check(&self) -> Result<(),DiskStructError> {
        for id in [self.info.id,self.tmap.id,self.trks.id] {
            if u32::from_le_bytes(id) == 0 {
                debug!("WOZ v1 sanity checks failed");
                return Err(DiskStructError::IllegalValue);
            }
        }
        Ok(())
    }
    /// Find the TRKS slot for a whole track, if the track is formatted
    fn try_motor(&self,track: usize) -> Result<usize,DYNERR> {
        match self.tmap.map.get(track*4) {
            None => Err(Box::new(img::Error::TrackAccess)),
            Some(0xff) => {
                info!("touched blank media at TMAP index {}",track*4);
                Err(Box::new(img::NibbleError::BadTrack))
            },
            Some(slot) if *slot as usize >= self.trks.tracks.len() => Err(Box::new(img::Error::TrackAccess)),
            Some(slot) => Ok(*slot as usize)
        }
    }
    fn get_trk_bits(&self,track: usize) -> Result<TrackBits,DYNERR> {
        let idx = self.try_motor(track)?;
        let trk = &self.trks.tracks[idx];
        let bit_count = u16::from_le_bytes(trk.bit_count) as usize;
        Ok(TrackBits::new(trk.bits.to_vec(),bit_count))
    }
    fn put_trk_bits(&mut self,track: usize,bits: &TrackBits) -> STDRESULT {
        let idx = self.try_motor(track)?;
        let buf = bits.to_buffer();
        self.trks.tracks[idx].bits.copy_from_slice(&buf);
        Ok(())
    }
    fn sector_formats(&self) -> (SectorAddressFormat,SectorDataFormat) {
        match self.kind {
            img::DiskKind::A2_525_13 => (SectorAddressFormat::create_13(),SectorDataFormat::create_13()),
            _ => (SectorAddressFormat::create_std(),SectorDataFormat::create_std())
        }
    }
}

impl woz::WozUnifier for Woz1 {
    fn kind(&self) -> img::DiskKind {
        self.kind
    }
    fn num_tracks(&self) -> usize {
        self.track_count()
    }
    fn read_sector(&mut self,track: u8,sector: u8) -> Result<Vec<u8>,img::NibbleError> {
        let mut bits = self.get_trk_bits(track as usize).or(Err(img::NibbleError::BadTrack))?;
        let (adr_fmt,dat_fmt) = self.sector_formats();
        nibbles::read_sector(&mut bits,track,sector,&adr_fmt,&dat_fmt)
    }
    fn write_sector(&mut self,dat: &[u8],track: u8,sector: u8) -> Result<(),img::NibbleError> {
        let mut bits = self.get_trk_bits(track as usize).or(Err(img::NibbleError::BadTrack))?;
        let (adr_fmt,dat_fmt) = self.sector_formats();
        nibbles::write_sector(&mut bits,dat,track,sector,&adr_fmt,&dat_fmt)?;
        self.put_trk_bits(track as usize,&bits).or(Err(img::NibbleError::BadTrack))
    }
}

impl img::DiskImage for Woz1 {
    fn track_count(&self) -> usize {
        // trailing blank entries in the TMAP do not count
        match self.tmap.map.iter().rposition(|slot| *slot != 0xff) {
            Some(i) => i/4 + 1,
            None => 0
        }
    }
    fn byte_capacity(&self) -> usize {
        match self.kind {
            img::DiskKind::A2_525_13 => self.track_count()*13*256,
            _ => self.track_count()*16*256
        }
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        woz::read_block(self,addr)
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        woz::write_block(self,addr,dat)
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        woz::read_sector(self,track,sector)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        woz::write_sector(self,track,sector,dat)
    }
    fn from_bytes(buf: &[u8]) -> Result<Self,DiskStructError> where Self: Sized {
        if buf.len() < 12 {
            return Err(DiskStructError::UnexpectedSize);
        }
        let mut ans = Woz1::new();
        ans.header.update_from_bytes(&buf[0..12])?;
        if ans.header.vers != WOZ1_SIGNATURE {
            return Err(DiskStructError::IllegalValue);
        }
        info!("identified WOZ v1 header");
        let mut ptr: usize = 12;
        while ptr > 0 {
            let (next,id,maybe_chunk) = woz::get_next_chunk(ptr,buf);
            match (id,maybe_chunk) {
                (INFO_ID,Some(chunk)) => ans.info.update_from_bytes(&chunk)?,
                (TMAP_ID,Some(chunk)) => ans.tmap.update_from_bytes(&chunk)?,
                (TRKS_ID,Some(chunk)) => ans.trks.update_from_bytes(&chunk)?,
                (META_ID,Some(chunk)) => ans.meta = Some(chunk),
                (WRIT_ID,Some(chunk)) => ans.writ = Some(chunk),
                _ => if id != 0 {
                    info!("unprocessed chunk with id {:08X}/{}",id,String::from_utf8_lossy(&u32::to_le_bytes(id)))
                }
            }
            ptr = next;
        }
        ans.sanity_check()?;
        if ans.info.disk_type != 1 {
            error!("WOZ disk type {} is not a 5.25 inch disk",ans.info.disk_type);
            return Err(DiskStructError::IllegalValue);
        }
        // v1 INFO does not record the sector count, assume 16 until told otherwise
        ans.kind = img::DiskKind::A2_525_16;
        Ok(ans)
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::WOZ1
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn kind(&self) -> img::DiskKind {
        self.kind
    }
    fn change_kind(&mut self,kind: img::DiskKind) {
        self.kind = kind;
    }
    fn to_bytes(&mut self) -> Vec<u8> {
        let mut ans: Vec<u8> = Vec::new();
        ans.append(&mut self.header.to_bytes());
        ans.append(&mut self.info.to_bytes());
        ans.append(&mut self.tmap.to_bytes());
        ans.append(&mut self.trks.to_bytes());
        if let Some(meta) = &self.meta {
            ans.extend_from_slice(meta);
        }
        if let Some(writ) = &self.writ {
            ans.extend_from_slice(writ);
        }
        let crc = u32::to_le_bytes(woz::crc32(0,&ans[12..]));
        ans[8..12].copy_from_slice(&crc);
        ans
    }
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        Ok(self.get_trk_bits(track)?.to_buffer())
    }
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT {
        let idx = self.try_motor(track)?;
        if dat.len() != TRACK_BYTE_CAPACITY_V1 {
            error!("source track buffer is {} bytes, destination track buffer is {} bytes",dat.len(),TRACK_BYTE_CAPACITY_V1);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        self.trks.tracks[idx].bits.copy_from_slice(dat);
        Ok(())
    }
    fn get_track_nibbles(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        let mut bits = self.get_trk_bits(track)?;
        Ok(bits.to_nibbles())
    }
}
