//! ## Support for WOZ v2 disk images
//!
//! WOZ files store the actual bit stream of each track, so reading a sector
//! means running the nibble machinery in `img::nibbles` over the track.
//! The chunk wrappers are flattened with the `DiskStruct` trait.

use regex;
use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;
use log::{debug,error,info,warn};
use crate::img;
use crate::img::DiskImage;
use crate::img::nibbles::{self,TrackBits,SectorAddressFormat,SectorDataFormat,TRACK_BYTE_CAPACITY};
use crate::img::woz::{self,INFO_ID,TMAP_ID,TRKS_ID,META_ID,WRIT_ID};
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const MAX_TRACK_BLOCKS_525: u16 = 13;
const WOZ2_SIGNATURE: [u8;4] = [0x57,0x4f,0x5a,0x32];
/// byte offset of the bit streams when chunks run INFO, TMAP, TRKS
const STD_TRACK_BITS_OFFSET: usize = 1536;

/// Form regex to match patterns like `a|c|b` (order deliberately scrambled).
/// Expansion of `metaOptions!("a","b","c")` looks like this: `^(a|b|c)(\|(a|b|c))*$`
macro_rules! metaOptions {
    ($x:literal,$($y:literal),+) => {
        concat!("^(",$x,$("|",$y),+,r")(\|(",$x,$("|",$y),+,"))*$")
    }
}

/// Keys whose values must match a pattern.  The patterns do not forbid
/// redundant repetitions, and never match an empty string.
const STD_META_OPTIONS: [(&str,&str);3] = [
    ("requires_ram",r"^(16K|24K|32K|48K|64K|128K|256K|512K|768K|1M|1\.25M|1\.5M\+|Unknown)$"),
    ("requires_machine",metaOptions!("2",r"2\+","2e","2c",r"2e\+","2gs",r"2c\+","3",r"3\+")),
    ("side",r"^Disk [0-9]+, Side [A-B]$")
];

const STD_META_KEYS: [&str;16] = [
    "title","subtitle","publisher","developer","copyright","version","language","requires_ram",
    "requires_rom","requires_machine","apple2_requires","notes","side","side_name","contributor","image_date"
];

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
    disk_sides: u8,
    boot_sector_format: u8,
    optimal_bit_timing: u8,
    compatible_hardware: [u8;2],
    required_ram: [u8;2],
    largest_track: [u8;2],
    flux_block: [u8;2],
    largest_flux_track: [u8;2],
    pad: [u8;10]
}

#[derive(DiskStruct)]
pub struct TMap {
    id: [u8;4],
    size: [u8;4],
    map: [u8;160]
}

#[derive(DiskStruct,Clone,Copy)]
pub struct Trk {
    starting_block: [u8;2],
    block_count: [u8;2],
    bit_count: [u8;4]
}

pub struct Trks {
    id: [u8;4],
    size: [u8;4],
    tracks: Vec<Trk>,
    bits: Vec<u8>
}

pub struct Meta {
    recs: Vec<(String,String)>
}

pub struct Woz2 {
    kind: img::DiskKind,
    /// TRKS gives bit stream positions relative to the start of file,
    /// so the chunk's own position has to be remembered.
    track_bits_offset: usize,
    header: Header,
    info: Info,
    tmap: TMap,
    trks: Trks,
    meta: Option<Meta>,
    writ: Option<Vec<u8>>
}

impl Header {
    fn create() -> Self {
        Self {
            vers: WOZ2_SIGNATURE,
            high_bits: 0xff,
            lfcrlf: [0x0a,0x0d,0x0a],
            crc32: [0,0,0,0]
        }
    }
}

impl Info {
    fn create(kind: img::DiskKind) -> Self {
        let mut creator = [0x20u8;32];
        let stamp = img::names::creator_string();
        creator[0..stamp.len()].copy_from_slice(stamp.as_bytes());
        Self {
            id: u32::to_le_bytes(INFO_ID),
            size: u32::to_le_bytes(60),
            vers: 2,
            disk_type: 1,
            write_protected: 0,
            synchronized: 0,
            cleaned: 0,
            creator,
            disk_sides: 1,
            boot_sector_format: match kind {
                img::DiskKind::A2_525_13 => 2,
                _ => 1
            },
            optimal_bit_timing: 32,
            compatible_hardware: u16::to_le_bytes(0),
            required_ram: u16::to_le_bytes(0),
            largest_track: u16::to_le_bytes(MAX_TRACK_BLOCKS_525),
            flux_block: [0,0],
            largest_flux_track: [0,0],
            pad: [0;10]
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
    /// Synthesize 35 formatted tracks.  Assumes the chunk order will be
    /// INFO, TMAP, TRKS, placing the first bit stream at block 3.
    fn create(vol: u8) -> Result<Self,DYNERR> {
        let adr_fmt = SectorAddressFormat::create_std();
        let dat_fmt = SectorDataFormat::create_std();
        let mut ans = Trks::new();
        ans.id = u32::to_le_bytes(TRKS_ID);
        for track in 0..35 {
            let track_obj = nibbles::create_track(vol,track,&adr_fmt,&dat_fmt)?;
            ans.tracks.push(Trk {
                starting_block: u16::to_le_bytes(3 + track as u16*MAX_TRACK_BLOCKS_525),
                block_count: u16::to_le_bytes(MAX_TRACK_BLOCKS_525),
                bit_count: u32::to_le_bytes(track_obj.bit_count() as u32)
            });
            ans.bits.append(&mut track_obj.to_buffer());
        }
        ans.tracks.resize(160,Trk::new());
        ans.size = u32::to_le_bytes((160*Trk::new().len() + 35*TRACK_BYTE_CAPACITY) as u32);
        Ok(ans)
    }
}

impl DiskStruct for Trks {
    fn new() -> Self where Self: Sized {
        Self {
            id: [0,0,0,0],
            size: [0,0,0,0],
            tracks: Vec::new(),
            bits: Vec::new()
        }
    }
    fn len(&self) -> usize {
        8 + u32::from_le_bytes(self.size) as usize
    }
    fn update_from_bytes(&mut self,bytes: &[u8]) -> Result<(),DiskStructError> {
        // 8 byte chunk header, then 160 Trk entries, then the bit streams
        if bytes.len() < 1288 {
            return Err(DiskStructError::OutOfData);
        }
        self.id = bytes[0..4].try_into().or(Err(DiskStructError::OutOfData))?;
        self.size = bytes[4..8].try_into().or(Err(DiskStructError::OutOfData))?;
        self.tracks = Vec::new();
        for raw in bytes[8..1288].chunks_exact(8) {
            self.tracks.push(Trk::from_bytes(raw)?);
        }
        if (u32::from_le_bytes(self.size) as usize - 1280) % 512 > 0 {
            error!("WOZ bit streams are not an even number of blocks");
            return Err(DiskStructError::IllegalValue);
        }
        self.bits = bytes[1288..].to_vec();
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
        ans.extend_from_slice(&self.bits);
        ans
    }
}

impl Meta {
    fn position(&self,key: &str) -> Option<usize> {
        self.recs.iter().position(|r| r.0==key)
    }
    fn get(&self,key: &str) -> Option<String> {
        self.position(key).map(|i| self.recs[i].1.clone())
    }
    /// Check `val` against the pattern for `key`, if there is one.
    /// An empty value always passes, it means deletion.
    fn verify_value(&self,key: &str,val: &str) -> bool {
        if val.is_empty() {
            return true;
        }
        match STD_META_OPTIONS.iter().find(|opt| opt.0==key) {
            Some((_,patt)) => match regex::Regex::new(patt) {
                Ok(re) => re.is_match(val),
                Err(_) => false
            },
            None => true
        }
    }
    fn add_or_replace(&mut self,key: &str,val: &str) -> STDRESULT {
        if [key,val].iter().any(|s| s.contains('\t') || s.contains('\n')) {
            error!("META keys and values cannot contain tabs or line feeds");
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        match self.position(key) {
            Some(i) => self.recs[i].1 = val.to_string(),
            None => self.recs.push((key.to_string(),val.to_string()))
        }
        Ok(())
    }
    /// Delete key if it exists, return true if it existed
    fn delete(&mut self,key: &str) -> bool {
        match self.position(key) {
            Some(i) => {
                warn!("deleting META record `{}`",key);
                self.recs.remove(i);
                true
            },
            None => false
        }
    }
}

impl DiskStruct for Meta {
    fn new() -> Self where Self: Sized {
        Self {
            recs: Vec::new()
        }
    }
    fn len(&self) -> usize {
        self.to_bytes().len()
    }
    fn update_from_bytes(&mut self,bytes: &[u8]) -> Result<(),DiskStructError> {
        if bytes.len() < 8 {
            return Err(DiskStructError::OutOfData);
        }
        if String::from_utf8(bytes[8..].to_vec()).is_err() {
            warn!("invalid UTF8 in WOZ META chunk, using lossy conversion");
        }
        for line in String::from_utf8_lossy(&bytes[8..]).lines() {
            match line.split_once('\t') {
                Some((key,val)) if !val.contains('\t') => {
                    self.recs.push((key.to_string(),val.to_string()));
                },
                _ => warn!("wrong tab count in META item {}, skipping",line)
            }
        }
        Ok(())
    }
    fn from_bytes(bytes: &[u8]) -> Result<Self,DiskStructError> where Self: Sized {
        let mut ans = Meta::new();
        ans.update_from_bytes(bytes)?;
        Ok(ans)
    }
    fn to_bytes(&self) -> Vec<u8> {
        let recs: Vec<String> = self.recs.iter().map(|r| format!("{}\t{}\n",r.0,r.1)).collect();
        let body = recs.concat();
        let mut ans: Vec<u8> = Vec::new();
        ans.extend_from_slice(&u32::to_le_bytes(META_ID));
        ans.extend_from_slice(&u32::to_le_bytes(body.len() as u32));
        ans.extend_from_slice(body.as_bytes());
        ans
    }
}

impl Woz2 {
    fn new() -> Self {
        Self {
            kind: img::DiskKind::Unknown,
            track_bits_offset: 0,
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
            error!("WOZ v2 can only create 16 sector 5.25 inch disks");
            return Err(Box::new(img::Error::UnknownDiskKind));
        }
        Ok(Self {
            kind,
            track_bits_offset: STD_TRACK_BITS_OFFSET,
            header: Header::create(),
            info: Info::create(kind),
            tmap: TMap::create(),
            trks: Trks::create(vol)?,
            meta: None,
            writ: None
        })
    }
    /// all three required chunks must have been seen
    fn sanity_check(&self) -> Result<(),DiskStructError> {
        for id in [self.info.id,self.tmap.id,self.trks.id] {
            if u32::from_le_bytes(id)==0 {
                debug!("WOZ v2 is missing a required chunk");
                return Err(DiskStructError::IllegalValue);
            }
        }
        Ok(())
    }
    /// Step the motor to a whole track and resolve the TRKS slot,
    /// erroring out on blank media.
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
    /// range of this TRKS slot's bit stream within the `bits` buffer
    fn get_trk_rng(&self,idx: usize) -> [usize;2] {
        let trk = &self.trks.tracks[idx];
        let begin = u16::from_le_bytes(trk.starting_block) as usize * 512 - self.track_bits_offset;
        [begin,begin + u16::from_le_bytes(trk.block_count) as usize * 512]
    }
    fn get_trk_bits(&self,track: usize) -> Result<TrackBits,DYNERR> {
        let idx = self.try_motor(track)?;
        let [beg,end] = self.get_trk_rng(idx);
        let bit_count = u32::from_le_bytes(self.trks.tracks[idx].bit_count) as usize;
        Ok(TrackBits::new(self.trks.bits[beg..end].to_vec(),bit_count))
    }
    fn put_trk_bits(&mut self,track: usize,bits: &TrackBits) -> STDRESULT {
        let idx = self.try_motor(track)?;
        let [beg,end] = self.get_trk_rng(idx);
        self.trks.bits[beg..end].copy_from_slice(&bits.to_buffer());
        Ok(())
    }
    fn sector_formats(&self) -> (SectorAddressFormat,SectorDataFormat) {
        match self.kind {
            img::DiskKind::A2_525_13 => (SectorAddressFormat::create_13(),SectorDataFormat::create_13()),
            _ => (SectorAddressFormat::create_std(),SectorDataFormat::create_std())
        }
    }
    /// Get a META value by key, if the chunk and the key exist
    pub fn get_meta(&self,key: &str) -> Option<String> {
        self.meta.as_ref().and_then(|meta| meta.get(key))
    }
    /// Add or replace a META record; an empty value deletes the record.
    /// The chunk is created if it does not exist.
    pub fn put_meta(&mut self,key: &str,val: &str) -> STDRESULT {
        let meta = self.meta.get_or_insert_with(Meta::new);
        if val.is_empty() && meta.delete(key) {
            return Ok(());
        }
        if !meta.verify_value(key,val) {
            error!("illegal META value `{}` for key `{}`",val,key);
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        if !STD_META_KEYS.contains(&key) {
            warn!("`{}` is not a standard META key",key);
        }
        meta.add_or_replace(key,val)
    }
}

impl woz::WozUnifier for Woz2 {
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

impl img::DiskImage for Woz2 {
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
        let mut ans = Woz2::new();
        ans.header.update_from_bytes(&buf[0..12])?;
        if ans.header.vers != WOZ2_SIGNATURE {
            return Err(DiskStructError::IllegalValue);
        }
        info!("identified WOZ v2 header");
        let mut ptr: usize = 12;
        while ptr > 0 {
            let (next,id,maybe_chunk) = woz::get_next_chunk(ptr,buf);
            match (id,maybe_chunk) {
                (INFO_ID,Some(chunk)) => ans.info.update_from_bytes(&chunk)?,
                (TMAP_ID,Some(chunk)) => ans.tmap.update_from_bytes(&chunk)?,
                (TRKS_ID,Some(chunk)) => {
                    // the Trk entries position bit streams relative to this
                    ans.track_bits_offset = ptr + 1288;
                    ans.trks.update_from_bytes(&chunk)?
                },
                (META_ID,Some(chunk)) => ans.meta = Some(Meta::from_bytes(&chunk)?),
                (WRIT_ID,Some(chunk)) => ans.writ = Some(chunk),
                _ => if id != 0 {
                    info!("unprocessed chunk with id {:08X}/{}",id,String::from_utf8_lossy(&u32::to_le_bytes(id)))
                }
            }
            ptr = next;
        }
        if ans.info.vers >= 3 && ans.info.flux_block != [0,0] && ans.info.largest_flux_track != [0,0] {
            error!("WOZ uses flux data (not supported)");
            return Err(DiskStructError::IllegalValue);
        }
        ans.sanity_check()?;
        if ans.info.disk_type != 1 {
            error!("WOZ disk type {} is not a 5.25 inch disk",ans.info.disk_type);
            return Err(DiskStructError::IllegalValue);
        }
        ans.kind = match ans.info.boot_sector_format {
            2 => img::DiskKind::A2_525_13,
            _ => img::DiskKind::A2_525_16
        };
        Ok(ans)
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::WOZ2
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
        if self.track_bits_offset != STD_TRACK_BITS_OFFSET {
            panic!("track bits at a nonstandard offset");
        }
        let mut ans: Vec<u8> = Vec::new();
        ans.append(&mut self.header.to_bytes());
        ans.append(&mut self.info.to_bytes());
        ans.append(&mut self.tmap.to_bytes());
        ans.append(&mut self.trks.to_bytes());
        if let Some(meta) = &self.meta {
            ans.append(&mut meta.to_bytes());
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
        let [beg,end] = self.get_trk_rng(idx);
        if end-beg != dat.len() {
            error!("source track buffer is {} bytes, destination track buffer is {} bytes",dat.len(),end-beg);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        self.trks.bits[beg..end].copy_from_slice(dat);
        Ok(())
    }
    fn get_track_nibbles(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        let mut bits = self.get_trk_bits(track)?;
        Ok(bits.to_nibbles())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use img::DiskImage;

    #[test]
    fn trailing_blank_tmap_entries_are_pruned() {
        let mut woz = Woz2::create(254,img::DiskKind::A2_525_16).expect("could not create WOZ");
        assert_eq!(woz.track_count(),35);
        for i in 20*4..160 {
            woz.tmap.map[i] = 0xff;
        }
        assert_eq!(woz.track_count(),20);
        for i in 0..160 {
            woz.tmap.map[i] = 0xff;
        }
        assert_eq!(woz.track_count(),0);
    }

    #[test]
    fn blank_quarter_tracks_survive_flattening() {
        // partially formatted media must come back with the same track count
        let mut woz = Woz2::create(254,img::DiskKind::A2_525_16).expect("could not create WOZ");
        for i in 20*4..160 {
            woz.tmap.map[i] = 0xff;
        }
        let flat = woz.to_bytes();
        let back = Woz2::from_bytes(&flat).expect("could not parse WOZ");
        assert_eq!(back.track_count(),20);
        assert_eq!(back.byte_capacity(),20*16*256);
    }

    #[test]
    fn tmap_quarter_tracks() {
        let tmap = TMap::create();
        assert_eq!(tmap.map[0],0);
        assert_eq!(tmap.map[1],0);
        assert_eq!(tmap.map[2],0xff);
        assert_eq!(tmap.map[3],1);
        assert_eq!(tmap.map[4],1);
        assert_eq!(tmap.map[34*4],34);
        assert_eq!(tmap.map[34*4+1],34);
        assert_eq!(tmap.map[34*4+2],0xff);
    }
}
