//! ## Support for NIB disk images
//!
//! NIB tracks contain a filtered bitstream, i.e., leading bits that resolve to 0 are
//! thrown out.  We handle these tracks using the same track engine that handles WOZ
//! tracks.  The trick is to use 8-bit sync bytes, which works so long as the NIB track
//! has been properly aligned and we start the bit pointer on a multiple of 8.

use a2kit_macro::DiskStructError;
use log::{debug,error,trace};
use crate::img;
use crate::img::DiskImage;
use crate::img::nibbles::{self,TrackBits,SectorAddressFormat,SectorDataFormat};
use crate::img::names::{A2_NIB_TRACK_SIZE,SECTOR_SIZE,BLOCK_SIZE};
use crate::bios::skew;
use crate::fs::Block;
use crate::{STDRESULT,DYNERR};

const CPM_RECORD: usize = 128;

pub fn file_extensions() -> Vec<String> {
    vec!["nib".to_string()]
}

pub struct Nib {
    kind: img::DiskKind,
    tracks: usize,
    data: Vec<u8>
}

impl Nib {
    /// Create a formatted image; the volume is written into the address fields.
    pub fn create(vol: u8,kind: img::DiskKind) -> Result<Self,DYNERR> {
        if kind!=img::DiskKind::A2_525_16 {
            error!("NIB can only create 16 sector 5.25 inch disks");
            return Err(Box::new(img::Error::UnknownDiskKind));
        }
        let adr_fmt = SectorAddressFormat::create_std();
        let dat_fmt = SectorDataFormat::create_std();
        let mut data: Vec<u8> = Vec::new();
        for track in 0..35 {
            let bits = nibbles::create_track(vol,track,&adr_fmt,&dat_fmt)?;
            let buf = bits.to_buffer();
            // repack to the NIB track capacity, trailing fill with sync bytes
            let mut trk = vec![0xff;A2_NIB_TRACK_SIZE];
            let n = usize::min(buf.len(),A2_NIB_TRACK_SIZE);
            trk[0..n].copy_from_slice(&buf[0..n]);
            data.append(&mut trk);
        }
        Ok(Self {
            kind,
            tracks: 35,
            data
        })
    }
    fn get_trk_bits(&self,track: usize) -> Result<TrackBits,DYNERR> {
        if track>=self.tracks {
            error!("track {} out of range",track);
            return Err(Box::new(img::Error::TrackAccess));
        }
        let beg = track*A2_NIB_TRACK_SIZE;
        Ok(TrackBits::new(self.data[beg..beg+A2_NIB_TRACK_SIZE].to_vec(),A2_NIB_TRACK_SIZE*8))
    }
    fn put_trk_bits(&mut self,track: usize,bits: &TrackBits) {
        let beg = track*A2_NIB_TRACK_SIZE;
        self.data[beg..beg+A2_NIB_TRACK_SIZE].copy_from_slice(&bits.to_buffer());
    }
    /// read a 256 byte logical sector going through the nibble stream
    fn read_lsec(&mut self,track: usize,lsec: usize) -> Result<Vec<u8>,DYNERR> {
        self.read_sector(track,skew::DOS_LSEC_TO_DOS_PSEC[lsec])
    }
    /// write a 256 byte logical sector going through the nibble stream
    fn write_lsec(&mut self,track: usize,lsec: usize,dat: &[u8]) -> STDRESULT {
        self.write_sector(track,skew::DOS_LSEC_TO_DOS_PSEC[lsec],dat)
    }
}

impl img::DiskImage for Nib {
    fn track_count(&self) -> usize {
        self.tracks
    }
    fn byte_capacity(&self) -> usize {
        self.tracks*16*SECTOR_SIZE
    }
    fn read_block(&mut self,addr: Block) -> Result<Vec<u8>,DYNERR> {
        trace!("read {}",addr);
        match addr {
            Block::D13(_) => Err(Box::new(img::Error::ImageTypeMismatch)),
            Block::DO([t,s]) => self.read_lsec(t,s),
            Block::PO(block) => {
                let mut ans: Vec<u8> = Vec::new();
                for [t,s] in skew::ts_from_prodos_block(block) {
                    ans.append(&mut self.read_lsec(t,s)?);
                }
                Ok(ans)
            },
            Block::CPM(_) => {
                let mut ans: Vec<u8> = Vec::new();
                let ts_list = addr.get_lsecs(32);
                for ts in ts_list {
                    let dsec = skew::CPM_LSEC_TO_DOS_LSEC[ts[1]-1];
                    let full = self.read_lsec(ts[0],dsec)?;
                    let off = skew::CPM_LSEC_TO_DOS_OFFSET[ts[1]-1];
                    ans.append(&mut full[off..off+CPM_RECORD].to_vec());
                }
                Ok(ans)
            }
        }
    }
    fn write_block(&mut self,addr: Block,dat: &[u8]) -> STDRESULT {
        trace!("write {}",addr);
        match addr {
            Block::D13(_) => Err(Box::new(img::Error::ImageTypeMismatch)),
            Block::DO([t,s]) => {
                let padded = super::quantize_block(dat,SECTOR_SIZE);
                self.write_lsec(t,s,&padded)
            },
            Block::PO(block) => {
                let padded = super::quantize_block(dat,BLOCK_SIZE);
                let mut src_offset = 0;
                for [t,s] in skew::ts_from_prodos_block(block) {
                    self.write_lsec(t,s,&padded[src_offset..src_offset+SECTOR_SIZE])?;
                    src_offset += SECTOR_SIZE;
                }
                Ok(())
            },
            Block::CPM((_block,bsh,_off)) => {
                let padded = super::quantize_block(dat,CPM_RECORD << bsh);
                let ts_list = addr.get_lsecs(32);
                let mut src_offset = 0;
                for ts in ts_list {
                    let dsec = skew::CPM_LSEC_TO_DOS_LSEC[ts[1]-1];
                    let mut full = self.read_lsec(ts[0],dsec)?;
                    let off = skew::CPM_LSEC_TO_DOS_OFFSET[ts[1]-1];
                    full[off..off+CPM_RECORD].copy_from_slice(&padded[src_offset..src_offset+CPM_RECORD]);
                    self.write_lsec(ts[0],dsec,&full)?;
                    src_offset += CPM_RECORD;
                }
                Ok(())
            }
        }
    }
    fn read_sector(&mut self,track: usize,sector: usize) -> Result<Vec<u8>,DYNERR> {
        if sector>=16 {
            error!("physical sector {} out of range",sector);
            return Err(Box::new(img::Error::SectorAccess));
        }
        let mut bits = self.get_trk_bits(track)?;
        let adr_fmt = SectorAddressFormat::create_std();
        let dat_fmt = SectorDataFormat::create_std();
        Ok(nibbles::read_sector(&mut bits,track as u8,sector as u8,&adr_fmt,&dat_fmt)?)
    }
    fn write_sector(&mut self,track: usize,sector: usize,dat: &[u8]) -> STDRESULT {
        if sector>=16 {
            error!("physical sector {} out of range",sector);
            return Err(Box::new(img::Error::SectorAccess));
        }
        let mut bits = self.get_trk_bits(track)?;
        let adr_fmt = SectorAddressFormat::create_std();
        let dat_fmt = SectorDataFormat::create_std();
        let padded = super::quantize_block(dat,SECTOR_SIZE);
        nibbles::write_sector(&mut bits,&padded,track as u8,sector as u8,&adr_fmt,&dat_fmt)?;
        self.put_trk_bits(track,&bits);
        Ok(())
    }
    fn from_bytes(buf: &[u8]) -> Result<Self,DiskStructError> {
        if buf.len()!=35*A2_NIB_TRACK_SIZE {
            debug!("buffer size {} fails to match nib",buf.len());
            return Err(DiskStructError::UnexpectedSize);
        }
        Ok(Self {
            kind: img::DiskKind::A2_525_16,
            tracks: 35,
            data: buf.to_vec()
        })
    }
    fn what_am_i(&self) -> img::DiskImageType {
        img::DiskImageType::NIB
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
        self.data.clone()
    }
    fn get_track_buf(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        Ok(self.get_trk_bits(track)?.to_buffer())
    }
    fn set_track_buf(&mut self,track: usize,dat: &[u8]) -> STDRESULT {
        if track>=self.tracks {
            error!("track {} out of range",track);
            return Err(Box::new(img::Error::TrackAccess));
        }
        if dat.len()!=A2_NIB_TRACK_SIZE {
            error!("source track buffer is {} bytes, destination is {} bytes",dat.len(),A2_NIB_TRACK_SIZE);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        let beg = track*A2_NIB_TRACK_SIZE;
        self.data[beg..beg+A2_NIB_TRACK_SIZE].copy_from_slice(dat);
        Ok(())
    }
    fn get_track_nibbles(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        let mut bits = self.get_trk_bits(track)?;
        Ok(bits.to_nibbles())
    }
}
