//! ### DOS 3.x directory structures
//!
//! The catalog lives on the VTOC track: the VTOC sector itself, then a chain
//! of directory sectors, each holding 7 entries.  Every file entry points at a
//! chain of track-sector lists which in turn point at the data sectors.
//! All are fixed length and flattened with the `DiskStruct` trait.
//!
//! Large volumes: the bitmap allocates 32 bits per track and there is room
//! for 50 tracks at up to 32 sectors, i.e. 409600 bytes or half of an 800K
//! disk.  UniDOS and OzDOS volumes are handled this way, with the aid of a
//! dual-volume image adapter.

use a2kit_macro::{DiskStructError,DiskStruct};
use a2kit_macro_derive::DiskStruct;

#[derive(DiskStruct)]
pub struct VTOC {
    pub pad1: u8,
    pub track1: u8,
    pub sector1: u8,
    pub version: u8,
    pub pad2: [u8;2],
    pub vol: u8,
    pub pad3: [u8;32],
    pub max_pairs: u8,
    pub pad4: [u8;8],
    pub last_track: u8,
    pub last_direction: u8,
    pub pad5: [u8;2],
    pub tracks: u8,
    pub sectors: u8,
    pub bytes: [u8;2],
    pub bitmap: [u8;200]
}

#[derive(DiskStruct)]
pub struct TrackSectorList {
    pub pad1: u8,
    pub next_track: u8,
    pub next_sector: u8,
    pub pad2: [u8;2],
    pub sector_base: [u8;2],
    pub pad3: [u8;5],
    pub pairs: [u8;244]
}

#[derive(DiskStruct)]
pub struct DirectoryEntry {
    pub tsl_track: u8,
    pub tsl_sector: u8,
    pub file_type: u8,
    pub name: [u8;30],
    pub sectors: [u8;2]
}

pub struct DirectorySector {
    pub pad1: u8,
    pub next_track: u8,
    pub next_sector: u8,
    pub pad2: [u8;8],
    pub entries: [DirectoryEntry;7]
}

// hand written because the derive macro cannot initialize the entry array
impl DiskStruct for DirectorySector {
    fn new() -> Self {
        Self {
            pad1: 0,
            next_track: 0,
            next_sector: 0,
            pad2: [0;8],
            entries: std::array::from_fn(|_| DirectoryEntry::new())
        }
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans = vec![self.pad1,self.next_track,self.next_sector];
        ans.extend_from_slice(&self.pad2);
        for entry in &self.entries {
            ans.append(&mut entry.to_bytes());
        }
        ans
    }
    fn update_from_bytes(&mut self,bytes: &[u8]) -> Result<(),DiskStructError> {
        if bytes.len() < 256 {
            return Err(DiskStructError::OutOfData);
        }
        self.pad1 = bytes[0];
        self.next_track = bytes[1];
        self.next_sector = bytes[2];
        self.pad2.copy_from_slice(&bytes[3..11]);
        let sz = DirectoryEntry::new().len();
        for (i,entry) in self.entries.iter_mut().enumerate() {
            entry.update_from_bytes(&bytes[11+i*sz..11+(i+1)*sz])?;
        }
        Ok(())
    }
    fn from_bytes(bytes: &[u8]) -> Result<Self,DiskStructError> {
        let mut ans = Self::new();
        ans.update_from_bytes(bytes)?;
        Ok(ans)
    }
    fn len(&self) -> usize {
        256
    }
}
