//! ## ProDOS file system module
//!
//! This manipulates disk images containing one ProDOS volume.
//!
//! * Single volume images only

pub mod types;
mod directory;

use std::collections::HashMap;
use a2kit_macro::DiskStruct;
use std::str::FromStr;
use log::{trace,debug,error};
use types::*;
use directory::*;
use super::{Block,ItemType,FileInfo};
use crate::img;
use crate::{DYNERR,STDRESULT};

pub use types::FS_NAME;

/// Load address stamped on Applesoft program files
const APPLESOFT_ADDR: u16 = 0x801;

/// Sanity bound while walking a directory chain
const MAX_DIR_BLOCKS: usize = 100;

const FILE_KINDS: [StorageType;3] = [StorageType::Seedling,StorageType::Sapling,StorageType::Tree];
const ANY_KIND: [StorageType;4] = [StorageType::Seedling,StorageType::Sapling,StorageType::Tree,StorageType::SubDirEntry];

/// Cached copy of the volume bitmap.  All free-space bookkeeping happens
/// here; the blocks on the image are refreshed when the image is handed out.
struct Bitmap {
    first: usize,
    bits: Vec<u8>
}

impl Bitmap {
    fn covers(&self,iblock: usize) -> bool {
        iblock >= self.first && iblock < self.first + self.bits.len()/BLOCK_SIZE
    }
    fn is_free(&self,iblock: usize) -> bool {
        self.bits[iblock/8] & (0x80 >> (iblock%8)) > 0
    }
    fn set_free(&mut self,iblock: usize,free: bool) {
        if free {
            self.bits[iblock/8] |= 0x80 >> (iblock%8);
        } else {
            self.bits[iblock/8] &= !(0x80 >> (iblock%8));
        }
    }
}

/// The primary interface for disk operations.
pub struct Disk {
    img: Box<dyn img::DiskImage>,
    blocks: usize,
    bitmap: Option<Bitmap>
}

/// index blocks keep the low bytes in the first half and the high bytes in the second
fn put_index_ptr(buf: &mut [u8],ptr: u16,slot: usize) {
    let le = u16::to_le_bytes(ptr);
    buf[slot] = le[0];
    buf[slot+256] = le[1];
}

fn get_index_ptr(buf: &[u8],slot: usize) -> u16 {
    u16::from_le_bytes([buf[slot],buf[slot+256]])
}

impl Disk {
    fn new_fimg(chunk_len: usize) -> super::FileImage {
        super::FileImage {
            fimg_version: super::FileImage::fimg_version(),
            file_system: String::from(FS_NAME),
            fs_type: vec![0],
            aux: vec![0;2],
            eof: vec![0;3],
            created: vec![0;4],
            modified: vec![0;4],
            access: vec![0],
            version: vec![0],
            min_version: vec![0],
            chunk_len,
            chunks: HashMap::new()
        }
    }
    /// Use the given image as storage for a new DiskFS.
    /// The DiskFS takes ownership of the image.
    /// The image may or may not be formatted.
    pub fn from_img(img: Box<dyn img::DiskImage>) -> Self {
        let blocks = img.byte_capacity()/BLOCK_SIZE;
        Self {
            img,
            blocks,
            bitmap: None
        }
    }
    /// Run heuristics on the volume key block to decide whether this
    /// image carries a ProDOS volume.
    pub fn test_img(img: &mut Box<dyn img::DiskImage>) -> bool {
        let buf = match img.read_block(Block::PO(VOL_KEY_BLOCK as usize)) {
            Ok(b) => b,
            Err(_) => {
                debug!("ProDOS volume directory was not readable");
                return false;
            }
        };
        let prev = u16::from_le_bytes([buf[0],buf[1]]);
        let next = u16::from_le_bytes([buf[2],buf[3]]);
        if prev!=0 || next!=VOL_KEY_BLOCK+1 {
            debug!("unexpected volume directory links {},{}",prev,next);
            return false;
        }
        if buf[0x23]!=0x27 || (buf[0x24]!=13 && buf[0x24]!=12) {
            debug!("unexpected header bytes {}, {}",buf[0x23],buf[0x24]);
            return false;
        }
        if u16::from_le_bytes([buf[0x29],buf[0x2a]]) < 280 {
            debug!("peculiar block count {}",u16::from_le_bytes([buf[0x29],buf[0x2a]]));
            return false;
        }
        let nibs = buf[4];
        let name = &buf[5..5+(nibs & 0x0f) as usize];
        if nibs >> 4 != StorageType::VolDirHeader as u8 || name.len()==0 {
            debug!("unexpected volume storage nibble {:#04x}",nibs);
            return false;
        }
        let leading = "ABCDEFGHIJKLMNOPQRSTUVWXYZ.";
        let trailing = [leading,"0123456789"].concat();
        if !leading.contains(name[0] as char) || name[1..].iter().any(|c| !trailing.contains(*c as char)) {
            debug!("volume name unexpected character");
            return false;
        }
        true
    }
    fn bitmap_block_count(&self) -> usize {
        1 + self.blocks/4096
    }
    /// Load the bitmap if it is not already cached
    fn bitmap(&mut self) -> Result<&mut Bitmap,DYNERR> {
        if self.bitmap.is_none() {
            let first = self.get_vol_header()?.bitmap_ptr() as usize;
            let mut bits = Vec::new();
            for iblock in first..first+self.bitmap_block_count() {
                bits.append(&mut self.img.read_block(Block::PO(iblock))?);
            }
            self.bitmap = Some(Bitmap { first, bits });
        }
        Ok(self.bitmap.as_mut().expect("bitmap was just loaded"))
    }
    /// Refresh the bitmap blocks on the image from the cache
    fn flush_bitmap(&mut self) -> STDRESULT {
        let (first,bits) = match &self.bitmap {
            Some(bm) => (bm.first,bm.bits.clone()),
            None => return Ok(())
        };
        for (i,chunk) in bits.chunks(BLOCK_SIZE).enumerate() {
            self.img.write_block(Block::PO(first+i),chunk)?;
        }
        Ok(())
    }
    fn allocate_block(&mut self,iblock: usize) -> STDRESULT {
        self.bitmap()?.set_free(iblock,false);
        Ok(())
    }
    fn deallocate_block(&mut self,iblock: usize) -> STDRESULT {
        self.bitmap()?.set_free(iblock,true);
        Ok(())
    }
    fn is_block_free(&mut self,iblock: usize) -> Result<bool,DYNERR> {
        Ok(self.bitmap()?.is_free(iblock))
    }
    fn num_free_blocks(&mut self) -> Result<usize,DYNERR> {
        let total = self.blocks;
        let bm = self.bitmap()?;
        Ok((0..total).filter(|b| bm.is_free(*b)).count())
    }
    fn get_available_block(&mut self) -> Result<Option<u16>,DYNERR> {
        let total = self.blocks;
        let bm = self.bitmap()?;
        Ok((0..total).find(|b| bm.is_free(*b)).map(|b| b as u16))
    }
    /// Take the first free block and mark it used
    fn take_available_block(&mut self) -> Result<u16,DYNERR> {
        match self.get_available_block()? {
            Some(b) => {
                self.allocate_block(b as usize)?;
                Ok(b)
            },
            None => {
                error!("block not available, but it should have been");
                Err(Box::new(Error::DiskFull))
            }
        }
    }
    /// Read a block, serving bitmap blocks from the cache when loaded
    fn read_block(&mut self,iblock: usize) -> Result<Vec<u8>,DYNERR> {
        if let Some(bm) = &self.bitmap {
            if bm.covers(iblock) {
                let beg = (iblock - bm.first)*BLOCK_SIZE;
                return Ok(bm.bits[beg..beg+BLOCK_SIZE].to_vec());
            }
        }
        self.img.read_block(Block::PO(iblock))
    }
    /// Write and allocate the block in one step.
    /// Bitmap blocks must never come through here, only `flush_bitmap` writes them.
    fn write_block(&mut self,dat: &[u8],iblock: usize) -> STDRESULT {
        if let Some(bm) = &self.bitmap {
            if bm.covers(iblock) {
                panic!("attempt to write bitmap block, zap it instead");
            }
        }
        self.img.write_block(Block::PO(iblock),dat)?;
        self.allocate_block(iblock)
    }
    /// Write a block without touching the allocation state.
    /// Stomping on the bitmap span invalidates the cache.
    fn zap_block(&mut self,dat: &[u8],iblock: usize) -> STDRESULT {
        if let Some(bm) = &self.bitmap {
            if bm.covers(iblock) {
                self.bitmap = None;
            }
        }
        self.img.write_block(Block::PO(iblock),dat)
    }
    /// Format a disk with the ProDOS file system.
    /// Boot blocks 0 and 1 are left zeroed, so the volume is not bootable.
    pub fn format(&mut self,vol_name: &str,time: Option<chrono::NaiveDateTime>) -> STDRESULT {
        trace!("formatting: zero all");
        for iblock in 0..self.blocks {
            self.zap_block(&[0;BLOCK_SIZE],iblock)?;
        }
        trace!("formatting: volume key");
        let key = DirBlock::volume_key(self.blocks as u16,vol_name,time);
        let first_bitmap = match &key.header {
            DirHeader::Volume(h) => h.bitmap_ptr() as usize,
            _ => panic!("volume key lacks a volume header")
        };
        self.zap_block(&key.to_bytes(),VOL_KEY_BLOCK as usize)?;
        trace!("formatting: free all, then take the system blocks");
        for b in 0..self.blocks {
            self.deallocate_block(b)?;
        }
        for b in [0,1,VOL_KEY_BLOCK as usize] {
            self.allocate_block(b)?;
        }
        for b in first_bitmap..first_bitmap+self.bitmap_block_count() {
            self.allocate_block(b)?;
        }
        trace!("formatting: volume directory chain");
        for b in VOL_KEY_BLOCK+1..VOL_KEY_BLOCK+4 {
            let next = match b {
                x if x==VOL_KEY_BLOCK+3 => 0,
                x => x+1
            };
            self.write_block(&DirBlock::entry_block(b-1,next).to_bytes(),b as usize)?;
        }
        Ok(())
    }
    fn get_vol_header(&mut self) -> Result<VolHeader,DYNERR> {
        let buf = self.read_block(VOL_KEY_BLOCK as usize)?;
        Ok(VolHeader::from_bytes(&buf[4..4+0x27])?)
    }
    fn get_dir(&mut self,iblock: usize) -> Result<DirBlock,DYNERR> {
        let buf = self.read_block(iblock)?;
        Ok(DirBlock::from_bytes(&buf,iblock==VOL_KEY_BLOCK as usize)?)
    }
    fn put_dir(&mut self,dir: &DirBlock,iblock: usize) -> STDRESULT {
        self.write_block(&dir.to_bytes(),iblock)
    }
    /// Walk the back links to the key block, returning its pointer and contents
    fn get_key_dir(&mut self,ptr: u16) -> Result<(u16,DirBlock),DYNERR> {
        let mut curr = ptr;
        for _try in 0..MAX_DIR_BLOCKS {
            let dir = self.get_dir(curr as usize)?;
            if dir.prev==0 {
                return Ok((curr,dir));
            }
            curr = dir.prev;
        }
        error!("directory block count not plausible, aborting");
        Err(Box::new(Error::EndOfData))
    }
    fn read_entry(&mut self,loc: &EntryLocation) -> Result<Entry,DYNERR> {
        Ok(self.get_dir(loc.block as usize)?.entry(loc))
    }
    /// Write one entry back to disk.  Unsaved changes elsewhere in the
    /// same block are lost.
    fn write_entry(&mut self,loc: &EntryLocation,entry: &Entry) -> STDRESULT {
        let mut dir = self.get_dir(loc.block as usize)?;
        dir.put_entry(loc,*entry);
        self.put_dir(&dir,loc.block as usize)
    }
    /// Grow the subdirectory whose entry is at `parent_loc` by one entry
    /// block, returning the location of the new block's first entry.
    fn expand_directory(&mut self,parent_loc: &EntryLocation) -> Result<EntryLocation,DYNERR> {
        let mut entry = self.read_entry(parent_loc)?;
        if entry.storage()!=StorageType::SubDirEntry {
            return Err(Box::new(Error::FileTypeMismatch));
        }
        let mut curr = entry.key_ptr();
        for _try in 0..MAX_DIR_BLOCKS {
            let mut dir = self.get_dir(curr as usize)?;
            if dir.next==0 {
                let avail = match self.get_available_block()? {
                    Some(b) => b,
                    None => return Err(Box::new(Error::DiskFull))
                };
                entry.set_eof(entry.eof()+BLOCK_SIZE);
                entry.add_blocks(1);
                self.write_entry(parent_loc,&entry)?;
                dir.next = avail;
                self.put_dir(&dir,curr as usize)?;
                self.put_dir(&DirBlock::entry_block(curr,0),avail as usize)?;
                return Ok(EntryLocation { block: avail, idx: 1 });
            }
            curr = dir.next;
        }
        error!("directory block count not plausible, aborting");
        Err(Box::new(Error::EndOfData))
    }
    /// Next inactive entry slot in the directory with the given key block,
    /// expanding the directory if it is full and expandable.
    fn get_available_entry(&mut self,key_block: u16) -> Result<EntryLocation,DYNERR> {
        let mut curr = key_block;
        for _try in 0..MAX_DIR_BLOCKS {
            let dir = self.get_dir(curr as usize)?;
            for loc in dir.entry_locations(curr) {
                if !dir.entry(&loc).is_active() {
                    return Ok(loc);
                }
            }
            curr = dir.next;
            if curr==0 {
                let key = self.get_dir(key_block as usize)?;
                return match key.parent_entry_loc() {
                    Some(parent_loc) => self.expand_directory(&parent_loc),
                    // the volume directory has fixed capacity
                    None => Err(Box::new(Error::DirectoryFull))
                };
            }
        }
        error!("directory block count not plausible, aborting");
        Err(Box::new(Error::EndOfData))
    }
    /// Find a named entry in the directory with the given key block
    fn search_entries(&mut self,kinds: &[StorageType],name: &str,key_block: u16) -> Result<Option<EntryLocation>,DYNERR> {
        if !is_name_valid(name) {
            error!("invalid ProDOS name {}",name);
            return Err(Box::new(Error::Syntax));
        }
        let mut curr = key_block;
        for _try in 0..MAX_DIR_BLOCKS {
            let dir = self.get_dir(curr as usize)?;
            for loc in dir.entry_locations(curr) {
                if dir.entry(&loc).matches(kinds,name) {
                    return Ok(Some(loc));
                }
            }
            curr = dir.next;
            if curr==0 {
                return Ok(None);
            }
        }
        error!("directory block count not plausible, aborting");
        Err(Box::new(Error::EndOfData))
    }
    /// Put path as [volume,subdir,subdir,...,last] where last could be an empty string,
    /// which indicates this is a directory.  If last is not empty, it could be either directory or file.
    /// Also check that the path is not too long accounting for prefix rules.
    fn normalize_path(&mut self,vol_name: &str,path: &str) -> Result<Vec<String>,DYNERR> {
        let mut nodes: Vec<String> = path.split('/').map(|s| s.to_uppercase()).collect();
        match path.starts_with('/') {
            true => { nodes.remove(0); },
            false => nodes.insert(0,vol_name.to_uppercase())
        }
        // ProDOS allows 64 characters of prefix plus 64 of relative path
        let mut prefix_len = 0;
        let mut rel_len = 0;
        for s in nodes.iter() {
            if rel_len==0 && prefix_len + 1 + s.len() <= 64 {
                prefix_len += 1 + s.len();
            } else {
                rel_len += 1 + s.len();
            }
        }
        if rel_len > 64 {
            error!("ProDOS path too long, prefix {}, relative {}",prefix_len,rel_len);
            return Err(Box::new(Error::Range));
        }
        Ok(nodes)
    }
    /// split the path into the last node (file or directory) and its parent path
    fn split_path(&mut self,vol_name: &str,path: &str) -> Result<[String;2],DYNERR> {
        let mut nodes = self.normalize_path(vol_name,path)?;
        if nodes.last().map(|s| s.len())==Some(0) {
            nodes.pop();
        }
        if nodes.len()<2 {
            return Err(Box::new(Error::PathNotFound));
        }
        let name = nodes.pop().expect("nodes cannot be empty here");
        let parent: String = nodes.iter().map(|s| "/".to_string() + s).collect();
        Ok([parent,name])
    }
    /// Walk the tree from the volume directory to the entry the path names
    fn search_volume(&mut self,kinds: &[StorageType],path: &str) -> Result<EntryLocation,DYNERR> {
        let vhdr = self.get_vol_header()?;
        let nodes = self.normalize_path(&vhdr.name(),path)?;
        if nodes[0]!=vhdr.name().to_uppercase() {
            return Err(Box::new(Error::PathNotFound));
        }
        let n = nodes.len();
        // the volume itself has no entry
        if n<3 && nodes[n-1]=="" {
            return Err(Box::new(Error::PathNotFound));
        }
        let mut curr: u16 = VOL_KEY_BLOCK;
        for level in 1..n {
            let kinds_here: &[StorageType] = match level==n-1 {
                true => kinds,
                false => &[StorageType::SubDirEntry]
            };
            let loc = match self.search_entries(kinds_here,&nodes[level],curr)? {
                Some(loc) => loc,
                None => return Err(Box::new(Error::PathNotFound))
            };
            // done if this is the terminus, or the last subdir of a directory request
            if level==n-1 || level==n-2 && nodes[n-1]=="" && kinds.contains(&StorageType::SubDirEntry) {
                return Ok(loc);
            }
            curr = self.read_entry(&loc)?.key_ptr();
        }
        Err(Box::new(Error::PathNotFound))
    }
    fn find_file(&mut self,path: &str) -> Result<EntryLocation,DYNERR> {
        self.search_volume(&FILE_KINDS,path)
    }
    /// Find the directory and return the key block pointer
    fn find_dir_key_block(&mut self,path: &str) -> Result<u16,DYNERR> {
        let vhdr = self.get_vol_header()?;
        let vpath = "/".to_string() + &vhdr.name().to_lowercase();
        if path=="/" || path=="" || path.to_lowercase().trim_end_matches('/')==vpath {
            return Ok(VOL_KEY_BLOCK);
        }
        let loc = self.search_volume(&[StorageType::SubDirEntry],path)?;
        Ok(self.read_entry(&loc)?.key_ptr())
    }
    /// Index block pointers of the file, in order, zeros for absent groups.
    /// A seedling yields an empty list.
    fn index_ptrs(&mut self,entry: &Entry) -> Result<Vec<u16>,DYNERR> {
        match entry.storage() {
            StorageType::Seedling => Ok(Vec::new()),
            StorageType::Sapling => Ok(vec![entry.key_ptr()]),
            StorageType::Tree => {
                let master = self.read_block(entry.key_ptr() as usize)?;
                Ok((0..256).map(|slot| get_index_ptr(&master,slot)).collect())
            },
            _ => {
                error!("entry storage type is not a file");
                Err(Box::new(Error::FileTypeMismatch))
            }
        }
    }
    /// Read any file into the sparse file format.  Use `FileImage::sequence`
    /// to flatten the result when it is expected to be sequential.
    fn read_file(&mut self,entry: &Entry) -> Result<super::FileImage,DYNERR> {
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        entry.stamp_fimg(&mut fimg);
        if entry.storage()==StorageType::Seedling {
            let buf = self.read_block(entry.key_ptr() as usize)?;
            fimg.chunks.insert(0,buf);
            return Ok(fimg);
        }
        let mut count = 0;
        for index_ptr in self.index_ptrs(entry)? {
            if index_ptr==0 {
                count += 256;
                continue;
            }
            let index = self.read_block(index_ptr as usize)?;
            for slot in 0..256 {
                let ptr = get_index_ptr(&index,slot);
                if ptr>0 {
                    fimg.chunks.insert(count,self.read_block(ptr as usize)?);
                }
                count += 1;
            }
        }
        Ok(fimg)
    }
    /// Free an index block and every data block it references
    fn deallocate_index_block(&mut self,index_ptr: u16) -> STDRESULT {
        let index = self.read_block(index_ptr as usize)?;
        for slot in 0..256 {
            let ptr = get_index_ptr(&index,slot);
            if ptr>0 {
                self.deallocate_block(ptr as usize)?;
            }
        }
        // ProDOS swaps the index block halves upon deletion
        let swapped = [index[256..512].to_vec(),index[0..256].to_vec()].concat();
        self.write_block(&swapped,index_ptr as usize)?;
        self.deallocate_block(index_ptr as usize)
    }
    /// Free every block belonging to the entry
    fn deallocate_file_blocks(&mut self,entry: &Entry) -> STDRESULT {
        let key = entry.key_ptr();
        match entry.storage() {
            StorageType::Seedling => self.deallocate_block(key as usize),
            StorageType::Sapling => self.deallocate_index_block(key),
            StorageType::Tree => {
                let master = self.read_block(key as usize)?;
                for slot in 0..256 {
                    let ptr = get_index_ptr(&master,slot);
                    if ptr>0 {
                        self.deallocate_index_block(ptr)?;
                    }
                }
                let swapped = [master[256..512].to_vec(),master[0..256].to_vec()].concat();
                self.write_block(&swapped,key as usize)?;
                self.deallocate_block(key as usize)
            },
            _ => {
                error!("entry storage type is not a file");
                Err(Box::new(Error::FileTypeMismatch))
            }
        }
    }
    /// Verify that the new name does not already exist
    fn ok_to_rename(&mut self,path: &str,new_name: &str) -> STDRESULT {
        if !is_name_valid(new_name) {
            error!("invalid ProDOS name {}",new_name);
            return Err(Box::new(Error::Syntax));
        }
        let vhdr = self.get_vol_header()?;
        let [parent_path,_old_name] = self.split_path(&vhdr.name(),path)?;
        if let Ok(key_block) = self.find_dir_key_block(&parent_path) {
            if self.search_entries(&ANY_KIND,new_name,key_block)?.is_some() {
                return Err(Box::new(Error::DuplicateFilename));
            }
        }
        Ok(())
    }
    /// Prepare a directory for a new file or subdirectory, returning
    /// (name, parent key block, entry location, first available block).
    /// The disk is modified only if the directory needs to grow.
    fn prepare_to_write(&mut self,path: &str) -> Result<(String,u16,EntryLocation,u16),DYNERR> {
        let vhdr = self.get_vol_header()?;
        let [parent_path,name] = self.split_path(&vhdr.name(),path)?;
        if !is_name_valid(&name) {
            error!("invalid ProDOS name {}",&name);
            return Err(Box::new(Error::Syntax));
        }
        let key_block = match self.find_dir_key_block(&parent_path) {
            Ok(b) => b,
            Err(_) => return Err(Box::new(Error::PathNotFound))
        };
        if self.search_entries(&ANY_KIND,&name,key_block)?.is_some() {
            return Err(Box::new(Error::DuplicateFilename));
        }
        let loc = self.get_available_entry(key_block)?;
        match self.get_available_block()? {
            Some(new_block) => Ok((name,key_block,loc,new_block)),
            None => Err(Box::new(Error::DiskFull))
        }
    }
    /// Write any sparse or sequential file.  Use `FileImage::desequence` to
    /// put sequential data into the file image format.
    /// The entry must already exist and point at the first available block;
    /// chunk 0 must be present so that pointer stays valid.
    fn write_file(&mut self,loc: EntryLocation,fimg: &super::FileImage) -> Result<usize,DYNERR> {
        let live = fimg.ordered_indices();
        if live.len()==0 {
            error!("empty data is not allowed for ProDOS file images");
            return Err(Box::new(Error::EndOfData));
        }
        let end = fimg.end();
        if end > 128*256 {
            // past the range of a tree file's master index
            return Err(Box::new(Error::DiskFull));
        }
        // group = run of up to 256 chunks covered by one index block
        let live_groups: Vec<usize> = {
            let mut g: Vec<usize> = live.iter().map(|idx| idx/256).collect();
            g.dedup();
            g
        };
        let need = live.len() + match end {
            1 => 0,
            e if e<=256 => 1,
            _ => 1 + live_groups.len()
        };
        if need > self.num_free_blocks()? {
            return Err(Box::new(Error::DiskFull));
        }
        // write the data blocks, recording pointers with zeros at the holes
        let mut ptrs: Vec<u16> = vec![0;end];
        for idx in &live {
            let ptr = self.take_available_block()?;
            self.write_block(&fimg.chunks[idx],ptr as usize)?;
            ptrs[*idx] = ptr;
        }
        // index blocks above the data, master above the indices
        let mut entry = self.get_dir(loc.block as usize)?.entry(&loc);
        if end==1 {
            entry.set_key_ptr(ptrs[0]);
        } else {
            let mut group_index_ptrs: Vec<u16> = vec![0;1+(end-1)/256];
            for group in &live_groups {
                let mut index_buf = vec![0;BLOCK_SIZE];
                for slot in 0..256 {
                    match ptrs.get(group*256+slot) {
                        Some(ptr) => put_index_ptr(&mut index_buf,*ptr,slot),
                        None => break
                    }
                }
                let index_ptr = self.take_available_block()?;
                self.write_block(&index_buf,index_ptr as usize)?;
                group_index_ptrs[*group] = index_ptr;
            }
            if end<=256 {
                entry.set_storage(StorageType::Sapling);
                entry.set_key_ptr(group_index_ptrs[0]);
            } else {
                let mut master_buf = vec![0;BLOCK_SIZE];
                for (group,index_ptr) in group_index_ptrs.iter().enumerate() {
                    put_index_ptr(&mut master_buf,*index_ptr,group);
                }
                let master_ptr = self.take_available_block()?;
                self.write_block(&master_buf,master_ptr as usize)?;
                entry.set_storage(StorageType::Tree);
                entry.set_key_ptr(master_ptr);
            }
        }
        entry.add_blocks(need as i32);
        let eof = match fimg.get_eof() {
            0 => (end-1)*BLOCK_SIZE + fimg.chunks[live.last().expect("live cannot be empty")].len(),
            e => e
        };
        entry.set_eof(eof);
        entry.set_all_access(fimg.access[0]);
        self.write_entry(&loc,&entry)?;
        Ok(eof)
    }
    /// modify a file entry, optionally lock, unlock, rename, retype; attempt to change already locked file will fail.
    fn modify(&mut self,loc: &EntryLocation,maybe_lock: Option<bool>,maybe_new_name: Option<&str>,
        maybe_new_type: Option<&str>,maybe_new_aux: Option<u16>) -> STDRESULT {
        let mut entry = self.read_entry(loc)?;
        if maybe_new_name.is_some() && !entry.get_access(Access::Rename) {
            return Err(Box::new(Error::WriteProtected));
        }
        if let Some(lock) = maybe_lock {
            entry.set_access(Access::Destroy,!lock);
            entry.set_access(Access::Rename,!lock);
            entry.set_access(Access::Write,!lock);
            if !lock {
                entry.set_access(Access::Read,true);
            }
        }
        if let Some(new_name) = maybe_new_name {
            entry.rename(new_name);
        }
        if let Some(new_type) = maybe_new_type {
            let typ = FileType::from_str(new_type)?;
            entry.set_ftype(typ as u8);
        }
        if let Some(new_aux) = maybe_new_aux {
            entry.set_aux(new_aux);
        }
        self.write_entry(loc,&entry)
    }
}

impl super::DiskFS for Disk {
    fn new_fimg(&self,chunk_len: usize) -> super::FileImage {
        Disk::new_fimg(chunk_len)
    }
    fn fs_name(&self) -> String {
        FS_NAME.to_string()
    }
    fn catalog(&mut self, path: &str) -> Result<Vec<FileInfo>,DYNERR> {
        let mut ans = Vec::new();
        let mut curr = self.find_dir_key_block(path)?;
        while curr>0 {
            let dir = self.get_dir(curr as usize)?;
            for loc in dir.entry_locations(curr) {
                let entry = dir.entry(&loc);
                if entry.is_active() {
                    ans.push(FileInfo {
                        name: entry.name(),
                        typ: entry.type_string(),
                        locked: !entry.get_access(Access::Write),
                        blocks: entry.blocks() as usize,
                        eof: entry.eof(),
                        aux: entry.aux(),
                        is_dir: entry.storage()==StorageType::SubDirEntry
                    });
                }
            }
            curr = dir.next;
        }
        Ok(ans)
    }
    fn create(&mut self,path: &str) -> STDRESULT {
        let (name,key_block,loc,new_block) = self.prepare_to_write(path)?;
        // count the new directory in its parent key block
        let mut dir = self.get_dir(key_block as usize)?;
        dir.bump_file_count(1);
        self.put_dir(&dir,key_block as usize)?;
        // entry goes in the parent, which may not be the key block
        let mut entry = Entry::new_subdir(&name,new_block,key_block,None);
        entry.add_blocks(1);
        entry.set_eof(BLOCK_SIZE);
        self.write_entry(&loc,&entry)?;
        // the new directory's own key block
        let subdir = DirBlock::subdir_key(&name,&loc,None);
        self.put_dir(&subdir,new_block as usize)
    }
    fn delete(&mut self,path: &str) -> STDRESULT {
        if let Ok(loc) = self.find_file(path) {
            let entry = self.read_entry(&loc)?;
            if !entry.get_access(Access::Destroy) {
                return Err(Box::new(Error::WriteProtected));
            }
            self.deallocate_file_blocks(&entry)?;
            let mut dir = self.get_dir(loc.block as usize)?;
            dir.erase_entry(&loc);
            self.put_dir(&dir,loc.block as usize)?;
            let (key_ptr,mut key_dir) = self.get_key_dir(loc.block)?;
            key_dir.bump_file_count(-1);
            return self.put_dir(&key_dir,key_ptr as usize);
        }
        if let Ok(ptr) = self.find_dir_key_block(path) {
            let mut dir = self.get_dir(ptr as usize)?;
            let parent_loc = match dir.parent_entry_loc() {
                Some(loc) => loc,
                // never delete the volume directory
                None => return Err(Box::new(Error::WriteProtected))
            };
            if dir.file_count()>0 {
                return Err(Box::new(Error::WriteProtected));
            }
            dir.erase_header();
            self.put_dir(&dir,ptr as usize)?;
            let mut next = ptr;
            for _try in 0..MAX_DIR_BLOCKS {
                self.deallocate_block(next as usize)?;
                next = dir.next;
                if next==0 {
                    let mut parent_dir = self.get_dir(parent_loc.block as usize)?;
                    parent_dir.erase_entry(&parent_loc);
                    self.put_dir(&parent_dir,parent_loc.block as usize)?;
                    let (key_ptr,mut key_dir) = self.get_key_dir(parent_loc.block)?;
                    key_dir.bump_file_count(-1);
                    return self.put_dir(&key_dir,key_ptr as usize);
                }
                dir = self.get_dir(next as usize)?;
            }
            error!("directory block count not plausible, aborting");
            return Err(Box::new(Error::EndOfData));
        }
        Err(Box::new(Error::PathNotFound))
    }
    fn lock(&mut self,path: &str) -> STDRESULT {
        let loc = self.find_file(path)?;
        self.modify(&loc,Some(true),None,None,None)
    }
    fn unlock(&mut self,path: &str) -> STDRESULT {
        let loc = self.find_file(path)?;
        self.modify(&loc,Some(false),None,None,None)
    }
    fn rename(&mut self,path: &str,name: &str) -> STDRESULT {
        self.ok_to_rename(path,name)?;
        if let Ok(loc) = self.find_file(path) {
            return self.modify(&loc,None,Some(name),None,None);
        }
        if let Ok(ptr) = self.find_dir_key_block(path) {
            if let Some(parent_loc) = self.get_dir(ptr as usize)?.parent_entry_loc() {
                return self.modify(&parent_loc,None,Some(name),None,None);
            }
        }
        Err(Box::new(Error::PathNotFound))
    }
    fn retype(&mut self,path: &str,new_type: &str,sub_type: &str) -> STDRESULT {
        let aux = u16::from_str(sub_type)?;
        let loc = self.find_file(path)?;
        self.modify(&loc,None,None,Some(new_type),Some(aux))
    }
    fn bload(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(path,true)
    }
    fn bsave(&mut self,path: &str, dat: &[u8],start_addr: u16,trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let padded = match trailing {
            Some(v) => [dat,v].concat(),
            None => dat.to_vec()
        };
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        fimg.desequence(&padded);
        fimg.fs_type = vec![FileType::Binary as u8];
        fimg.access = vec![STD_ACCESS | DIDCHANGE];
        fimg.aux = u16::to_le_bytes(start_addr).to_vec();
        self.write_any(path,&fimg)
    }
    fn load(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(path,true)
    }
    fn save(&mut self,path: &str, dat: &[u8], typ: ItemType, _trailing: Option<&[u8]>) -> Result<usize,DYNERR> {
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        fimg.desequence(dat);
        fimg.access = vec![STD_ACCESS | DIDCHANGE];
        match typ {
            ItemType::ApplesoftTokens => {
                fimg.fs_type = vec![FileType::ApplesoftCode as u8];
                fimg.aux = u16::to_le_bytes(APPLESOFT_ADDR).to_vec();
                debug!("Applesoft metadata {:?}, {:?}",fimg.fs_type,fimg.aux);
            },
            ItemType::IntegerTokens => {
                fimg.fs_type = vec![FileType::IntegerCode as u8];
            }
            _ => return Err(Box::new(Error::FileTypeMismatch))
        }
        self.write_any(path,&fimg)
    }
    fn read_raw(&mut self,path: &str,trunc: bool) -> Result<(u16,Vec<u8>),DYNERR> {
        let loc = self.find_file(path)?;
        let entry = self.read_entry(&loc)?;
        let fimg = self.read_file(&entry)?;
        match trunc {
            true => Ok((entry.aux(),fimg.sequence_limited(fimg.get_eof()))),
            false => Ok((entry.aux(),fimg.sequence()))
        }
    }
    fn write_raw(&mut self,path: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let mut fimg = Disk::new_fimg(BLOCK_SIZE);
        fimg.desequence(dat);
        fimg.fs_type = vec![FileType::Text as u8];
        fimg.access = vec![STD_ACCESS | DIDCHANGE];
        self.write_any(path,&fimg)
    }
    fn read_text(&mut self,path: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        self.read_raw(path,true)
    }
    fn write_text(&mut self,path: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        self.write_raw(path,dat)
    }
    fn read_block(&mut self,num: &str) -> Result<(u16,Vec<u8>),DYNERR> {
        let block = usize::from_str(num)?;
        if block>=self.blocks {
            return Err(Box::new(Error::Range));
        }
        Ok((0,self.read_block(block)?))
    }
    fn write_block(&mut self, num: &str, dat: &[u8]) -> Result<usize,DYNERR> {
        let block = usize::from_str(num)?;
        if dat.len() > BLOCK_SIZE || block>=self.blocks {
            return Err(Box::new(Error::Range));
        }
        self.zap_block(dat,block)?;
        Ok(dat.len())
    }
    fn read_any(&mut self,path: &str) -> Result<super::FileImage,DYNERR> {
        let loc = self.find_file(path)?;
        let entry = self.read_entry(&loc)?;
        self.read_file(&entry)
    }
    fn write_any(&mut self,path: &str,fimg: &super::FileImage) -> Result<usize,DYNERR> {
        if fimg.file_system!=FS_NAME {
            error!("cannot write {} file image to prodos",fimg.file_system);
            return Err(Box::new(Error::IOError));
        }
        if fimg.chunk_len!=BLOCK_SIZE {
            error!("chunk length {} is incompatible with ProDOS",fimg.chunk_len);
            return Err(Box::new(Error::Range));
        }
        let (name,dir_key_block,loc,new_key_block) = self.prepare_to_write(path)?;
        // count the file in the parent key block
        let mut dir = self.get_dir(dir_key_block as usize)?;
        dir.bump_file_count(1);
        self.put_dir(&dir,dir_key_block as usize)?;
        let entry = Entry::new_file(&name,fimg,new_key_block,dir_key_block,None)?;
        self.write_entry(&loc,&entry)?;
        self.write_file(loc,fimg)
    }
    fn decode_text(&self,dat: &[u8]) -> Result<String,DYNERR> {
        let file = types::SequentialText::from_bytes(dat)?;
        Ok(file.to_string())
    }
    fn encode_text(&self,s: &str) -> Result<Vec<u8>,DYNERR> {
        match types::SequentialText::from_str(s) {
            Ok(txt) => Ok(txt.to_bytes()),
            Err(_) => {
                error!("cannot encode, perhaps use raw type");
                Err(Box::new(Error::FileTypeMismatch))
            }
        }
    }
    fn free_units(&mut self) -> Result<usize,DYNERR> {
        self.num_free_blocks()
    }
    fn total_units(&mut self) -> Result<usize,DYNERR> {
        Ok(self.blocks)
    }
    fn usage_map(&mut self) -> Result<Vec<bool>,DYNERR> {
        let mut ans = Vec::new();
        for i in 0..self.blocks {
            ans.push(self.is_block_free(i)?);
        }
        Ok(ans)
    }
    fn suggest_name(&self,host_name: &str) -> String {
        let mut ans = String::new();
        for c in super::host_stem(host_name).to_uppercase().chars() {
            if ans.len()>=15 {
                break;
            }
            match c {
                'A'..='Z' => ans.push(c),
                '0'..='9' | '.' if ans.len()>0 => ans.push(c),
                ' ' | '_' | '-' if ans.len()>0 => ans.push('.'),
                _ => {}
            }
        }
        ans
    }
    fn suggest_type(&self,host_name: &str) -> String {
        match super::host_extension(host_name).as_deref() {
            Some("txt") | Some("text") => "txt".to_string(),
            Some("bas") => "atok".to_string(),
            Some("int") => "itok".to_string(),
            Some("sys") => "sys".to_string(),
            Some("rel") => "rel".to_string(),
            _ => "bin".to_string()
        }
    }
    fn can_create_directories(&self) -> bool {
        true
    }
    fn get_img(&mut self) -> &mut Box<dyn img::DiskImage> {
        self.flush_bitmap().expect("could not write back bitmap");
        &mut self.img
    }
}

#[test]
fn test_path_normalize() {
    let img = Box::new(crate::img::dsk_po::PO::create(280));
    let mut disk = Disk::from_img(img);
    disk.format("NEW.DISK",None).expect("disk error");
    match disk.normalize_path("NEW.DISK","DIR1") {
        Ok(res) => assert_eq!(res,["NEW.DISK","DIR1"]),
        Err(e) => panic!("{}",e)
    }
    match disk.normalize_path("NEW.DISK","dir1/") {
        Ok(res) => assert_eq!(res,["NEW.DISK","DIR1",""]),
        Err(e) => panic!("{}",e)
    }
    match disk.normalize_path("NEW.DISK","dir1/sub2") {
        Ok(res) => assert_eq!(res,["NEW.DISK","DIR1","SUB2"]),
        Err(e) => panic!("{}",e)
    }
    match disk.normalize_path("NEW.DISK","/new.disk/dir1/sub2") {
        Ok(res) => assert_eq!(res,["NEW.DISK","DIR1","SUB2"]),
        Err(e) => panic!("{}",e)
    }
    match disk.normalize_path("NEW.DISK","abcdefghijklmno/abcdefghijklmno/abcdefghijklmno/abcdefghijklmno/abcdefghijklmno/abcdefghijklmno/abcdefghijklmno/abcdefghijklmno") {
        Ok(_res) => panic!("normalize_path should have failed with path too long"),
        Err(e) => assert_eq!(e.to_string(),"RANGE ERROR")
    }
}
