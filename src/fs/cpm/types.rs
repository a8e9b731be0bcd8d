use std::str::FromStr;
use std::fmt;
use a2kit_macro::{DiskStructError,DiskStruct};
use super::super::TextEncoder;

/// Status byte for a deleted file, also fill value for unused blocks.
pub const DELETED: u8 = 0xe5;
/// Largest possible user number plus one
pub const USER_END: u8 = 0x10;
/// Unit of data transfer in bytes as seen by the BDOS.
/// This was the sector size on the original 8 inch disks.
pub const RECORD_SIZE: usize = 128;
/// Bytes in a directory slot
pub const DIR_ENTRY_SIZE: usize = 32;
/// Maximum number of logical extents in a CP/M v2 file
pub const MAX_LOGICAL_EXTENTS: usize = 512;
/// The fixed size of a "logical extent," see the EXM field in the
/// disk parameter block.
pub const LOGICAL_EXTENT_SIZE: usize = 16384;
/// Characters forbidden from file names
pub const INVALID_CHARS: &str = " <>.,;:=?*[]";

/// CP/M errors, `Display` gives the long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("bad disk format")]
    BadSector,
    #[error("bad data format")]
    BadFormat,
    #[error("file is read only")]
    FileReadOnly,
    #[error("disk is read only")]
    DiskReadOnly,
    #[error("drive not found")]
    Select,
    #[error("directory full")]
    DirectoryFull,
    #[error("disk full")]
    DiskFull,
    #[error("cannot read")]
    ReadError,
    #[error("cannot write")]
    WriteError,
    #[error("file exists")]
    FileExists,
    #[error("file not found")]
    FileNotFound
}

/// Transforms between UTF8 and CP/M text.
/// CP/M text is positive ASCII with CRLF line separators and a 0x1A
/// terminator.  Encoding refuses non-ASCII; decoding nulls it out.
pub struct Encoder {
    line_terminator: Vec<u8>
}

impl TextEncoder for Encoder {
    fn new(line_terminator: Vec<u8>) -> Self {
        Self {
            line_terminator
        }
    }
    fn encode(&self,txt: &str) -> Option<Vec<u8>> {
        let norm = txt.replace("\r\n","\n");
        let mut ans: Vec<u8> = Vec::new();
        for b in norm.bytes() {
            match b {
                0x0a | 0x0d => ans.extend_from_slice(&[0x0d,0x0a]),
                b if b < 128 => ans.push(b),
                _ => return None
            }
        }
        if !Self::is_terminated(&ans,&self.line_terminator) {
            ans.extend_from_slice(&self.line_terminator);
        }
        Some(ans)
    }
    fn decode(&self,src: &[u8]) -> Option<String> {
        let mut ans = String::new();
        for b in src {
            match *b {
                0x1a => break,
                0x0d => {},
                b if b > 127 => ans.push('\0'),
                b => ans.push(b as char)
            }
        }
        Some(ans)
    }
}

/// Structured representation of sequential text files on disk.
/// CP/M pads with 0x1a to the next record boundary.
pub struct SequentialText {
    pub text: Vec<u8>
}

/// Allows the structure to be created from string slices using `from_str`.
/// This replaces LF/CR with CRLF. Negative ASCII is an error.
impl FromStr for SequentialText {
    type Err = std::fmt::Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        let encoder = Encoder::new(vec![]);
        match encoder.encode(s) {
            Some(text) => Ok(Self { text }),
            None => Err(std::fmt::Error)
        }
    }
}

/// Allows the text to be displayed to the console using `println!`.  This also
/// derives `to_string`, so the structure can be converted to `String`.
/// This disposes of CR, nulls negative ASCII, and stops at 0x1a.
impl fmt::Display for SequentialText {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoder = Encoder::new(vec![]);
        match encoder.decode(&self.text) {
            Some(ans) => write!(f,"{}",ans),
            None => write!(f,"err")
        }
    }
}

impl DiskStruct for SequentialText {
    fn new() -> Self {
        Self {
            text: Vec::new()
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        Ok(Self {
            text: match dat.split(|b| *b==0x1a).next() {
                Some(t) => t.to_vec(),
                _ => dat.to_vec()
            }
        })
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans = self.text.clone();
        ans.push(0x1a);
        let tail = ans.len() % RECORD_SIZE;
        if tail > 0 {
            ans.resize(ans.len() + RECORD_SIZE - tail,0x1a);
        }
        ans
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        let temp = SequentialText::from_bytes(dat)?;
        self.text = temp.text;
        Ok(())
    }
    fn len(&self) -> usize {
        let unpadded = self.text.len() + 1;
        match unpadded % RECORD_SIZE {
            0 => unpadded,
            tail => unpadded + RECORD_SIZE - tail
        }
    }
}
