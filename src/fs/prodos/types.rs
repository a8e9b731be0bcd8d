use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::str::FromStr;
use std::fmt;
use a2kit_macro::{DiskStructError,DiskStruct};
use super::super::TextEncoder;

pub const FS_NAME: &str = "prodos";
pub const BLOCK_SIZE: usize = 512;
pub const VOL_KEY_BLOCK: u16 = 2;
pub const STD_ACCESS: u8 = 1+2+32+64+128;
/// backup bit, set whenever a file is created or changed
pub const DIDCHANGE: u8 = 0x20;

/// ProDOS errors, `Display` gives the message the OS printed, e.g. `DISK FULL`.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("RANGE ERROR")]
    Range = 2,
    #[error("NO DEVICE CONNECTED")]
    NoDeviceConnected = 3,
    #[error("WRITE PROTECTED")]
    WriteProtected = 4,
    #[error("END OF DATA")]
    EndOfData = 5,
    #[error("PATH NOT FOUND")]
    PathNotFound = 6,
    #[error("I/O ERROR")]
    IOError = 8,
    #[error("DISK FULL")]
    DiskFull = 9,
    #[error("FILE LOCKED")]
    FileLocked = 10,
    #[error("INVALID OPTION")]
    InvalidOption = 11,
    #[error("NO BUFFERS AVAILABLE")]
    NoBuffersAvailable = 12,
    #[error("FILE TYPE MISMATCH")]
    FileTypeMismatch = 13,
    #[error("PROGRAM TOO LARGE")]
    ProgramTooLarge = 14,
    #[error("NOT DIRECT COMMAND")]
    NotDirectCommand = 15,
    #[error("SYNTAX ERROR")]
    Syntax = 16,
    #[error("DIRECTORY FULL")]
    DirectoryFull = 17,
    #[error("FILE NOT OPEN")]
    FileNotOpen = 18,
    #[error("DUPLICATE FILENAME")]
    DuplicateFilename = 19,
    #[error("FILE BUSY")]
    FileBusy = 20,
    #[error("FILE(S) STILL OPEN")]
    FilesStillOpen = 21
}

/// Map file type codes to strings for display
pub const TYPE_MAP_DISP: [(u8,&str);39] = [
    (0x00, "???"),
    (0x01, "BAD"),
    (0x02, "PCD"), // Pascal code
    (0x03, "PTX"), // Pascal text
    (0x04, "TXT"),
    (0x05, "PDA"), // Pascal data
    (0x06, "BIN"),
    (0x07, "FON"), // SOS
    (0x08, "FOT"), // Photo
    (0x09, "BAS"), // SOS
    (0x0a, "DAT"), // SOS
    (0x0b, "WRD"), // SOS
    (0x0c, "SYS"), // SOS
    (0x0f, "DIR"),
    (0x10, "RPD"), // SOS
    (0x11, "RPX"), // SOS
    (0x12, "AFD"), // SOS
    (0x13, "AFM"), // SOS
    (0x14, "AFR"), // SOS
    (0x15, "SLB"), // SOS
    (0x19, "AWD"), // AppleWorks Data Base
    (0x1a, "AWW"), // AppleWorks Word Processor
    (0x1b, "AWS"), // AppleWorks Spreadsheet
    (0xef, "PSA"), // Pascal area
    (0xf0, "CMD"),
    (0xf1, "USR"),
    (0xf2, "USR"),
    (0xf3, "USR"),
    (0xf4, "USR"),
    (0xf5, "USR"),
    (0xf6, "USR"),
    (0xf7, "USR"),
    (0xf8, "USR"),
    (0xfa, "INT"),
    (0xfb, "IVR"),
    (0xfc, "BAS"),
    (0xfd, "VAR"),
    (0xfe, "REL"),
    (0xff, "SYS")
];

/// The subset of ProDOS file types we can do something with.
/// Conversions: `as u8` going out, `FileType::from_u8` coming in,
/// `from_str` accepts a number or mnemonic.
#[derive(FromPrimitive)]
pub enum FileType {
    None = 0x00,
    Text = 0x04,
    Binary = 0x06,
    Directory = 0x0f,
    IntegerCode = 0xfa,
    IntegerVars = 0xfb,
    ApplesoftCode = 0xfc,
    ApplesoftVars = 0xfd,
    RelocatableCode = 0xfe,
    System = 0xff
}

impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "bin" => return Ok(Self::Binary),
            "txt" => return Ok(Self::Text),
            "atok" => return Ok(Self::ApplesoftCode),
            "itok" => return Ok(Self::IntegerCode),
            "avar" => return Ok(Self::ApplesoftVars),
            "ivar" => return Ok(Self::IntegerVars),
            "rel" => return Ok(Self::RelocatableCode),
            "sys" => return Ok(Self::System),
            _ => {}
        }
        match u8::from_str(s) {
            Ok(num) => FileType::from_u8(num).ok_or(Error::FileTypeMismatch),
            Err(_) => Err(Error::FileTypeMismatch)
        }
    }
}

#[derive(Clone,Copy,FromPrimitive,PartialEq)]
pub enum StorageType {
    Inactive = 0x00,
    Seedling = 0x01,
    Sapling = 0x02,
    Tree = 0x03,
    Pascal = 0x04,
    SubDirEntry = 0x0d,
    SubDirHeader = 0x0e,
    VolDirHeader = 0x0f
}

#[derive(Clone,Copy,FromPrimitive)]
pub enum Access {
    Read = 0x01,
    Write = 0x02,
    Backup = 0x20,
    Rename = 0x40,
    Destroy = 0x80
}

/// Names an entry slot within a directory block.
/// `idx` follows the on-disk convention, starting at 2 in a key block and 1 elsewhere.
pub struct EntryLocation {
    pub block: u16,
    pub idx: usize
}

/// Transforms between UTF8 and ProDOS text.
/// ProDOS text is positive ASCII with CR line separators.
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
                0x0a | 0x0d => ans.push(0x0d),
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
                0x0d => ans.push('\n'),
                b if b < 128 => ans.push(b as char),
                _ => ans.push('\0')
            }
        }
        Some(ans)
    }
}

/// Structured representation of sequential text files on disk.
/// Random access files need the sparse file image instead.
pub struct SequentialText {
    pub text: Vec<u8>
}

/// Allows the structure to be created from string slices using `from_str`.
/// This replaces LF/CRLF with CR. Negative ASCII is an error.
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
/// This changes CR to LF and nulls out negative ASCII.
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
            text: match dat.split(|b| *b==0).next() {
                Some(t) => t.to_vec(),
                _ => dat.to_vec()
            }
        })
    }
    fn to_bytes(&self) -> Vec<u8> {
        let mut ans = self.text.clone();
        ans.push(0);
        ans
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        let temp = SequentialText::from_bytes(dat)?;
        self.text = temp.text;
        Ok(())
    }
    fn len(&self) -> usize {
        self.text.len() + 1
    }
}
