use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::str::FromStr;
use std::fmt;
use a2kit_macro::{DiskStructError,DiskStruct};
use crate::fs::TextEncoder;

pub const FS_NAME: &str = "a2 dos";
pub const VTOC_TRACK: u8 = 17;
pub const MAX_DIRECTORY_REPS: usize = 100;
pub const MAX_TSLIST_REPS: usize = 1000;

/// DOS errors, `Display` gives the message DOS printed, e.g. `FILE NOT FOUND`.
/// LANGUAGE NOT AVAILABLE, NO BUFFERS AVAILABLE, PROGRAM TOO LARGE, and
/// NOT DIRECT COMMAND are omitted.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("RANGE ERROR")]
    Range,
    #[error("END OF DATA")]
    EndOfData,
    #[error("FILE NOT FOUND")]
    FileNotFound,
    #[error("VOLUME MISMATCH")]
    VolumeMismatch,
    #[error("I/O ERROR")]
    IOError,
    #[error("DISK FULL")]
    DiskFull,
    #[error("FILE LOCKED")]
    FileLocked,
    #[error("FILE TYPE MISMATCH")]
    FileTypeMismatch,
    #[error("WRITE PROTECTED")]
    WriteProtected,
    #[error("SYNTAX ERROR")]
    SyntaxError
}

/// The four basic file types.  Conversions: `as u8` going out,
/// `FileType::from_u8` coming in, `from_str` accepts a number or mnemonic.
#[derive(FromPrimitive)]
pub enum FileType {
    Text = 0x00,
    Integer = 0x01,
    Applesoft = 0x02,
    Binary = 0x04
}

impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "bin" => return Ok(Self::Binary),
            "txt" => return Ok(Self::Text),
            "atok" => return Ok(Self::Applesoft),
            "itok" => return Ok(Self::Integer),
            _ => {}
        }
        match u8::from_str(s) {
            Ok(num) => FileType::from_u8(num).ok_or(Error::FileTypeMismatch),
            Err(_) => Err(Error::FileTypeMismatch)
        }
    }
}

/// Display mnemonic for a file type byte, locked types get a star.
pub fn type_to_display(typ: u8) -> &'static str {
    match typ {
        0x00 => " T",
        0x01 => " I",
        0x02 => " A",
        0x04 => " B",
        0x80 => "*T",
        0x81 => "*I",
        0x82 => "*A",
        0x84 => "*B",
        _ => "??"
    }
}

/// Emulators sometimes pad saved data with junk.  Carry it without
/// letting it into the length field.
fn append_junk(dat: &[u8],trailing: Option<&[u8]>) -> Vec<u8> {
    match trailing {
        Some(v) => [dat,v].concat(),
        None => dat.to_vec()
    }
}

/// Transforms between UTF8 and DOS text.
/// DOS text is negative ASCII with CR line separators.
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
                0x0a | 0x0d => ans.push(0x8d),
                b if b < 128 => ans.push(b + 0x80),
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
                0x8d => ans.push('\n'),
                b if b > 127 => ans.push((b - 0x80) as char),
                _ => ans.push('\0')
            }
        }
        Some(ans)
    }
}

/// The bytes on disk that hold a BASIC program, Applesoft or Integer.
pub struct TokenizedProgram {
    length: [u8;2],
    pub program: Vec<u8>
}

impl TokenizedProgram {
    /// Wrap the token stream (sans header) in the disk structure
    pub fn pack(prog: &[u8],trailing: Option<&[u8]>) -> Self {
        Self {
            length: u16::to_le_bytes(prog.len() as u16),
            program: append_junk(prog,trailing)
        }
    }
}

impl DiskStruct for TokenizedProgram {
    fn new() -> Self {
        Self {
            length: [0;2],
            program: Vec::new()
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        if dat.len() < 2 {
            return Err(DiskStructError::OutOfData);
        }
        let end_byte = 2 + u16::from_le_bytes([dat[0],dat[1]]) as usize;
        // sector padding means only a lower bound can be required
        if end_byte > dat.len() {
            return Err(DiskStructError::OutOfData);
        }
        Ok(Self {
            length: [dat[0],dat[1]],
            program: dat[2..end_byte].to_vec()
        })
    }
    fn to_bytes(&self) -> Vec<u8> {
        [&self.length[..],&self.program].concat()
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        let temp = TokenizedProgram::from_bytes(dat)?;
        self.length = temp.length;
        self.program = temp.program;
        Ok(())
    }
    fn len(&self) -> usize {
        2 + self.program.len()
    }
}

/// Structured representation of sequential text files on disk.
/// The text ends at the first NUL byte.
pub struct SequentialText {
    pub text: Vec<u8>
}

/// Allows the structure to be created from string slices using `from_str`.
/// This replaces LF/CRLF with CR and flips positive ASCII. Negative ASCII is an error.
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
/// This replaces CR with LF, flips negative ASCII, and nulls positive ASCII.
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

/// Binary file as stored on disk: load address, length, then the data.
pub struct BinaryData {
    pub start: [u8;2],
    length: [u8;2],
    pub data: Vec<u8>
}

impl BinaryData {
    /// Wrap the raw data (sans header) in the disk structure
    pub fn pack(bin: &[u8],addr: u16) -> Self {
        Self {
            start: u16::to_le_bytes(addr),
            length: u16::to_le_bytes(bin.len() as u16),
            data: bin.to_vec()
        }
    }
}

impl DiskStruct for BinaryData {
    fn new() -> Self {
        Self {
            start: [0;2],
            length: [0;2],
            data: Vec::new()
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        if dat.len() < 4 {
            return Err(DiskStructError::OutOfData);
        }
        let end_byte = 4 + u16::from_le_bytes([dat[2],dat[3]]) as usize;
        if end_byte > dat.len() {
            return Err(DiskStructError::OutOfData);
        }
        Ok(Self {
            start: [dat[0],dat[1]],
            length: [dat[2],dat[3]],
            data: dat[4..end_byte].to_vec()
        })
    }
    fn to_bytes(&self) -> Vec<u8> {
        [&self.start[..],&self.length,&self.data].concat()
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        let temp = BinaryData::from_bytes(dat)?;
        self.start = temp.start;
        self.length = temp.length;
        self.data = temp.data;
        Ok(())
    }
    fn len(&self) -> usize {
        4 + self.data.len()
    }
}
