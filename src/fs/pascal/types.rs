use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::str::FromStr;
use std::fmt;
use a2kit_macro::{DiskStructError,DiskStruct};
use super::super::TextEncoder;
use log::error;

pub const FS_NAME: &str = "a2 pascal";
pub const BLOCK_SIZE: usize = 512;
pub const TEXT_PAGE: usize = 1024;
pub const VOL_HEADER_BLOCK: usize = 2;
pub const ENTRY_SIZE: usize = 26;
pub const INVALID_CHARS: &str = " $=?,[#:";

/// Pascal errors, `Display` gives the IORESULT message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("parity error (CRC)")]
    BadBlock,
    #[error("bad device number")]
    BadDevNum,
    #[error("illegal operation")]
    BadMode,
    #[error("undefined hardware error")]
    Hardware,
    #[error("lost device")]
    LostDev,
    #[error("lost file")]
    LostFile,
    #[error("illegal filename")]
    BadTitle,
    #[error("insufficient space")]
    NoRoom,
    #[error("no device")]
    NoDev,
    #[error("no file")]
    NoFile,
    #[error("duplicate file")]
    DuplicateFilename,
    #[error("attempt to open already-open file")]
    NotClosed,
    #[error("attempt to access closed file")]
    NotOpen,
    #[error("error reading real or integer")]
    BadFormat,
    #[error("characters arriving too fast")]
    BufferOverflow,
    #[error("disk is write protected")]
    WriteProtected,
    #[error("failed to complete read or write")]
    DevErr
}

pub const TYPE_MAP_DISP: [(u8,&str);9] = [
    (0x00, "NONE"),
    (0x01, "BAD"),
    (0x02, "CODE"),
    (0x03, "TEXT"),
    (0x04, "INFO"),
    (0x05, "DATA"),
    (0x06, "GRAF"),
    (0x07, "FOTO"),
    (0x08, "SECURE")
];

/// Display string for a file type code.
pub fn type_display(code: u8) -> String {
    for (c,s) in TYPE_MAP_DISP {
        if c==code {
            return s.to_string();
        }
    }
    "????".to_string()
}

/// Pascal file type codes.  Conversions: `as u8` going out,
/// `FileType::from_u8` coming in, `from_str` accepts a number or mnemonic.
#[derive(FromPrimitive)]
pub enum FileType {
    Non = 0x00,
    Bad = 0x01,
    Code = 0x02,
    Text = 0x03,
    Info = 0x04,
    Data = 0x05,
    Graf = 0x06,
    Foto = 0x07,
    Secure = 0x08
}

impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "bin" => return Ok(Self::Data),
            "txt" => return Ok(Self::Text),
            "pcode" => return Ok(Self::Code),
            _ => {}
        }
        match u8::from_str(s) {
            Ok(num) => FileType::from_u8(num).ok_or(Error::BadMode),
            Err(_) => Err(Error::BadMode)
        }
    }
}

/// Transforms between UTF8 and Pascal text.
/// Pascal text is positive ASCII with CR line separators, packed into 1024
/// byte pages.  A line never crosses a page boundary; the gap is padded with
/// nulls.  Lines after the first open with DLE (0x10) followed by an
/// indentation count biased by 0x20.
pub struct Encoder {
    line_terminator: Vec<u8>
}

impl Encoder {
    /// Encode one line sans terminator.  The first line of a file carries no
    /// DLE prefix, matching what the system editor writes.
    fn encode_line(line: &str,is_first: bool) -> Option<Vec<u8>> {
        let mut coded = Vec::new();
        let mut body = line.as_bytes();
        if !is_first {
            let spaces = body.iter().take_while(|b| **b==0x20).count();
            let indent = spaces.min(0xff - 0x20);
            coded.push(0x10);
            coded.push(0x20 + indent as u8);
            body = &body[indent..];
        }
        for b in body {
            match *b < 128 {
                true => coded.push(*b),
                false => return None
            }
        }
        coded.push(0x0d);
        Some(coded)
    }
}

impl TextEncoder for Encoder {
    fn new(line_terminator: Vec<u8>) -> Self {
        Self {
            line_terminator
        }
    }
    fn encode(&self,txt: &str) -> Option<Vec<u8>> {
        let norm = txt.replace("\r\n","\n").replace('\r',"\n");
        let mut ans: Vec<u8> = Vec::new();
        let mut used = 0; // bytes on the current page
        let mut is_first = true;
        for line in norm.split_inclusive('\n') {
            let coded = Self::encode_line(line.trim_end_matches('\n'),is_first)?;
            is_first = false;
            if coded.len() > TEXT_PAGE {
                error!("text line cannot fit in a page");
                return None;
            }
            if used + coded.len() > TEXT_PAGE {
                ans.resize(ans.len() + TEXT_PAGE - used,0);
                used = 0;
            }
            used = (used + coded.len()) % TEXT_PAGE;
            ans.extend_from_slice(&coded);
        }
        if !Self::is_terminated(&ans,&self.line_terminator) {
            ans.extend_from_slice(&self.line_terminator);
        }
        let tail = ans.len() % TEXT_PAGE;
        if tail > 0 {
            ans.resize(ans.len() + TEXT_PAGE - tail,0);
        }
        Some(ans)
    }
    fn decode(&self,src: &[u8]) -> Option<String> {
        let mut ans = String::new();
        let mut bytes = src.iter();
        while let Some(b) = bytes.next() {
            match *b {
                0 => {}, // page padding
                0x10 => {
                    if let Some(count) = bytes.next() {
                        for _rep in 0..count.saturating_sub(0x20) {
                            ans.push(' ');
                        }
                    }
                },
                0x0d => ans.push('\n'),
                b if b < 127 => ans.push(b as char),
                _ => {}
            }
        }
        Some(ans)
    }
}

/// Structured representation of text files on disk.  The page structure is
/// kept in the flat text, so the decoder has to pass over nulls.
pub struct SequentialText {
    pub header: Vec<u8>,
    pub text: Vec<u8>
}

impl SequentialText {
    /// Every text file opens with a 1K page reserved for the system editor.
    /// These bytes were lifted from a file the editor wrote.
    fn editor_header() -> Vec<u8> {
        let mut ans = vec![0;TEXT_PAGE];
        ans[0] = 1;
        ans[0x70..0x80].copy_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x4F, 0x00, 0x05, 0x00, 0x5E, 0x00]);
        ans[0x80..0x84].copy_from_slice(&[0x13, 0xA3, 0x13, 0xA3]);
        ans
    }
}

impl FromStr for SequentialText {
    type Err = std::fmt::Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        let encoder = Encoder::new(vec![0x0d]);
        match encoder.encode(s) {
            Some(text) => Ok(Self {
                header: Self::editor_header(),
                text
            }),
            None => Err(std::fmt::Error)
        }
    }
}

impl fmt::Display for SequentialText {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoder = Encoder::new(vec![0x0d]);
        match encoder.decode(&self.text) {
            Some(ans) => write!(f,"{}",ans),
            None => write!(f,"err")
        }
    }
}

impl DiskStruct for SequentialText {
    fn new() -> Self {
        Self {
            header: Vec::new(),
            text: Vec::new()
        }
    }
    fn from_bytes(dat: &[u8]) -> Result<Self,DiskStructError> {
        if dat.len() < TEXT_PAGE + 1 {
            return Err(DiskStructError::OutOfData);
        }
        Ok(Self {
            header: dat[0..TEXT_PAGE].to_vec(),
            text: dat[TEXT_PAGE..].to_vec()
        })
    }
    fn to_bytes(&self) -> Vec<u8> {
        [self.header.clone(),self.text.clone()].concat()
    }
    fn update_from_bytes(&mut self,dat: &[u8]) -> Result<(),DiskStructError> {
        let temp = SequentialText::from_bytes(dat)?;
        self.header = temp.header;
        self.text = temp.text;
        Ok(())
    }
    fn len(&self) -> usize {
        self.header.len() + self.text.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_encoding() {
        let encoder = Encoder::new(vec![0x0d]);
        let coded = encoder.encode("PROGRAM X;\n  BEGIN\n  END.\n").expect("encode failed");
        assert_eq!(coded.len(),TEXT_PAGE);
        // first line has no DLE prefix
        assert_eq!(&coded[0..11],&[0x50,0x52,0x4f,0x47,0x52,0x41,0x4d,0x20,0x58,0x3b,0x0d]);
        // later lines open with DLE and the biased indent count
        assert_eq!(&coded[11..13],&[0x10,0x22]);
        let back = encoder.decode(&coded).expect("decode failed");
        assert_eq!(back,"PROGRAM X;\n  BEGIN\n  END.\n");
    }

    #[test]
    fn long_text_breaks_pages_between_lines() {
        let encoder = Encoder::new(vec![0x0d]);
        let txt: String = (0..100).map(|i| format!("LINE {:04}\n",i)).collect();
        let coded = encoder.encode(&txt).expect("encode failed");
        // 10 bytes for the first line, 12 for the rest, 84 lines fill page 1
        assert_eq!(coded.len(),2*TEXT_PAGE);
        assert_eq!(&coded[1018..1024],&[0,0,0,0,0,0]);
        assert_eq!(coded[TEXT_PAGE],0x10);
        assert_eq!(encoder.decode(&coded).expect("decode failed"),txt);
    }
}
