// test of the RDOS file system module
use a2disk::img::{DiskImage,dsk_do,dsk_d13};
use a2disk::fs::{Block,DiskFS,rdos};

fn name_bytes(name: &str) -> [u8;24] {
    let mut ans = [0xa0;24];
    for (i,b) in name.bytes().enumerate() {
        ans[i] = b | 0x80;
    }
    ans
}

fn entry(name: &str,typ: u8,blocks: u8,load: u16,eof: u16,start: u16) -> Vec<u8> {
    let mut ans = name_bytes(name).to_vec();
    ans.push(typ);
    ans.push(blocks);
    ans.extend(u16::to_le_bytes(load));
    ans.extend(u16::to_le_bytes(eof));
    ans.extend(u16::to_le_bytes(start));
    ans
}

fn catalog_sector() -> Vec<u8> {
    let mut buf = vec![0;256];
    buf[0..32].copy_from_slice(&entry("HELLO",b'B'|0x80,3,0x300,600,26));
    buf
}

fn signature_sector() -> Vec<u8> {
    let mut buf = vec![0;256];
    let sig: Vec<u8> = "NOT IN USE".bytes().map(|b| b | 0x80).collect();
    buf[10..10+sig.len()].copy_from_slice(&sig);
    buf
}

/// file data occupying blocks 26,27,28 with eof 600
fn file_blocks() -> Vec<u8> {
    (0..768).map(|i| (i % 256) as u8).collect()
}

fn build_13() -> Box<dyn DiskImage> {
    let mut img: Box<dyn DiskImage> = Box::new(dsk_d13::D13::create(35));
    img.write_block(Block::D13([1,0]),&catalog_sector()).expect("write failed");
    img.write_block(Block::D13([1,12]),&signature_sector()).expect("write failed");
    let dat = file_blocks();
    for i in 0..3 {
        img.write_block(Block::D13([2,i]),&dat[i*256..(i+1)*256]).expect("write failed");
    }
    img
}

fn build_16(sig_sector: usize) -> Box<dyn DiskImage> {
    let mut img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    img.write_block(Block::DO([1,0]),&catalog_sector()).expect("write failed");
    img.write_block(Block::DO([1,sig_sector]),&signature_sector()).expect("write failed");
    img
}

#[test]
fn thirteen_sector_variant() {
    let mut disk = rdos::Disk::from_img(build_13()).expect("not recognized");
    assert_eq!(disk.fs_name(),"rdos 2.1");
    assert_eq!(disk.total_units().expect("no total"),455);
    assert_eq!(disk.free_units().expect("no free count"),452);
    let cat = disk.catalog("").expect("catalog failed");
    assert_eq!(cat.len(),1);
    assert_eq!(cat[0].name,"HELLO");
    assert_eq!(cat[0].blocks,3);
    let (addr,back) = disk.bload("HELLO").expect("bload failed");
    assert_eq!(addr,0x300);
    assert_eq!(back,file_blocks()[0..600].to_vec());
}

#[test]
fn truncated_variant_in_16_sectors() {
    // 13 sector layout inside a 16 sector image puts the signature in sector 12
    let mut disk = rdos::Disk::from_img(build_16(12)).expect("not recognized");
    assert_eq!(disk.fs_name(),"rdos 3.2");
    assert_eq!(disk.total_units().expect("no total"),455);
}

#[test]
fn sixteen_sector_variant() {
    let mut disk = rdos::Disk::from_img(build_16(15)).expect("not recognized");
    assert_eq!(disk.fs_name(),"rdos 3.3");
    assert_eq!(disk.total_units().expect("no total"),560);
}

#[test]
fn ambiguous_signature_resolves_the_same_way_every_time() {
    // if both signature locations match, the 16 sector reading wins
    for _rep in 0..3 {
        let mut img = build_16(12);
        img.write_block(Block::DO([1,15]),&signature_sector()).expect("write failed");
        let disk = rdos::Disk::from_img(img).expect("not recognized");
        assert_eq!(disk.fs_name(),"rdos 3.3");
    }
}

#[test]
fn mutations_are_refused() {
    let mut disk = rdos::Disk::from_img(build_13()).expect("not recognized");
    assert!(disk.bsave("NEWFILE",&vec![0;100],0x300,None).is_err());
    assert!(disk.delete("HELLO").is_err());
    assert!(disk.rename("HELLO","GOODBYE").is_err());
    // nothing changed
    assert_eq!(disk.catalog("").expect("catalog failed").len(),1);
}

#[test]
fn other_disks_are_not_recognized() {
    let mut blank: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    assert!(rdos::Disk::test_img(&mut blank).is_none());
    // a fresh DOS 3.3 disk is not RDOS even though the size matches
    let img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut dos = a2disk::fs::dos3x::Disk::from_img(img).expect("bad image");
    dos.init33(254).expect("init failed");
    assert!(rdos::Disk::test_img(dos.get_img()).is_none());
}
