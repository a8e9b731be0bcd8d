// test of the DOS 3.x file system module
use a2disk::img::{DiskImage,dsk_do,dsk_d13};
use a2disk::fs::{DiskFS,dos3x};

fn blank33() -> dos3x::Disk {
    let img: Box<dyn DiskImage> = Box::new(dsk_do::DO::create(35,16));
    let mut disk = dos3x::Disk::from_img(img).expect("bad image");
    disk.init33(254).expect("init failed");
    disk
}

#[test]
fn format_marks_system_tracks() {
    let mut disk = blank33();
    assert_eq!(disk.total_units().expect("no total"),560);
    // tracks 0 and 17 are spoken for
    assert_eq!(disk.free_units().expect("no free count"),528);
    // VTOC is sector 272 counting linearly; the bitmap starts at offset 0x38
    let (_z,vtoc) = disk.read_block("272").expect("no vtoc");
    assert_eq!(vtoc[0x38+17*4..0x38+17*4+4],[0x00,0x00,0x00,0x00]);
    assert_eq!(vtoc[0x38+4..0x38+8],[0xff,0xff,0x00,0x00]);
    // same story from the usage map
    let map = disk.usage_map().expect("no usage map");
    assert_eq!(map.len(),560);
    assert!(map[0..16].iter().all(|free| !free));
    assert!(map[17*16..18*16].iter().all(|free| !free));
    assert!(map[16..17*16].iter().all(|free| *free));
    assert!(map[18*16..].iter().all(|free| *free));
}

#[test]
fn name_and_type_suggestions() {
    let disk = blank33();
    assert_eq!(disk.suggest_name("my long, program.bas"),"MY LONG PROGRAM");
    assert_eq!(disk.suggest_type("my long, program.bas"),"atok");
    assert_eq!(disk.suggest_type("notes.txt"),"txt");
    assert_eq!(disk.suggest_type("loader"),"bin");
}

#[test]
fn binary_round_trip() {
    let mut disk = blank33();
    let dat: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
    disk.bsave("THECHIP",&dat,0x300,None).expect("bsave failed");
    let (addr,back) = disk.bload("THECHIP").expect("bload failed");
    assert_eq!(addr,0x300);
    assert_eq!(back,dat);
    assert!(disk.free_units().expect("no free count") < 528);
}

#[test]
fn delete_restores_free_sectors() {
    let mut disk = blank33();
    disk.bsave("DOOMED",&vec![0x55;5000],0x800,None).expect("bsave failed");
    assert!(disk.free_units().expect("no free count") < 528);
    disk.delete("DOOMED").expect("delete failed");
    assert_eq!(disk.free_units().expect("no free count"),528);
    assert!(disk.bload("DOOMED").is_err());
}

#[test]
fn locked_files_cannot_be_deleted() {
    let mut disk = blank33();
    disk.bsave("KEEPER",&vec![1,2,3,4],0x300,None).expect("bsave failed");
    disk.lock("KEEPER").expect("lock failed");
    let cat = disk.catalog("").expect("catalog failed");
    let info = cat.iter().find(|f| f.name=="KEEPER").expect("file not listed");
    assert!(info.locked);
    assert!(disk.delete("KEEPER").is_err());
    disk.unlock("KEEPER").expect("unlock failed");
    disk.delete("KEEPER").expect("delete failed");
}

#[test]
fn sequential_text() {
    let mut disk = blank33();
    let encoded = disk.encode_text("HELLO\nGOODBYE\n").expect("encode failed");
    disk.write_text("SQUIRREL",&encoded).expect("write failed");
    let (_z,back) = disk.read_text("SQUIRREL").expect("read failed");
    assert_eq!(disk.decode_text(&back).expect("decode failed"),"HELLO\nGOODBYE\n");
}

#[test]
fn dos32_on_d13() {
    let img: Box<dyn DiskImage> = Box::new(dsk_d13::D13::create(35));
    let mut disk = dos3x::Disk::from_img(img).expect("bad image");
    disk.init32(254).expect("init failed");
    assert_eq!(disk.total_units().expect("no total"),455);
    assert_eq!(disk.free_units().expect("no free count"),429);
    let dat = vec![0xa9,0x00,0x8d,0x10,0xc0];
    disk.bsave("SMALL",&dat,0x300,None).expect("bsave failed");
    let (addr,back) = disk.bload("SMALL").expect("bload failed");
    assert_eq!(addr,0x300);
    assert_eq!(back,dat);
}
