// test of the dual-volume 800K images
use a2disk::img::{DiskImage,dual};
use a2disk::fs::{DiskFS,dos3x};

fn formatted_pair() -> (dos3x::Disk,dos3x::Disk) {
    let (vol1,vol2) = dual::Unidos::create_pair();
    let mut d1 = dos3x::Disk::from_img(Box::new(vol1)).expect("bad image");
    let mut d2 = dos3x::Disk::from_img(Box::new(vol2)).expect("bad image");
    d1.init(1,17,50,32).expect("init failed");
    d2.init(2,17,50,32).expect("init failed");
    (d1,d2)
}

#[test]
fn unidos_volumes_are_isolated() {
    let (mut d1,mut d2) = formatted_pair();
    assert_eq!(d1.total_units().expect("no total"),1600);
    assert_eq!(d1.free_units().expect("no free count"),1536);
    let dat: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
    d1.bsave("ONLYONE",&dat,0x2000,None).expect("bsave failed");
    // the file exists on volume 1 alone, but both share the store
    let (_a,back) = d1.bload("ONLYONE").expect("bload failed");
    assert_eq!(back,dat);
    assert!(d2.bload("ONLYONE").is_err());
    assert_eq!(d2.free_units().expect("no free count"),1536);
}

#[test]
fn unidos_identified_from_bytestream() {
    let (mut d1,_d2) = formatted_pair();
    let dat = vec![0x42;300];
    d1.bsave("MARKER",&dat,0x300,None).expect("bsave failed");
    let bytes = d1.get_img().to_bytes();
    assert_eq!(bytes.len(),819200);
    let mut fs = a2disk::create_fs_from_bytestream(&bytes,None).expect("no file system");
    assert_eq!(fs.fs_name(),"a2 dos");
    let (_a,back) = fs.bload("MARKER").expect("bload failed");
    assert_eq!(back,dat);
}

#[test]
fn ozdos_volumes_are_isolated() {
    let (vol1,vol2) = dual::Ozdos::create_pair();
    let mut d1 = dos3x::Disk::from_img(Box::new(vol1)).expect("bad image");
    let mut d2 = dos3x::Disk::from_img(Box::new(vol2)).expect("bad image");
    d1.init(1,17,50,32).expect("init failed");
    d2.init(2,17,50,32).expect("init failed");
    let dat = vec![0x5a;2000];
    d2.bsave("SECOND",&dat,0x300,None).expect("bsave failed");
    assert!(d1.bload("SECOND").is_err());
    let (_a,back) = d2.bload("SECOND").expect("bload failed");
    assert_eq!(back,dat);
}
