// test of the GCR nibble codec
use a2disk::img::nibbles::{self,SectorAddressFormat,SectorDataFormat,encode_44,decode_44};
use a2disk::img::NibbleError;

#[test]
fn four_and_four() {
    for val in 0..=255u8 {
        let nibs = encode_44(val);
        // every other bit must be set in a 4&4 pair
        assert_eq!(nibs[0] & 0xaa,0xaa);
        assert_eq!(nibs[1] & 0xaa,0xaa);
        assert_eq!(decode_44(nibs),val);
    }
}

#[test]
fn sector_round_trip() {
    let adr = SectorAddressFormat::create_std();
    let dat = SectorDataFormat::create_std();
    let mut trk = nibbles::create_track(254,7,&adr,&dat).expect("could not format track");
    let pattern: Vec<u8> = (0..256).map(|i| (i % 251) as u8).collect();
    nibbles::write_sector(&mut trk,&pattern,7,9,&adr,&dat).expect("could not write sector");
    trk.reset();
    let back = nibbles::read_sector(&mut trk,7,9,&adr,&dat).expect("could not read sector");
    assert_eq!(back,pattern);
    // neighboring sector is still zeroed
    trk.reset();
    let other = nibbles::read_sector(&mut trk,7,10,&adr,&dat).expect("could not read sector");
    assert_eq!(other,vec![0;256]);
}

#[test]
fn wrong_track_is_rejected() {
    let adr = SectorAddressFormat::create_std();
    let dat = SectorDataFormat::create_std();
    let mut trk = nibbles::create_track(254,7,&adr,&dat).expect("could not format track");
    // every address field announces track 7, so seeking track 8 must fail
    assert!(nibbles::read_sector(&mut trk,8,0,&adr,&dat).is_err());
}

#[test]
fn bad_checksum_detected() {
    let adr = SectorAddressFormat::create_std();
    let dat = SectorDataFormat::create_std();
    let mut trk = nibbles::create_track(254,0,&adr,&dat).expect("could not format track");
    // replace the first data nibble, staying within the valid 6&2 set,
    // so the damage is only detectable through the checksum
    nibbles::find_sector_data(&mut trk,[0,5],&adr,&dat).expect("sector not found");
    let mut first = [0u8;1];
    trk.read(&mut first,8);
    trk.shift_rev(8);
    let repl = if first[0]==0x96 { 0x97 } else { 0x96 };
    trk.write(&[repl],8);
    trk.reset();
    match nibbles::read_sector(&mut trk,0,5,&adr,&dat) {
        Err(NibbleError::BadChecksum) => {},
        _ => panic!("corruption was not detected")
    }
}

#[test]
fn invalid_byte_detected() {
    let adr = SectorAddressFormat::create_std();
    let dat = SectorDataFormat::create_std();
    let mut trk = nibbles::create_track(254,0,&adr,&dat).expect("could not format track");
    // 0xd5 never appears in the 6&2 table
    nibbles::find_sector_data(&mut trk,[0,5],&adr,&dat).expect("sector not found");
    trk.write(&[0xd5],8);
    trk.reset();
    match nibbles::read_sector(&mut trk,0,5,&adr,&dat) {
        Err(NibbleError::InvalidByte) => {},
        _ => panic!("corruption was not detected")
    }
}

#[test]
fn five_and_three_is_refused() {
    let adr = SectorAddressFormat::create_13();
    let dat = SectorDataFormat::create_13();
    match nibbles::create_track(254,0,&adr,&dat) {
        Err(NibbleError::NibbleType) => {},
        _ => panic!("5&3 formatting should be refused")
    }
}
