// test of the sector skew tables
use a2disk::bios::skew;

#[test]
fn dos_sector_maps_are_inverse() {
    for lsec in 0..16 {
        assert_eq!(skew::DOS_PSEC_TO_DOS_LSEC[skew::DOS_LSEC_TO_DOS_PSEC[lsec]],lsec);
    }
    for psec in 0..16 {
        assert_eq!(skew::DOS_LSEC_TO_DOS_PSEC[skew::DOS_PSEC_TO_DOS_LSEC[psec]],psec);
    }
}

#[test]
fn dos32_physical_order_is_a_permutation() {
    let mut seen = [false;13];
    for psec in skew::DOS32_PHYSICAL {
        assert!(psec<13);
        assert!(!seen[psec]);
        seen[psec] = true;
    }
}

#[test]
fn prodos_blocks_cover_the_disk() {
    for block in 0..280 {
        let halves = skew::ts_from_prodos_block(block);
        for half in 0..2 {
            let [t,s] = halves[half];
            assert!(t<35 && s<16);
            let (b,offset) = skew::prodos_block_from_ts(t,s);
            assert_eq!(b,block);
            assert_eq!(offset,half*256);
        }
    }
}

#[test]
fn cpm_records_split_dos_sectors() {
    // 32 CP/M records per track, two to a DOS sector, half-sector offsets alternating
    let mut count = [0;16];
    for i in 0..32 {
        let lsec = skew::CPM_LSEC_TO_DOS_LSEC[i];
        assert!(lsec<16);
        count[lsec] += 1;
        assert_eq!(skew::CPM_LSEC_TO_DOS_OFFSET[i],128*(i%2));
    }
    assert!(count.iter().all(|c| *c==2));
}
