use ppcrec_frontend::ppc::scan::MAX_SCAN_INSNS;
use ppcrec_frontend::{
    FunctionBoundaryScanner, GuestCode, GuestRange, JumpTableHeuristic, ScanResult,
};
use proptest::prelude::*;

use crate::guest::{asm, GuestImage};

fn scan(image: &GuestImage, entry: u32) -> ScanResult {
    FunctionBoundaryScanner::new().scan(image, entry)
}

#[test]
fn test_straight_line_until_return() {
    let image = GuestImage::new();
    let mut code: Vec<u32> = (0..10).map(|i| asm::addi(3, 3, i)).collect();
    code.push(asm::BLR);
    code.push(asm::li(4, 0)); // next function
    image.load(0x1000, &code);

    let r = scan(&image, 0x1000);
    assert_eq!(r.ranges, vec![GuestRange::new(0x1000, 11 * 4)]);
    assert_eq!(r.num_insns(), 11);
    assert!(r.branch_targets.is_empty());
}

#[test]
fn test_jump_table_run_is_scanned_through() {
    let image = GuestImage::new();
    image.load(
        0x2000,
        &[
            asm::b(0x2000, 0x2100),
            asm::b(0x2004, 0x2200),
            asm::b(0x2008, 0x2300),
            asm::BLR,
        ],
    );
    image.load(0x2100, &[asm::BLR]);
    image.load(0x2200, &[asm::BLR]);
    image.load(0x2300, &[asm::BLR]);

    let r = scan(&image, 0x2000);
    assert_eq!(
        r.ranges,
        vec![
            GuestRange::new(0x2000, 16),
            GuestRange::new(0x2100, 4),
            GuestRange::new(0x2200, 4),
            GuestRange::new(0x2300, 4),
        ]
    );
    assert_eq!(
        r.branch_targets.iter().copied().collect::<Vec<_>>(),
        vec![0x2100, 0x2200, 0x2300]
    );
}

/// Treats every unconditional jump as the end of the function.
struct NoJumpTables;

impl JumpTableHeuristic for NoJumpTables {
    fn continues_after_branch<C: GuestCode + ?Sized>(&self, _: &C, _: u32) -> bool {
        false
    }

    fn continues_after_bctr<C: GuestCode + ?Sized>(&self, _: &C, _: u32) -> bool {
        false
    }
}

#[test]
fn test_custom_heuristic_stops_at_first_branch() {
    let image = GuestImage::new();
    image.load(
        0x2000,
        &[
            asm::b(0x2000, 0x2100),
            asm::b(0x2004, 0x2200),
            asm::b(0x2008, 0x2300),
        ],
    );
    image.load(0x2100, &[asm::BLR]);

    let r = FunctionBoundaryScanner::with_heuristic(NoJumpTables).scan(&*image, 0x2000);
    assert_eq!(
        r.ranges,
        vec![GuestRange::new(0x2000, 4), GuestRange::new(0x2100, 4)]
    );
    assert!(!r.contains(0x2004));
}

#[test]
fn test_lone_branch_ends_range() {
    let image = GuestImage::new();
    image.load(0x2400, &[asm::li(3, 1), asm::b(0x2404, 0x2410), asm::li(3, 2)]);
    image.load(0x2410, &[asm::BLR]);

    let r = scan(&image, 0x2400);
    assert_eq!(
        r.ranges,
        vec![GuestRange::new(0x2400, 8), GuestRange::new(0x2410, 4)]
    );
    assert!(!r.contains(0x2408));
}

#[test]
fn test_invalid_word_is_excluded() {
    let image = GuestImage::new();
    image.load(0x3000, &[asm::li(3, 1), asm::li(4, 2), 0, asm::BLR]);

    let r = scan(&image, 0x3000);
    assert_eq!(r.ranges, vec![GuestRange::new(0x3000, 8)]);
}

#[test]
fn test_unmapped_code_ends_range() {
    let image = GuestImage::new();
    image.load(0x3100, &[asm::li(3, 1), asm::li(4, 2)]);

    let r = scan(&image, 0x3100);
    assert_eq!(r.ranges, vec![GuestRange::new(0x3100, 8)]);
    assert!(scan(&image, 0x3200).ranges.is_empty());
}

#[test]
fn test_hle_oracle_decides_fallthrough() {
    let image = GuestImage::new();
    image.load(
        0x4000,
        &[asm::li(3, 1), asm::hle(0x1005), asm::li(3, 2), asm::BLR],
    );
    assert_eq!(scan(&image, 0x4000).ranges, vec![GuestRange::new(0x4000, 8)]);

    image.set_handler_returns(5);
    assert_eq!(scan(&image, 0x4000).ranges, vec![GuestRange::new(0x4000, 16)]);
}

#[test]
fn test_hle_outside_id_range_ends() {
    let image = GuestImage::new();
    image.set_handler_returns(0);
    image.load(0x4100, &[asm::hle(0x0FFF), asm::BLR]);
    assert_eq!(scan(&image, 0x4100).ranges, vec![GuestRange::new(0x4100, 4)]);
}

#[test]
fn test_adjacent_target_merges() {
    let image = GuestImage::new();
    image.load(
        0x6000,
        &[asm::beq(0x6000, 0x6008), asm::BLR, asm::li(3, 1), asm::BLR],
    );

    let r = scan(&image, 0x6000);
    assert_eq!(r.ranges, vec![GuestRange::new(0x6000, 16)]);
    assert!(r.branch_targets.contains(&0x6008));
}

#[test]
fn test_backward_target_inside_range_is_not_rescanned() {
    let image = GuestImage::new();
    // loop: addi ; bdnz loop ; blr
    image.load(
        0x6100,
        &[asm::li(3, 0), asm::addi(3, 3, 1), asm::bdnz(0x6108, 0x6104), asm::BLR],
    );

    let r = scan(&image, 0x6100);
    assert_eq!(r.ranges, vec![GuestRange::new(0x6100, 16)]);
    assert!(r.branch_targets.contains(&0x6104));
}

#[test]
fn test_target_before_entry_joins_range() {
    let image = GuestImage::new();
    image.load(0x6200, &[asm::li(3, 0), asm::BLR]);
    image.load(0x6208, &[asm::beq(0x6208, 0x6200), asm::BLR]);

    let r = scan(&image, 0x6208);
    assert_eq!(r.ranges, vec![GuestRange::new(0x6200, 16)]);
    assert_eq!(r.span(), Some(GuestRange::new(0x6200, 16)));
}

#[test]
fn test_call_continues_without_target() {
    let image = GuestImage::new();
    image.load(0x7000, &[asm::li(3, 1), asm::bl(0x7004, 0x9000), asm::BLR]);
    image.load(0x9000, &[asm::BLR]);

    let r = scan(&image, 0x7000);
    assert_eq!(r.ranges, vec![GuestRange::new(0x7000, 12)]);
    assert!(r.branch_targets.is_empty());
}

#[test]
fn test_conditional_return_continues() {
    let image = GuestImage::new();
    image.load(0x7100, &[asm::cmpwi(0, 3, 0), asm::beqlr(), asm::li(3, 1), asm::BLR]);
    assert_eq!(scan(&image, 0x7100).ranges, vec![GuestRange::new(0x7100, 16)]);
}

#[test]
fn test_bctr_followed_by_padding_ends() {
    let image = GuestImage::new();
    image.load(0x8000, &[asm::mtctr(3), asm::BCTR, asm::NOP, asm::li(3, 0)]);
    assert_eq!(scan(&image, 0x8000).ranges, vec![GuestRange::new(0x8000, 8)]);
}

#[test]
fn test_bctr_followed_by_code_continues() {
    let image = GuestImage::new();
    image.load(0x8100, &[asm::mtctr(3), asm::BCTR, asm::li(3, 0), asm::BLR]);
    assert_eq!(scan(&image, 0x8100).ranges, vec![GuestRange::new(0x8100, 16)]);
}

#[test]
fn test_scan_is_bounded() {
    let image = GuestImage::new();
    let code = vec![asm::NOP; MAX_SCAN_INSNS as usize + 64];
    image.load(0x10_0000, &code);

    let r = scan(&image, 0x10_0000);
    assert_eq!(r.num_insns(), MAX_SCAN_INSNS);
}

fn code_word() -> impl Strategy<Value = u32> {
    prop_oneof![
        4 => any::<u32>(),
        2 => (0u32..32, -8i32..8).prop_map(|(r, imm)| asm::addi(r, r, imm)),
        1 => Just(asm::BLR),
        1 => Just(asm::BCTR),
        1 => Just(asm::NOP),
        1 => Just(0u32),
        2 => (-16i32..16).prop_map(|d| asm::b(0, (d * 4) as u32)),
        2 => (-16i32..16).prop_map(|d| asm::beq(0, (d * 4) as u32)),
        1 => (0x1000u32..0x1010).prop_map(asm::hle),
    ]
}

proptest! {
    #[test]
    fn test_scan_is_deterministic(
        code in prop::collection::vec(code_word(), 1..64),
        entry_index in 0usize..64,
        returning in prop::collection::vec(0u32..16, 0..8),
    ) {
        const BASE: u32 = 0x0040_0000;
        let image = GuestImage::new();
        image.load(BASE, &code);
        for index in returning {
            image.set_handler_returns(index);
        }
        let entry = BASE + (entry_index % code.len()) as u32 * 4;

        let first = scan(&image, entry);
        let second = scan(&image, entry);
        prop_assert_eq!(&first, &second);

        let mut end_of_previous = 0u32;
        for r in &first.ranges {
            prop_assert!(r.length > 0);
            prop_assert!(r.start >= end_of_previous);
            end_of_previous = r.end();
            for addr in (r.start..r.end()).step_by(4) {
                let word = image.read_u32(addr);
                prop_assert!(word.is_some_and(|w| w >> 26 != 0));
            }
        }
        prop_assert!(first.num_insns() <= MAX_SCAN_INSNS);
        let entry_valid = image.read_u32(entry).is_some_and(|w| w >> 26 != 0);
        prop_assert_eq!(first.contains(entry), entry_valid);
    }
}
