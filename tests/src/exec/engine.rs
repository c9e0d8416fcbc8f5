use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use ppcrec_exec::{
    CommitRejected, CompileError, DispatchSlot, EngineConfig, EngineError, FunctionId, Recompiler,
};
use ppcrec_frontend::{GuestRange, LowerError};
use proptest::prelude::*;

use super::{manual_config, manual_engine};
use crate::guest::{asm, GuestImage};

/// `li r3,1 ; addi r3,r3,1 ; addi r3,r3,1 ; blr` at 0x1000.
fn straight_line() -> Arc<GuestImage> {
    let image = GuestImage::new();
    image.load(
        0x1000,
        &[asm::li(3, 1), asm::addi(3, 3, 1), asm::addi(3, 3, 1), asm::BLR],
    );
    image
}

/// Function with entries at 0x2000 and 0x200C.
fn load_branchy(image: &GuestImage) {
    image.load(
        0x2000,
        &[
            asm::beq(0x2000, 0x200C),
            asm::li(3, 1),
            asm::BLR,
            asm::li(3, 2),
            asm::BLR,
        ],
    );
}

fn compile(engine: &Recompiler, addr: u32) -> FunctionId {
    assert!(engine.request(addr));
    let pending = engine.compile_next().unwrap().unwrap();
    engine.commit(pending).unwrap()
}

#[derive(Debug, PartialEq)]
struct Snapshot {
    slots: Vec<(u32, DispatchSlot)>,
    functions: usize,
}

fn snapshot(engine: &Recompiler, lo: u32, hi: u32) -> Snapshot {
    Snapshot {
        slots: (lo..hi).step_by(4).map(|a| (a, engine.read(a))).collect(),
        functions: engine.function_count(),
    }
}

#[test]
fn test_request_marks_visited() {
    let image = straight_line();
    let engine = manual_engine(&image);

    assert!(engine.request(0x1000));
    assert_eq!(engine.read(0x1000), DispatchSlot::Visited);
    assert_eq!(engine.queued(), 1);
    assert!(!engine.request(0x1000));
    assert_eq!(engine.queued(), 1);
    assert_eq!(engine.stats().enqueued, 1);
}

#[test]
fn test_concurrent_requests_enqueue_once() {
    let image = straight_line();
    let engine = manual_engine(&image);

    for i in 0..32u32 {
        let addr = 0x10_0000 + i * 0x100;
        let barrier = Barrier::new(2);
        let won = thread::scope(|s| {
            let a = s.spawn(|| {
                barrier.wait();
                engine.request(addr)
            });
            let b = s.spawn(|| {
                barrier.wait();
                engine.request(addr)
            });
            [a.join().unwrap(), b.join().unwrap()]
        });
        assert_eq!(won.iter().filter(|&&w| w).count(), 1, "addr {addr:#x}");
        assert_eq!(engine.read(addr), DispatchSlot::Visited);
    }
    assert_eq!(engine.queued(), 32);
    assert_eq!(engine.stats().enqueued, 32);
}

#[test]
fn test_function_with_stores_is_published() {
    let image = GuestImage::new();
    image.load(
        0x1800,
        &[asm::lwz(5, 0, 4), asm::addi(5, 5, 1), asm::stw(5, 8, 4), asm::li(3, 0), asm::BLR],
    );
    let engine = manual_engine(&image);

    compile(&engine, 0x1800);
    assert!(engine.read(0x1800).is_compiled());
    let stats = engine.stats();
    assert_eq!(stats.compiled, 1);
    assert_eq!(stats.emit_failures, 0);
}

#[test]
fn test_commit_keeps_request_for_adjacent_function() {
    let image = straight_line();
    image.load(0x1010, &[asm::li(4, 2), asm::BLR]);
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    assert!(engine.request(0x1010));

    let pending = engine.compile_next().unwrap().unwrap();
    engine.commit(pending).unwrap();
    assert_eq!(engine.read(0x1010), DispatchSlot::Visited);
    assert_eq!(engine.queued(), 1);

    assert_eq!(engine.process_queue(), 1);
    assert!(engine.read(0x1010).is_compiled());
}

#[test]
fn test_compiled_function_is_published() {
    let image = straight_line();
    let engine = manual_engine(&image);

    assert!(engine.request(0x1000));
    assert_eq!(engine.process_queue(), 1);

    assert!(engine.read(0x1000).is_compiled());
    assert_eq!(engine.read(0x1004), DispatchSlot::Unvisited);
    assert_eq!(engine.function_count(), 1);
    assert_eq!(engine.queued(), 0);
    assert!(engine.try_enter(0x1000).is_some());
    assert_eq!(
        engine.find_function_ranges(0x1008),
        Some(vec![GuestRange::new(0x1000, 16)])
    );
    assert_eq!(engine.find_function_ranges(0x1010), None);

    let stats = engine.stats();
    assert_eq!(stats.enqueued, 1);
    assert_eq!(stats.compiled, 1);
    assert_eq!(stats.rejected_commits, 0);
}

#[test]
fn test_function_snapshot() {
    let image = GuestImage::new();
    load_branchy(&image);
    let engine = manual_engine(&image);
    let id = compile(&engine, 0x2000);

    let f = engine.function(id).unwrap();
    assert_eq!(f.guest_address, 0x2000);
    assert_eq!(f.guest_size, 20);
    assert!(f.native_size > 0);
    assert!(f.contains(0x2010));
    assert!(!f.contains(0x2014));
    let guests: Vec<u32> = f.entries.iter().map(|&(g, _)| g).collect();
    assert_eq!(guests, vec![0x2000, 0x200C]);
    assert_eq!(f.entry_for(0x2000), Some(f.native_code));
    assert_eq!(engine.read(0x200C), DispatchSlot::Compiled(f.entry_for(0x200C).unwrap()));
}

#[test]
fn test_invalidation_resets_every_entry() {
    let image = GuestImage::new();
    load_branchy(&image);
    let engine = manual_engine(&image);
    let id = compile(&engine, 0x2000);
    assert!(engine.read(0x200C).is_compiled());

    engine.invalidate(0x2004, 0x2008);
    assert_eq!(engine.read(0x2000), DispatchSlot::Unvisited);
    assert_eq!(engine.read(0x200C), DispatchSlot::Unvisited);
    assert!(engine.function(id).is_none());
    assert_eq!(engine.function_count(), 0);
    assert_eq!(engine.find_function_ranges(0x2000), None);
    assert_eq!(engine.stats().functions_invalidated, 1);

    // The function can be compiled again.
    compile(&engine, 0x2000);
    assert!(engine.read(0x200C).is_compiled());
}

#[test]
fn test_invalidating_uncompiled_code_changes_nothing() {
    let image = straight_line();
    let engine = manual_engine(&image);
    compile(&engine, 0x1000);
    let before = snapshot(&engine, 0x0F00, 0x3100);

    engine.invalidate(0x3000, 0x3004);
    assert_eq!(snapshot(&engine, 0x0F00, 0x3100), before);
    assert_eq!(engine.find_function_ranges(0x3000), None);
    assert_eq!(engine.stats().functions_invalidated, 0);
}

#[test]
fn test_invalidate_twice_is_same_as_once() {
    let image = straight_line();
    load_branchy(&image);
    let engine = manual_engine(&image);
    compile(&engine, 0x1000);
    compile(&engine, 0x2000);

    engine.invalidate(0x1000, 0x1004);
    let once = snapshot(&engine, 0x0F00, 0x2100);
    engine.invalidate(0x1000, 0x1004);
    assert_eq!(snapshot(&engine, 0x0F00, 0x2100), once);
    assert_eq!(engine.function_count(), 1);
    assert!(engine.read(0x2000).is_compiled());
}

#[test]
fn test_overlapping_write_rejects_commit() {
    let image = straight_line();
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    let pending = engine.compile_next().unwrap().unwrap();

    engine.invalidate(0x1008, 0x100C);
    assert_eq!(engine.pending_invalidations().len(), 1);

    let err = engine.commit(pending).unwrap_err();
    assert_eq!(
        err,
        CompileError::Commit(CommitRejected::PendingInvalidation {
            start: 0x1008,
            size: 4
        })
    );
    assert_eq!(engine.read(0x1000), DispatchSlot::Unvisited);
    assert!(engine.pending_invalidations().is_empty());
    assert_eq!(engine.function_count(), 0);
    assert_eq!(engine.stats().rejected_commits, 1);

    // The address can be requested again.
    assert!(engine.request(0x1000));
}

#[test]
fn test_other_commit_keeps_invalidation_for_uncommitted_job() {
    let image = straight_line();
    load_branchy(&image);
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    assert!(engine.request(0x2000));
    let first = engine.compile_next().unwrap().unwrap();
    let second = engine.compile_next().unwrap().unwrap();

    engine.invalidate(0x1008, 0x100C);
    assert!(engine.commit(second).is_ok());
    assert_eq!(engine.pending_invalidations().len(), 1);

    assert!(matches!(
        engine.commit(first),
        Err(CompileError::Commit(CommitRejected::PendingInvalidation { .. }))
    ));
    assert!(engine.pending_invalidations().is_empty());
    assert_eq!(engine.function_count(), 1);
}

#[test]
fn test_write_touching_function_end_rejects_commit() {
    let image = straight_line();
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    let pending = engine.compile_next().unwrap().unwrap();

    engine.invalidate(0x1010, 0x1014);
    assert!(matches!(
        engine.commit(pending),
        Err(CompileError::Commit(CommitRejected::PendingInvalidation { .. }))
    ));
}

#[test]
fn test_unrelated_write_does_not_reject_commit() {
    let image = straight_line();
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    let pending = engine.compile_next().unwrap().unwrap();

    engine.invalidate(0x2000, 0x2004);
    assert!(engine.commit(pending).is_ok());
    assert!(engine.read(0x1000).is_compiled());
    assert!(engine.pending_invalidations().is_empty());
}

#[test]
fn test_reset_entry_rejects_commit() {
    let image = straight_line();
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    let pending = engine.compile_next().unwrap().unwrap();

    engine.invalidate(0x1000, 0x1004);
    let err = engine.commit(pending).unwrap_err();
    assert_eq!(
        err,
        CompileError::Commit(CommitRejected::SlotNoLongerVisited { address: 0x1000 })
    );
    assert_eq!(engine.read(0x1000), DispatchSlot::Unvisited);
    assert!(engine.pending_invalidations().is_empty());
}

#[test]
fn test_unsupported_instruction_leaves_slot_visited() {
    let image = GuestImage::new();
    image.load(0x5000, &[asm::li(3, 1), asm::SC, asm::BLR]);
    let engine = manual_engine(&image);

    assert!(engine.request(0x5000));
    let err = engine.compile_next().unwrap().unwrap_err();
    assert_eq!(
        err,
        CompileError::Lower(LowerError::Unsupported {
            address: 0x5004,
            opcode: asm::SC
        })
    );
    assert_eq!(engine.read(0x5000), DispatchSlot::Visited);
    assert!(!engine.request(0x5000));
    assert_eq!(engine.stats().unsupported_lowerings, 1);
    assert_eq!(engine.function_count(), 0);
}

#[test]
fn test_stale_request_is_dropped() {
    let image = straight_line();
    let engine = manual_engine(&image);
    assert!(engine.request(0x1000));
    engine.invalidate(0x1000, 0x1004);

    assert_eq!(engine.process_queue(), 0);
    assert_eq!(engine.queued(), 0);
    assert_eq!(engine.stats().compiled, 0);
}

#[test]
fn test_requests_outside_scope_are_refused() {
    let image = straight_line();
    let config = manual_config()
        .with_code_area_end(0x10_0000)
        .with_address_filter(0x1000, 0x1FFF);
    let engine = Recompiler::new(config, Arc::clone(&image)).unwrap();

    assert!(!engine.request(0x20_0000));
    assert!(!engine.request(0x3000));
    assert!(!engine.request(0x1002));
    assert!(engine.request(0x1000));

    // Writes beyond the code area are not tracked.
    engine.invalidate(0x20_0000, 0x20_0004);
    assert_eq!(engine.stats().invalidations, 0);
}

#[test]
fn test_disabled_engine_is_inert() {
    let image = straight_line();
    let config = manual_config().with_enabled(false);
    let mut engine = Recompiler::new(config, Arc::clone(&image)).unwrap();

    assert!(!engine.request(0x1000));
    assert_eq!(engine.read(0x1000), DispatchSlot::Unvisited);
    assert!(engine.try_enter(0x1000).is_none());
    assert_eq!(engine.process_queue(), 0);
    engine.invalidate(0x1000, 0x1004);
    assert_eq!(engine.stats(), Default::default());
    assert!(matches!(engine.spawn_worker(), Err(EngineError::Disabled)));
}

#[test]
fn test_managed_code_copy_invalidates_touched_words() {
    let image = straight_line();
    let engine = manual_engine(&image);
    compile(&engine, 0x1000);

    engine.managed_code_copy(0x1010, 0);
    assert_eq!(engine.function_count(), 1);
    engine.managed_code_copy(0x1010, 8);
    assert_eq!(engine.function_count(), 1);

    engine.managed_code_copy(0x100E, 1);
    assert_eq!(engine.function_count(), 0);
    assert_eq!(engine.read(0x1000), DispatchSlot::Unvisited);
}

#[test]
fn test_try_enter_requests_compilation() {
    let image = straight_line();
    let engine = manual_engine(&image);

    assert!(engine.try_enter(0x1000).is_none());
    assert_eq!(engine.read(0x1000), DispatchSlot::Visited);
    assert!(engine.try_enter(0x1000).is_none());
    assert_eq!(engine.queued(), 1);

    engine.process_queue();
    assert!(engine.try_enter(0x1000).is_some());
}

#[test]
fn test_shutdown_unregisters_everything() {
    let image = straight_line();
    load_branchy(&image);
    let mut engine = manual_engine(&image);
    compile(&engine, 0x1000);
    assert!(engine.request(0x2000));

    engine.shutdown();
    assert_eq!(engine.read(0x1000), DispatchSlot::Unvisited);
    assert_eq!(engine.read(0x2000), DispatchSlot::Unvisited);
    assert_eq!(engine.function_count(), 0);
    assert_eq!(engine.queued(), 0);

    engine.shutdown();
    assert_eq!(engine.function_count(), 0);
}

#[test]
fn test_worker_compiles_in_background() {
    let image = straight_line();
    let config = EngineConfig::default()
        .with_code_cache_size(1 << 20)
        .with_idle_sleep(Duration::from_micros(100));
    let mut engine = Recompiler::new(config, Arc::clone(&image)).unwrap();
    assert!(engine.spawn_worker().is_ok());

    assert!(engine.request(0x1000));
    let deadline = Instant::now() + Duration::from_secs(10);
    while !engine.read(0x1000).is_compiled() {
        assert!(Instant::now() < deadline, "worker never compiled 0x1000");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(engine.stats().compiled, 1);

    engine.shutdown();
    assert_eq!(engine.read(0x1000), DispatchSlot::Unvisited);
}

#[test]
fn test_config_feeds_lowering_options() {
    let opts = EngineConfig::default()
        .with_accurate_multiply(false)
        .with_cycles_per_instruction(4)
        .lower_options();
    assert!(!opts.accurate_multiply);
    assert_eq!(opts.cycles_per_instruction, 4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_invalidation_leaves_no_dangling_slot(
        start in 0x0FF0u32..0x2020,
        len in 0u32..0x40,
    ) {
        let start = start & !3;
        let end = start + len;
        let image = straight_line();
        load_branchy(&image);
        let engine = manual_engine(&image);
        let ids = [compile(&engine, 0x1000), compile(&engine, 0x2000)];

        engine.invalidate(start, end);
        let once = snapshot(&engine, 0x0FF0, 0x2030);

        for &(addr, slot) in &once.slots {
            if let DispatchSlot::Compiled(native) = slot {
                let owned = ids
                    .iter()
                    .filter_map(|&id| engine.function(id))
                    .any(|f| f.entry_for(addr) == Some(native));
                prop_assert!(owned, "dangling slot at {:#x}", addr);
            }
        }
        for f in ids.iter().filter_map(|&id| engine.function(id)) {
            for r in &f.ranges {
                prop_assert!(!(r.start < end && start < r.end()));
            }
        }

        engine.invalidate(start, end);
        prop_assert_eq!(snapshot(&engine, 0x0FF0, 0x2030), once);
    }
}
