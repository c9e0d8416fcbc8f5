use ppcrec_core::op::LifeData;
use ppcrec_core::temp::TempKind;
use ppcrec_core::{Context, OpFlags, Opcode};

/// Backward liveness over each segment, filling in `Op::life`.
///
/// Guest register globals are live out of every segment and every
/// basic-block end, so their last read inside a block is also where
/// the allocator must sync them back to `PpcState`.
pub fn liveness_analysis(ctx: &mut Context) {
    let is_global: Vec<bool> = ctx
        .temps()
        .iter()
        .map(|t| t.kind == TempKind::Global)
        .collect();
    let nb_globals = ctx.nb_globals() as usize;

    for sid in 0..ctx.num_segments() {
        let mut live = vec![false; is_global.len()];
        live[..nb_globals].fill(true);

        for op in ctx.segment_mut(sid).ops.iter_mut().rev() {
            let def = op.opc.def();
            if def.flags.contains(OpFlags::BB_END) {
                live[..nb_globals].fill(true);
            }
            if op.opc == Opcode::InsnStart {
                continue;
            }

            let mut life = LifeData::default();
            let nb_oargs = op.oargs().len();
            for (n, t) in op.oargs().iter().enumerate() {
                if let Some(slot) = live.get_mut(t.0 as usize) {
                    if !*slot {
                        life.set_dead(n as u32);
                    }
                    *slot = false;
                }
            }
            for (i, t) in op.iargs().iter().enumerate() {
                let n = (nb_oargs + i) as u32;
                let idx = t.0 as usize;
                if let Some(slot) = live.get_mut(idx) {
                    if !*slot {
                        life.set_dead(n);
                        if is_global[idx] {
                            life.set_sync(n);
                        }
                    }
                    *slot = true;
                }
            }
            op.life = life;
        }
    }
}
