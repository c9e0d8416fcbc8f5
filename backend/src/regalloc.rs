use crate::code_buffer::CodeBuffer;
use crate::constraint::OpConstraint;
use crate::x86_64::regs::NUM_REGS;
use crate::{EmitError, HostCodeGen};
use ppcrec_core::label::RelocKind;
use ppcrec_core::temp::TempKind;
use ppcrec_core::types::{RegSet, TempVal};
use ppcrec_core::{Context, Op, OpFlags, Opcode, SegmentId, TempIdx, Type};
use tracing::trace;

/// Worst-case host bytes emitted for a single IR op, including the
/// spills and reloads the allocator inserts around it.
const MAX_OP_BYTES: usize = 256;

/// One native entry point produced while emitting a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEntry {
    pub guest_address: u32,
    pub offset: usize,
}

/// Local register allocator walking one function segment by segment.
///
/// Every segment starts and ends in the same canonical state: guest
/// registers in `PpcState`, nothing but fixed temps in host registers.
/// That is what lets any segment be entered directly and lets branches
/// jump between segments without reconciling register assignments.
struct Allocator<'a, B: HostCodeGen> {
    ctx: &'a mut Context,
    backend: &'a B,
    buf: &'a mut CodeBuffer,
    owner: [Option<TempIdx>; NUM_REGS],
    free: RegSet,
    allocatable: RegSet,
}

impl<'a, B: HostCodeGen> Allocator<'a, B> {
    fn new(ctx: &'a mut Context, backend: &'a B, buf: &'a mut CodeBuffer) -> Self {
        let allocatable = backend
            .allocatable_regs(Type::I64)
            .union(backend.allocatable_regs(Type::V128));
        let mut ra = Self {
            ctx,
            backend,
            buf,
            owner: [None; NUM_REGS],
            free: allocatable,
            allocatable,
        };
        for i in 0..ra.ctx.nb_globals() {
            let t = TempIdx(i);
            let temp = ra.ctx.temp(t);
            if let (TempKind::Fixed, Some(reg)) = (temp.kind, temp.reg) {
                ra.bind(reg, t);
            }
        }
        ra
    }

    fn bind(&mut self, reg: u8, t: TempIdx) {
        self.owner[reg as usize] = Some(t);
        self.free = self.free.clear(reg);
    }

    fn unbind(&mut self, reg: u8) {
        self.owner[reg as usize] = None;
        if self.allocatable.contains(reg) {
            self.free = self.free.set(reg);
        }
    }

    /// Record that `t` now lives in `reg` and nowhere else.
    fn place_in(&mut self, t: TempIdx, reg: u8) {
        self.bind(reg, t);
        let temp = self.ctx.temp_mut(t);
        temp.val_type = TempVal::Reg;
        temp.reg = Some(reg);
    }

    /// Move a live temp from `from` to `to`.
    fn relocate(&mut self, t: TempIdx, from: u8, to: u8) {
        let ty = self.ctx.temp(t).ty;
        self.backend.out_mov(self.buf, ty, to, from);
        self.unbind(from);
        self.bind(to, t);
        self.ctx.temp_mut(t).reg = Some(to);
    }

    /// Turn a constant that was materialized into a register back
    /// into an immediate.
    fn forget_const(&mut self, t: TempIdx) {
        if let Some(reg) = self.ctx.temp(t).reg {
            self.unbind(reg);
        }
        let temp = self.ctx.temp_mut(t);
        temp.val_type = TempVal::Const;
        temp.reg = None;
    }

    /// Store a dirty global register copy back to `PpcState`.
    fn write_back(&mut self, t: TempIdx) {
        let temp = self.ctx.temp(t);
        if temp.mem_coherent || temp.val_type != TempVal::Reg {
            return;
        }
        let base = temp.mem_base.and_then(|b| self.ctx.temp(b).reg);
        if let (Some(reg), Some(base)) = (temp.reg, base) {
            self.backend
                .out_st(self.buf, temp.ty, reg, base, temp.mem_offset);
        }
        self.ctx.temp_mut(t).mem_coherent = true;
    }

    fn globals(&self) -> Vec<TempIdx> {
        (0..self.ctx.nb_globals()).map(TempIdx).collect()
    }

    fn write_back_globals(&mut self) {
        for t in self.globals() {
            if self.ctx.temp(t).is_global() {
                self.write_back(t);
            }
        }
    }

    /// Forget every global's register copy. Globals must be written
    /// back first.
    fn drop_globals(&mut self) {
        for t in self.globals() {
            let temp = self.ctx.temp(t);
            if !temp.is_global() {
                continue;
            }
            debug_assert!(temp.val_type != TempVal::Reg || temp.mem_coherent);
            if let Some(reg) = temp.reg {
                self.unbind(reg);
            }
            let temp = self.ctx.temp_mut(t);
            temp.val_type = TempVal::Mem;
            temp.reg = None;
            temp.mem_coherent = true;
        }
    }

    /// Make `reg` free, spilling or moving its occupant.
    fn evict(&mut self, reg: u8, opc: Opcode) -> Result<(), EmitError> {
        let Some(t) = self.owner[reg as usize] else {
            return Ok(());
        };
        let temp = self.ctx.temp(t);
        let (ty, kind) = (temp.ty, temp.kind);
        match kind {
            TempKind::Global => {
                self.write_back(t);
                self.unbind(reg);
                let temp = self.ctx.temp_mut(t);
                temp.val_type = TempVal::Mem;
                temp.reg = None;
            }
            TempKind::Const => self.forget_const(t),
            TempKind::Fixed => return Err(EmitError::OutOfRegisters(opc)),
            TempKind::Ebb => {
                let spare = self
                    .free
                    .intersect(self.backend.allocatable_regs(ty))
                    .clear(reg)
                    .first()
                    .ok_or(EmitError::OutOfRegisters(opc))?;
                self.relocate(t, reg, spare);
            }
        }
        Ok(())
    }

    /// Pick a register in `want` outside `avoid`, evicting if none is
    /// free.
    fn pick(&mut self, want: RegSet, avoid: RegSet, opc: Opcode) -> Result<u8, EmitError> {
        let candidates = want.intersect(self.allocatable).subtract(avoid);
        if let Some(reg) = candidates.intersect(self.free).first() {
            return Ok(reg);
        }
        let reg = candidates.first().ok_or(EmitError::OutOfRegisters(opc))?;
        self.evict(reg, opc)?;
        Ok(reg)
    }

    /// Get `t` into a register from `want` outside `avoid`.
    fn load(
        &mut self,
        t: TempIdx,
        want: RegSet,
        avoid: RegSet,
        opc: Opcode,
    ) -> Result<u8, EmitError> {
        let temp = self.ctx.temp(t);
        let (ty, val, is_fixed) = (temp.ty, temp.val, temp.is_fixed());
        let (base, offset) = (temp.mem_base, temp.mem_offset);
        match (temp.val_type, temp.reg) {
            (TempVal::Reg, Some(cur)) => {
                // Fixed temps live outside the allocatable set and are
                // read in place whatever the constraint asks for.
                if is_fixed || (want.contains(cur) && !avoid.contains(cur)) {
                    return Ok(cur);
                }
                let reg = self.pick(want, avoid, opc)?;
                self.relocate(t, cur, reg);
                Ok(reg)
            }
            (TempVal::Reg, None) => Err(EmitError::OutOfRegisters(opc)),
            (TempVal::Const, _) => {
                let reg = self.pick(want, avoid, opc)?;
                self.backend.out_movi(self.buf, ty, reg, val);
                self.place_in(t, reg);
                Ok(reg)
            }
            (TempVal::Mem, _) => {
                let reg = self.pick(want, avoid, opc)?;
                if let Some(base) = base.and_then(|b| self.ctx.temp(b).reg) {
                    self.backend.out_ld(self.buf, ty, reg, base, offset);
                }
                self.place_in(t, reg);
                self.ctx.temp_mut(t).mem_coherent = true;
                Ok(reg)
            }
            // Read before written in this segment: any register holds
            // an equally undefined value.
            (TempVal::Dead, _) => {
                let reg = self.pick(want, avoid, opc)?;
                self.place_in(t, reg);
                Ok(reg)
            }
        }
    }

    /// Release `t` after its last use. Globals and fixed temps keep
    /// their home.
    fn kill(&mut self, t: TempIdx) {
        let temp = self.ctx.temp(t);
        if temp.is_global_or_fixed() {
            return;
        }
        if temp.is_const() {
            self.forget_const(t);
            return;
        }
        if let Some(reg) = temp.reg {
            self.unbind(reg);
        }
        let temp = self.ctx.temp_mut(t);
        temp.val_type = TempVal::Dead;
        temp.reg = None;
    }

    /// `t` was just written into `reg`.
    fn define(&mut self, t: TempIdx, reg: u8) {
        let temp = self.ctx.temp(t);
        if let (TempVal::Reg, Some(old)) = (temp.val_type, temp.reg) {
            if old != reg && self.owner[old as usize] == Some(t) {
                self.unbind(old);
            }
        }
        self.place_in(t, reg);
        self.ctx.temp_mut(t).mem_coherent = false;
    }

    /// Allocate and emit an ordinary op following its constraint.
    fn emit_generic(&mut self, op: &Op, ct: &OpConstraint) -> Result<(), EmitError> {
        let opc = op.opc;
        let life = op.life;
        let outs = op.oargs();
        let ins = op.iargs();
        let nout = outs.len();

        let mut iregs = [0u8; 8];
        let mut taken = RegSet::EMPTY;
        let mut reusable = [false; 8];
        for (i, &t) in ins.iter().enumerate() {
            let arg = &ct.args[nout + i];
            let dies = life.is_dead((nout + i) as u32);
            let temp = self.ctx.temp(t);
            let shared = temp.is_global_or_fixed() || temp.is_const();
            let reg = self.load(t, arg.regs, taken, opc)?;
            iregs[i] = reg;
            taken = taken.set(reg);
            reusable[i] = arg.ialias && dies && !shared;
        }

        // Loading a later input can evict an earlier one to another
        // register.
        taken = RegSet::EMPTY;
        for (i, &t) in ins.iter().enumerate() {
            let temp = self.ctx.temp(t);
            if let (TempVal::Reg, Some(reg)) = (temp.val_type, temp.reg) {
                iregs[i] = reg;
                taken = taken.set(reg);
            }
        }

        for (i, &t) in ins.iter().enumerate() {
            if life.is_dead((nout + i) as u32) {
                self.kill(t);
            }
        }

        let mut oregs = [0u8; 8];
        let mut defined = RegSet::EMPTY;
        for (k, &t) in outs.iter().enumerate() {
            let arg = &ct.args[k];
            let reg = if arg.oalias {
                let ai = arg.alias_index as usize;
                let reg = iregs[ai];
                let src = ins[ai];
                if !reusable[ai] && self.owner[reg as usize] == Some(src) {
                    if self.ctx.temp(src).is_const() {
                        self.forget_const(src);
                    } else if self.ctx.temp(src).is_fixed() {
                        return Err(EmitError::OutOfRegisters(opc));
                    } else {
                        // The aliased input stays live: move it out of
                        // the way of the output.
                        let class = self.backend.allocatable_regs(self.ctx.temp(src).ty);
                        let spare = self.pick(class, taken.union(defined), opc)?;
                        self.relocate(src, reg, spare);
                    }
                }
                reg
            } else if arg.newreg {
                self.pick(arg.regs, taken.union(defined), opc)?
            } else {
                self.pick(arg.regs, defined, opc)?
            };
            self.define(t, reg);
            oregs[k] = reg;
            defined = defined.set(reg);
        }

        let cargs: Vec<u32> = op.cargs().iter().map(|c| c.0).collect();
        self.backend
            .out_op(self.buf, self.ctx, op, &oregs[..nout], &iregs[..ins.len()], &cargs);

        for (k, &t) in outs.iter().enumerate() {
            if life.is_dead(k as u32) {
                self.kill(t);
            }
        }
        for (i, &t) in ins.iter().enumerate() {
            if life.is_sync((nout + i) as u32) {
                self.write_back(t);
            }
        }
        Ok(())
    }

    fn emit_mov(&mut self, op: &Op) -> Result<(), EmitError> {
        let (dst, src) = (op.args[0], op.args[1]);
        let class = self.backend.allocatable_regs(op.op_type);
        let src_reg = self.load(src, class, RegSet::EMPTY, op.opc)?;
        if op.life.is_dead(1) {
            self.kill(src);
        }
        let dst_reg = match self.owner[src_reg as usize] {
            None => src_reg,
            Some(_) => self.pick(class, RegSet::EMPTY, op.opc)?,
        };
        self.define(dst, dst_reg);
        self.backend.out_mov(self.buf, op.op_type, dst_reg, src_reg);
        if op.life.is_dead(0) {
            self.kill(dst);
        }
        Ok(())
    }

    /// Globals go back to memory and live locals leave the registers a
    /// helper call may clobber.
    fn spill_for_call(&mut self) -> Result<(), EmitError> {
        self.write_back_globals();
        self.drop_globals();
        let clobbered = self.backend.call_clobbered_regs();
        for reg in (0..NUM_REGS as u8).filter(|&r| clobbered.contains(r)) {
            let Some(t) = self.owner[reg as usize] else {
                continue;
            };
            let temp = self.ctx.temp(t);
            if temp.is_const() {
                self.forget_const(t);
                continue;
            }
            let safe = self
                .free
                .intersect(self.backend.allocatable_regs(temp.ty))
                .subtract(clobbered)
                .first()
                .ok_or(EmitError::OutOfRegisters(Opcode::Call))?;
            self.relocate(t, reg, safe);
        }
        Ok(())
    }

    /// Return to the canonical segment-boundary state.
    fn settle(&mut self) {
        self.write_back_globals();
        self.drop_globals();
        for i in self.ctx.nb_globals()..self.ctx.nb_temps() {
            let t = TempIdx(i);
            if let Some(reg) = self.ctx.temp(t).reg {
                self.unbind(reg);
            }
            let temp = self.ctx.temp_mut(t);
            temp.val_type = match temp.kind {
                TempKind::Const => TempVal::Const,
                _ => TempVal::Dead,
            };
            temp.reg = None;
        }
    }

    /// Bind `label` here and patch the jumps that were waiting for it.
    fn place_label(&mut self, label: u32) -> Result<(), EmitError> {
        let here = self.buf.offset();
        for site in self.ctx.label_mut(label).place(here) {
            match site.kind {
                RelocKind::Rel32 => {
                    let disp = i32::try_from(here as i64 - (site.offset as i64 + 4))
                        .map_err(|_| EmitError::BranchOutOfRange)?;
                    self.buf.patch_u32(site.offset, disp as u32);
                }
            }
        }
        Ok(())
    }

    /// The branch just emitted ends in a rel32 to `label`; remember it
    /// if the label is still ahead.
    fn note_forward_jump(&mut self, label: u32, was_placed: bool) {
        if !was_placed {
            let at = self.buf.offset() - 4;
            self.ctx.label_mut(label).add_use(at, RelocKind::Rel32);
        }
    }

    fn emit_brcond(&mut self, op: &Op, label: u32, cargs: &[u32]) -> Result<(), EmitError> {
        let ct = self.backend.op_constraint(op.opc);
        let nout = op.oargs().len();
        let mut iregs = Vec::new();
        let mut taken = RegSet::EMPTY;
        for (i, &t) in op.iargs().iter().enumerate() {
            let reg = self.load(t, ct.args[nout + i].regs, taken, op.opc)?;
            iregs.push(reg);
            taken = taken.set(reg);
        }
        for (i, &t) in op.iargs().iter().enumerate() {
            if op.life.is_dead((nout + i) as u32) {
                self.kill(t);
            }
        }
        self.write_back_globals();

        let placed = self.ctx.label(label).is_placed();
        self.backend.out_op(self.buf, self.ctx, op, &[], &iregs, cargs);
        self.note_forward_jump(label, placed);
        Ok(())
    }

    fn emit_segment(&mut self, sid: SegmentId) -> Result<(), EmitError> {
        let num_ops = self.ctx.segment(sid).ops.len();
        for oi in 0..num_ops {
            if !self.buf.has_room(MAX_OP_BYTES) {
                return Err(EmitError::CodeBufferFull);
            }
            let op = self.ctx.segment(sid).ops[oi].clone();
            let cargs: Vec<u32> = op.cargs().iter().map(|c| c.0).collect();
            match op.opc {
                Opcode::InsnStart => {}
                Opcode::Mov => self.emit_mov(&op)?,
                Opcode::Br => {
                    self.write_back_globals();
                    let placed = self.ctx.label(cargs[0]).is_placed();
                    self.backend.out_op(self.buf, self.ctx, &op, &[], &[], &cargs);
                    self.note_forward_jump(cargs[0], placed);
                }
                Opcode::Exit | Opcode::CheckCycles => {
                    self.write_back_globals();
                    self.backend.out_op(self.buf, self.ctx, &op, &[], &[], &cargs);
                }
                Opcode::BrCond => self.emit_brcond(&op, cargs[1], &cargs)?,
                Opcode::Call => {
                    self.spill_for_call()?;
                    self.backend.out_op(self.buf, self.ctx, &op, &[], &[], &cargs);
                }
                _ => {
                    let ct = self.backend.op_constraint(op.opc);
                    self.emit_generic(&op, ct)?;
                    if op.opc.def().flags.contains(OpFlags::BB_END) {
                        self.write_back_globals();
                    }
                }
            }
        }
        Ok(())
    }
}

/// Allocate registers and emit host code for every segment of the
/// function in order. Returns the native entry points of all
/// enterable segments.
pub fn regalloc_and_codegen(
    ctx: &mut Context,
    backend: &impl HostCodeGen,
    buf: &mut CodeBuffer,
) -> Result<Vec<SegmentEntry>, EmitError> {
    let mut ra = Allocator::new(ctx, backend, buf);
    let mut entries = Vec::new();
    for sid in 0..ra.ctx.num_segments() {
        ra.settle();
        let seg = ra.ctx.segment(sid);
        let enter = seg.is_enterable.then_some(seg.enter_guest_address);
        let label = seg.label;
        ra.place_label(label)?;
        let offset = ra.buf.offset();
        if let Some(guest_address) = enter {
            entries.push(SegmentEntry {
                guest_address,
                offset,
            });
        }
        trace!(segment = sid, offset, "emit segment");
        ra.emit_segment(sid)?;
    }
    ra.settle();

    if ra.ctx.labels().iter().any(|l| l.has_pending_uses()) {
        return Err(EmitError::BranchOutOfRange);
    }
    Ok(entries)
}
