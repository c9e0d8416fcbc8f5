use ppcrec_core::op::MAX_OP_ARGS;
use ppcrec_core::opcode::*;
use ppcrec_core::types::Type;

fn assert_def(opc: Opcode, nb_oargs: u8, nb_iargs: u8, nb_cargs: u8, flags: OpFlags) {
    let def = opc.def();
    assert_eq!(def.nb_oargs, nb_oargs, "{:?} nb_oargs", opc);
    assert_eq!(def.nb_iargs, nb_iargs, "{:?} nb_iargs", opc);
    assert_eq!(def.nb_cargs, nb_cargs, "{:?} nb_cargs", opc);
    assert!(
        def.nb_args() as usize <= MAX_OP_ARGS,
        "{:?} args exceed MAX_OP_ARGS",
        opc
    );
    assert_eq!(def.flags.bits(), flags.bits(), "{:?} flags", opc);
}

fn assert_group(
    seen: &mut [bool],
    ops: &[Opcode],
    nb_oargs: u8,
    nb_iargs: u8,
    nb_cargs: u8,
    flags: OpFlags,
) {
    for &opc in ops {
        let idx = opc as usize;
        assert!(!seen[idx], "opcode {:?} duplicated", opc);
        seen[idx] = true;
        assert_def(opc, nb_oargs, nb_iargs, nb_cargs, flags);
    }
}

#[test]
fn test_def_table_size() {
    assert_eq!(OPCODE_DEFS.len(), Opcode::Count as usize);
}

#[test]
fn test_def_lookup() {
    let def = Opcode::Add.def();
    assert_eq!(def.name, "add");
    assert_eq!(def.nb_args(), 3);
    assert!(def.flags.contains(OpFlags::INT));
}

#[test]
fn test_int_polymorphic() {
    assert!(Opcode::Add.is_int_polymorphic());
    assert!(Opcode::RotL.is_int_polymorphic());
    assert!(Opcode::GuestLd.is_int_polymorphic());
    assert!(!Opcode::ExtI32I64.is_int_polymorphic());
    assert!(!Opcode::Br.is_int_polymorphic());
    assert!(!Opcode::FAddPair.is_int_polymorphic());
}

#[test]
fn test_fixed_type() {
    assert_eq!(Opcode::ExtI32I64.fixed_type(), Some(Type::I64));
    assert_eq!(Opcode::ExtrlI64I32.fixed_type(), Some(Type::I32));
    assert_eq!(Opcode::FCmpBottom.fixed_type(), Some(Type::I32));
    assert_eq!(Opcode::FToDoubleBits.fixed_type(), Some(Type::I64));
    assert_eq!(Opcode::FMulPair.fixed_type(), Some(Type::V128));
    assert_eq!(Opcode::Add.fixed_type(), None);
}

#[test]
fn test_control_flow_flags() {
    assert!(Opcode::Br.def().flags.contains(OpFlags::BB_END));
    let brcond = Opcode::BrCond.def();
    assert!(brcond.flags.contains(OpFlags::BB_END));
    assert!(brcond.flags.contains(OpFlags::COND_BRANCH));
    let exit = Opcode::Exit.def();
    assert!(exit.flags.contains(OpFlags::BB_EXIT));
    assert!(exit.flags.contains(OpFlags::BB_END));
    assert!(!Opcode::CheckCycles.def().flags.contains(OpFlags::BB_END));
    assert!(Opcode::Call.def().flags.contains(OpFlags::CALL_CLOBBER));
}

#[test]
fn test_names_unique() {
    let mut names: Vec<&str> = OPCODE_DEFS.iter().map(|d| d.name).collect();
    let len_before = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), len_before, "duplicate opcode names found");
}

#[test]
fn test_def_full_coverage() {
    let int = OpFlags::INT;
    let np = OpFlags::NOT_PRESENT;
    let se = OpFlags::SIDE_EFFECTS;
    let cc = OpFlags::CALL_CLOBBER;
    let be = OpFlags::BB_END;
    let bx = OpFlags::BB_EXIT;
    let cb = OpFlags::COND_BRANCH;
    let fp = OpFlags::FLOAT;
    let none = OpFlags::NONE;

    let mut seen = vec![false; Opcode::Count as usize];

    assert_group(&mut seen, &[Opcode::Mov], 1, 1, 0, int.union(np));
    assert_group(&mut seen, &[Opcode::SetCond], 1, 2, 1, int);
    assert_group(
        &mut seen,
        &[
            Opcode::Add,
            Opcode::Sub,
            Opcode::Mul,
            Opcode::And,
            Opcode::Or,
            Opcode::Xor,
            Opcode::Shl,
            Opcode::Shr,
            Opcode::Sar,
            Opcode::RotL,
        ],
        1,
        2,
        0,
        int,
    );
    assert_group(
        &mut seen,
        &[
            Opcode::Neg,
            Opcode::Not,
            Opcode::Clz,
            Opcode::Ext8S,
            Opcode::Ext16S,
        ],
        1,
        1,
        0,
        int,
    );
    assert_group(
        &mut seen,
        &[
            Opcode::ExtI32I64,
            Opcode::ExtUI32I64,
            Opcode::ExtrlI64I32,
            Opcode::ExtrhI64I32,
        ],
        1,
        1,
        0,
        none,
    );
    assert_group(&mut seen, &[Opcode::Ld], 1, 1, 1, int);
    assert_group(&mut seen, &[Opcode::St], 0, 2, 1, int.union(se));
    assert_group(&mut seen, &[Opcode::GuestLd], 1, 1, 1, int.union(se));
    assert_group(&mut seen, &[Opcode::GuestSt], 0, 2, 1, int.union(se));
    assert_group(&mut seen, &[Opcode::Br], 0, 0, 1, be.union(se));
    assert_group(
        &mut seen,
        &[Opcode::BrCond],
        0,
        2,
        2,
        int.union(be).union(cb).union(se),
    );
    assert_group(&mut seen, &[Opcode::Exit], 0, 0, 1, be.union(bx).union(se));
    assert_group(&mut seen, &[Opcode::CountCycles], 0, 0, 2, se);
    assert_group(&mut seen, &[Opcode::CheckCycles], 0, 0, 3, se);
    assert_group(&mut seen, &[Opcode::Call], 0, 0, 5, cc.union(se));
    assert_group(&mut seen, &[Opcode::InsnStart], 0, 0, 1, np);

    assert_group(
        &mut seen,
        &[
            Opcode::FAddBottom,
            Opcode::FSubBottom,
            Opcode::FMulBottom,
            Opcode::FDivBottom,
            Opcode::FAddPair,
            Opcode::FSubPair,
            Opcode::FMulPair,
            Opcode::FDivPair,
            Opcode::FOr,
            Opcode::FAndNot,
            Opcode::FFromDoubleBits,
        ],
        1,
        2,
        0,
        fp,
    );
    assert_group(
        &mut seen,
        &[
            Opcode::FRoundSingleBottom,
            Opcode::FRoundSinglePair,
            Opcode::FNegBottom,
            Opcode::FNegPair,
            Opcode::FAbsBottom,
            Opcode::FAbsPair,
            Opcode::FNAbsBottom,
            Opcode::FNAbsPair,
            Opcode::FZeroMask,
            Opcode::FClearTop,
            Opcode::FFromSingleBits,
            Opcode::FToSingleBits,
            Opcode::FToDoubleBits,
        ],
        1,
        1,
        0,
        fp,
    );
    assert_group(&mut seen, &[Opcode::FShuffle, Opcode::FCmpBottom], 1, 2, 1, fp);
    assert_group(&mut seen, &[Opcode::FSelect], 1, 3, 0, fp);

    for (idx, covered) in seen.iter().enumerate() {
        assert!(covered, "opcode #{idx} ({}) not checked", OPCODE_DEFS[idx].name);
    }
}
