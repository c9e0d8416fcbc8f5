use ppcrec_core::types::*;

const ALL_CONDS: [Cond; 14] = [
    Cond::Never,
    Cond::Always,
    Cond::Eq,
    Cond::Ne,
    Cond::Lt,
    Cond::Ge,
    Cond::Le,
    Cond::Gt,
    Cond::Ltu,
    Cond::Geu,
    Cond::Leu,
    Cond::Gtu,
    Cond::TstEq,
    Cond::TstNe,
];

#[test]
fn test_type_sizes() {
    assert_eq!(Type::I32.size_bits(), 32);
    assert_eq!(Type::I64.size_bits(), 64);
    assert_eq!(Type::V128.size_bits(), 128);
    assert_eq!(Type::I32.size_bytes(), 4);
    assert_eq!(Type::V128.size_bytes(), 16);
}

#[test]
fn test_type_classification() {
    assert!(Type::I32.is_integer());
    assert!(Type::I64.is_integer());
    assert!(!Type::I64.is_vector());
    assert!(Type::V128.is_vector());
    assert!(!Type::V128.is_integer());
}

#[test]
fn test_cond_invert() {
    assert_eq!(Cond::Eq.invert(), Cond::Ne);
    assert_eq!(Cond::Lt.invert(), Cond::Ge);
    assert_eq!(Cond::Ltu.invert(), Cond::Geu);
    assert_eq!(Cond::Never.invert(), Cond::Always);
    assert_eq!(Cond::TstEq.invert(), Cond::TstNe);
    for c in ALL_CONDS {
        assert_eq!(c.invert().invert(), c, "invert is not an involution for {:?}", c);
    }
}

#[test]
fn test_cond_swap() {
    assert_eq!(Cond::Lt.swap(), Cond::Gt);
    assert_eq!(Cond::Le.swap(), Cond::Ge);
    assert_eq!(Cond::Gtu.swap(), Cond::Ltu);
    assert_eq!(Cond::Eq.swap(), Cond::Eq);
    for c in ALL_CONDS {
        assert_eq!(c.swap().swap(), c, "swap is not an involution for {:?}", c);
    }
}

#[test]
fn test_cond_raw_encoding() {
    for c in ALL_CONDS {
        assert_eq!(Cond::from_u32(c as u32), c);
    }
    assert!(Cond::Gt.is_signed());
    assert!(Cond::Leu.is_unsigned());
    assert!(Cond::TstNe.is_tst());
    assert!(!Cond::Eq.is_signed() && !Cond::Eq.is_unsigned());
}

#[test]
fn test_memop_constructors() {
    assert_eq!(MemOp::ub().size_bytes(), 1);
    assert!(MemOp::sb().is_signed());
    assert_eq!(MemOp::uw().size_bytes(), 2);
    assert!(MemOp::sw().is_signed());
    assert_eq!(MemOp::ul().size_bytes(), 4);
    assert_eq!(MemOp::uq().size_bytes(), 8);
}

#[test]
fn test_memop_big_endian() {
    let op = MemOp::ul().be();
    assert!(op.is_bswap());
    assert_eq!(op.size_bytes(), 4);
    assert!(!op.is_signed());
    assert!(!MemOp::ul().is_bswap());
    assert_eq!(MemOp::new(MemOp::SIZE_32 | MemOp::BSWAP), op);
}

#[test]
fn test_regset_operations() {
    let empty = RegSet::EMPTY;
    assert!(empty.is_empty());
    assert_eq!(empty.first(), None);

    let a = RegSet::EMPTY.set(1).set(3).set(5);
    let b = RegSet::EMPTY.set(3).set(5).set(7);
    assert_eq!(a.first(), Some(1));
    assert_eq!(a.union(b).count(), 4);
    assert_eq!(a.intersect(b), RegSet::EMPTY.set(3).set(5));
    assert_eq!(a.subtract(b), RegSet::EMPTY.set(1));
    assert!(!a.clear(3).contains(3));
}
