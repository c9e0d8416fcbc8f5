use crate::types::{TempVal, Type};

/// How long a temp lives and where its value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TempKind {
    /// Scratch value, dead at the end of its segment.
    Ebb,
    /// Guest register backed by a `PpcState` field.
    Global,
    /// Pinned to one host register for the whole function.
    Fixed,
    Const,
}

/// Index into the Context's temp pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempIdx(pub u32);

/// An IR temporary together with its register allocation state.
#[derive(Debug, Clone)]
pub struct Temp {
    pub ty: Type,
    pub kind: TempKind,
    pub val_type: TempVal,
    /// Host register holding the value while `val_type` is `Reg`.
    pub reg: Option<u8>,
    /// The `PpcState` copy matches the register copy.
    pub mem_coherent: bool,
    /// Immediate of a `Const` temp.
    pub val: u64,
    /// State pointer and byte offset of a `Global` temp.
    pub mem_base: Option<TempIdx>,
    pub mem_offset: i64,
    pub name: Option<&'static str>,
}

impl Temp {
    fn with_kind(kind: TempKind, ty: Type, val_type: TempVal) -> Self {
        Self {
            ty,
            kind,
            val_type,
            reg: None,
            mem_coherent: false,
            val: 0,
            mem_base: None,
            mem_offset: 0,
            name: None,
        }
    }

    pub fn new_ebb(ty: Type) -> Self {
        Self::with_kind(TempKind::Ebb, ty, TempVal::Dead)
    }

    pub fn new_const(ty: Type, val: u64) -> Self {
        Self {
            val,
            ..Self::with_kind(TempKind::Const, ty, TempVal::Const)
        }
    }

    /// A guest register living at `base + offset`.
    pub fn new_global(ty: Type, base: TempIdx, offset: i64, name: &'static str) -> Self {
        Self {
            mem_coherent: true,
            mem_base: Some(base),
            mem_offset: offset,
            name: Some(name),
            ..Self::with_kind(TempKind::Global, ty, TempVal::Mem)
        }
    }

    pub fn new_fixed(ty: Type, reg: u8, name: &'static str) -> Self {
        Self {
            reg: Some(reg),
            name: Some(name),
            ..Self::with_kind(TempKind::Fixed, ty, TempVal::Reg)
        }
    }

    pub fn is_const(&self) -> bool {
        self.kind == TempKind::Const
    }

    pub fn is_global(&self) -> bool {
        self.kind == TempKind::Global
    }

    pub fn is_fixed(&self) -> bool {
        self.kind == TempKind::Fixed
    }

    /// Outlives a segment, so it must be in place at every boundary.
    pub fn is_global_or_fixed(&self) -> bool {
        self.is_global() || self.is_fixed()
    }
}
