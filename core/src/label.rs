/// A branch target label within a compiled function.
///
/// Every segment owns one label. Branches may reference a label
/// before its segment is emitted; the emitter records a use and
/// back-patches it once the segment's native offset is known.
#[derive(Debug, Clone)]
pub struct Label {
    pub id: u32,
    /// Resolved offset in the host code buffer, once placed.
    pub value: Option<usize>,
    /// Forward references that need back-patching when the label is
    /// resolved.
    pub uses: Vec<LabelUse>,
}

/// A forward reference to a label: where the displacement field of
/// a branch was emitted.
#[derive(Debug, Clone, Copy)]
pub struct LabelUse {
    /// Offset in the code buffer of the displacement field.
    pub offset: usize,
    pub kind: RelocKind,
}

/// Relocation types for label back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// 32-bit displacement relative to the end of the field.
    Rel32,
}

impl Label {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            value: None,
            uses: Vec::new(),
        }
    }

    pub fn is_placed(&self) -> bool {
        self.value.is_some()
    }

    /// Record a forward reference to this label.
    pub fn add_use(&mut self, offset: usize, kind: RelocKind) {
        self.uses.push(LabelUse { offset, kind });
    }

    /// Place the label and hand back the uses that now need patching.
    pub fn place(&mut self, offset: usize) -> Vec<LabelUse> {
        self.value = Some(offset);
        std::mem::take(&mut self.uses)
    }

    /// Whether there are unresolved forward references.
    pub fn has_pending_uses(&self) -> bool {
        !self.uses.is_empty() && self.value.is_none()
    }
}
