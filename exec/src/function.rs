use ppcrec_frontend::GuestRange;

use crate::dispatch_table::NativeEntry;
use crate::range_registry::RangeHandle;

/// Index of a committed function in the engine's function list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub(crate) u32);

/// A guest function with native code, as committed to the dispatch
/// table and range registry.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    /// Address the compile was requested for.
    pub guest_address: u32,
    /// Bytes from the lowest covered address to the highest.
    pub guest_size: u32,
    /// Start of the function's native code.
    pub native_code: NativeEntry,
    pub native_size: usize,
    pub ranges: Vec<GuestRange>,
    /// Enterable guest addresses and their native entry points.
    pub entries: Vec<(u32, NativeEntry)>,
    pub(crate) handles: Vec<RangeHandle>,
}

impl CompiledFunction {
    pub fn contains(&self, addr: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(addr))
    }

    pub fn entry_for(&self, addr: u32) -> Option<NativeEntry> {
        self.entries
            .iter()
            .find(|&&(guest, _)| guest == addr)
            .map(|&(_, native)| native)
    }
}

/// Slot list of committed functions. Ids of removed functions are
/// reused.
#[derive(Debug, Default)]
pub(crate) struct FunctionList {
    slots: Vec<Option<CompiledFunction>>,
    free: Vec<u32>,
}

impl FunctionList {
    pub fn insert(&mut self, func: CompiledFunction) -> FunctionId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(func);
                FunctionId(id)
            }
            None => {
                self.slots.push(Some(func));
                FunctionId(self.slots.len() as u32 - 1)
            }
        }
    }

    pub fn get(&self, id: FunctionId) -> Option<&CompiledFunction> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut CompiledFunction> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn remove(&mut self, id: FunctionId) -> Option<CompiledFunction> {
        let func = self.slots.get_mut(id.0 as usize)?.take()?;
        self.free.push(id.0);
        Some(func)
    }

    pub fn ids(&self) -> Vec<FunctionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_some())
            .map(|(i, _)| FunctionId(i as u32))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
