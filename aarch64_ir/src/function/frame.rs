use crate::{Reg, RegClass};

/// The stack frame of a function.
///
/// The frame pointer (`x29`) points at the saved frame pointer and link register pair. Local
/// storage lives right below it and is addressed with negative offsets from `x29`. The
/// callee-saved registers are pushed below the locals, and the arguments of calls that don't fit
/// the argument registers are stored at the bottom:
///
/// ```text
///         | stack arguments    |  x29 + 16 and up
///         | caller's frame     |
/// x29 ->  | saved x29, x30     |  16 bytes
///         | locals             |  locals_size()
///         | callee-saved pairs |  callee_saved_size()
///         | outgoing arguments |  outgoing_size()
///  sp ->  +--------------------+
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Callee-saved registers written by the function, general-purpose ones first, each class
    /// sorted by register number.
    pub callee_saved: Vec<Reg>,
    pub spill_slots: u32,
    /// Bytes of local storage: allocas, block parameter slots and spill slots.
    pub local_bytes: u32,
    /// Bytes needed by the stack arguments of the largest call.
    pub outgoing_bytes: u32,
}

impl FrameInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `size` bytes (rounded up to 8) of local storage and returns its offset from the
    /// frame pointer.
    pub fn alloc_local(&mut self, size: u32) -> i32 {
        self.local_bytes += align_to(size.max(1), 8);
        -(self.local_bytes as i32)
    }

    /// Reserves an 8-byte slot for a spilled register and returns its offset from the frame
    /// pointer.
    pub fn alloc_spill_slot(&mut self) -> i32 {
        self.spill_slots += 1;
        self.alloc_local(8)
    }

    /// Makes room for `bytes` of stack arguments at the bottom of the frame.
    pub fn reserve_outgoing(&mut self, bytes: u32) {
        self.outgoing_bytes = self.outgoing_bytes.max(bytes);
    }

    pub fn outgoing_size(&self) -> u32 {
        align_to(self.outgoing_bytes, 16)
    }

    pub fn locals_size(&self) -> u32 {
        align_to(self.local_bytes, 16)
    }

    pub fn callee_saved_size(&self) -> u32 {
        16 * self.save_groups().len() as u32
    }

    /// Total size of the frame, including the frame record. Always a multiple of 16.
    pub fn frame_size(&self) -> u32 {
        16 + self.locals_size() + self.callee_saved_size() + self.outgoing_size()
    }

    /// Replaces the recorded callee-saved registers, normalizing their order.
    pub fn set_callee_saved(&mut self, regs: impl IntoIterator<Item = Reg>) {
        let mut regs: Vec<_> = regs.into_iter().filter(Reg::is_callee_saved).collect();
        regs.sort_by_key(|reg| (reg.class(), reg.id()));
        regs.dedup();
        self.callee_saved = regs;
    }

    /// Groups the callee-saved registers into the pairs that are saved with a single `stp`. A
    /// register class with an odd number of registers ends in a lone register.
    pub fn save_groups(&self) -> Vec<(Reg, Option<Reg>)> {
        let mut groups = Vec::new();
        for class in [RegClass::Gpr, RegClass::Fpr] {
            let regs: Vec<_> = self
                .callee_saved
                .iter()
                .copied()
                .filter(|reg| reg.class() == class)
                .collect();
            groups.extend(
                regs.chunks(2)
                    .map(|chunk| (chunk[0], chunk.get(1).copied())),
            );
        }
        groups
    }
}

pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
