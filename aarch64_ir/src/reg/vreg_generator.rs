use crate::{Reg, RegClass};

/// Generates fresh virtual registers. Ids are dense and shared by both register classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VRegGenerator {
    next: u32,
}

impl VRegGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_of_class(&mut self, class: RegClass) -> Reg {
        let id = self.next;
        self.next += 1;
        Reg::Virtual(class, id)
    }

    pub fn next_gpr(&mut self) -> Reg {
        self.next_of_class(RegClass::Gpr)
    }

    pub fn next_fpr(&mut self) -> Reg {
        self.next_of_class(RegClass::Fpr)
    }

    /// The number of virtual registers handed out so far.
    pub fn count(&self) -> u32 {
        self.next
    }
}
