use crate::{instr, Function, Instr, Reg, RegClass};
use std::collections::HashSet;
use tracing::trace;

fn load(class: RegClass, rt: Reg, offset: i32) -> Instr {
    match class {
        RegClass::Gpr => instr::ldr(rt, Reg::FP, offset),
        RegClass::Fpr => instr::ldr_d(rt, Reg::FP, offset),
    }
}

fn store(class: RegClass, rt: Reg, offset: i32) -> Instr {
    match class {
        RegClass::Gpr => instr::str(rt, Reg::FP, offset),
        RegClass::Fpr => instr::str_d(rt, Reg::FP, offset),
    }
}

/// Moves `reg` to a fresh spill slot.
///
/// Every instruction that references `reg` gets its own temporary instead: a load from the slot
/// before an instruction that reads it and a store to the slot after one that writes it. The
/// temporaries are added to `unspillable`, since spilling them again wouldn't make them any
/// shorter.
pub(super) fn spill(function: &mut Function, reg: Reg, unspillable: &mut HashSet<Reg>) {
    let class = reg.class();
    let offset = function.frame.alloc_spill_slot();
    trace!(function = %function.name, %reg, offset, "spilling");

    for block_index in 0..function.blocks.len() {
        let old = std::mem::take(&mut function.blocks[block_index].instrs);
        let mut new = Vec::with_capacity(old.len());
        for mut instr in old {
            let used = instr.uses().contains(&reg);
            let defined = instr.defs().contains(&reg);
            if !used && !defined {
                new.push(instr);
                continue;
            }

            let temp = function.vregs.next_of_class(class);
            unspillable.insert(temp);
            for operand_reg in instr.regs_mut() {
                if *operand_reg == reg {
                    *operand_reg = temp;
                }
            }
            if used {
                new.push(load(class, temp, offset));
            }
            new.push(instr);
            if defined {
                new.push(store(class, temp, offset));
            }
        }
        function.blocks[block_index].instrs = new;
    }
}
