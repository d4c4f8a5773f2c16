//! Liveness Analysis
//!
//! A backward data-flow analysis over the blocks of a function, iterated until a fixed point is
//! reached. Both virtual and physical registers are tracked, so the same analysis serves the
//! register allocator (before allocation) and the peephole optimizer (after allocation).
//!
//! The stack pointer and the frame pointer are always live and are therefore not tracked.


use crate::{BasicBlock, Function, Instr, Reg};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct LiveSets(Vec<LiveSet>);

impl std::ops::Index<usize> for LiveSets {
    type Output = LiveSet;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSet {
    pub live_ins: HashSet<Reg>,
    pub live_outs: HashSet<Reg>,
}

fn is_tracked(reg: &Reg) -> bool {
    !matches!(*reg, Reg::SP | Reg::FP)
}

/// Updates `live` (the registers live after `instr`) to the registers live before it.
pub fn step_backward(live: &mut HashSet<Reg>, instr: &Instr) {
    for def in instr.defs() {
        live.remove(&def);
    }
    live.extend(instr.uses().into_iter().filter(is_tracked));
}

/// Returns, for every instruction of `block`, the registers that are live right after it.
pub fn live_after_each(block: &BasicBlock, live_outs: &HashSet<Reg>) -> Vec<HashSet<Reg>> {
    let mut live = live_outs.clone();
    let mut result = vec![HashSet::new(); block.instrs.len()];
    for (i, instr) in block.instrs.iter().enumerate().rev() {
        result[i] = live.clone();
        step_backward(&mut live, instr);
    }
    result
}

impl LiveSets {
    pub fn build_from(function: &Function) -> Self {
        let n = function.blocks.len();
        let successors: Vec<Vec<usize>> = (0..n).map(|i| function.successor_indices(i)).collect();

        // Upward-exposed uses and definitions per block.
        let mut gens = Vec::with_capacity(n);
        let mut kills = Vec::with_capacity(n);
        for block in &function.blocks {
            let mut gen = HashSet::new();
            let mut kill = HashSet::new();
            for instr in &block.instrs {
                for reg in instr.uses().into_iter().filter(is_tracked) {
                    if !kill.contains(&reg) {
                        gen.insert(reg);
                    }
                }
                kill.extend(instr.defs());
            }
            gens.push(gen);
            kills.push(kill);
        }

        let mut sets = vec![LiveSet::default(); n];
        let mut changed = true;
        while changed {
            changed = false;
            for i in (0..n).rev() {
                let live_outs: HashSet<Reg> = successors[i]
                    .iter()
                    .flat_map(|&s| sets[s].live_ins.iter().copied())
                    .collect();
                let live_ins: HashSet<Reg> = live_outs
                    .difference(&kills[i])
                    .copied()
                    .chain(gens[i].iter().copied())
                    .collect();
                if live_ins != sets[i].live_ins || live_outs != sets[i].live_outs {
                    sets[i] = LiveSet {
                        live_ins,
                        live_outs,
                    };
                    changed = true;
                }
            }
        }
        LiveSets(sets)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
