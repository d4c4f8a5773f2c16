//! Register Allocation
//!
//! A linear scan allocator. Virtual registers get a single live range over the instructions
//! numbered in block order (see [`intervals`]), which are assigned the lowest numbered free
//! register of their class that isn't otherwise occupied by a physical register at that point.
//!
//! When no register is free, the interval that ends furthest away among the current one and the
//! active ones of the same class is spilled. Spilled registers are rewritten to short-lived
//! temporaries around loads and stores of a frame slot, after which allocation starts over.


mod intervals;
mod spilling;

use crate::{Function, Reg, RegClass, TargetInfo};
use intervals::{FixedRanges, Interval};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Allocation starts over after every round that spilled. Every round spills at least one of the
/// registers that lowering introduced, so this only bounds pathological inputs.
const MAX_ROUNDS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegAllocError {
    #[error("ran out of {class} registers in `{function}`")]
    Exhausted { function: String, class: RegClass },
}

pub fn run(function: &mut Function, target: &TargetInfo) -> Result<(), RegAllocError> {
    let mut unspillable = HashSet::new();
    for round in 0..MAX_ROUNDS {
        let (intervals, fixed) = intervals::build(function);
        let outcome = scan(&intervals, &fixed, target, &unspillable).map_err(|class| {
            RegAllocError::Exhausted {
                function: function.name.to_string(),
                class,
            }
        })?;
        match outcome {
            ScanOutcome::Assigned(assignment) => {
                debug!(
                    function = %function.name,
                    rounds = round + 1,
                    spill_slots = function.frame.spill_slots,
                    "allocated registers"
                );
                apply(function, &assignment);
                return Ok(());
            }
            ScanOutcome::Spill(regs) => {
                for reg in regs {
                    spilling::spill(function, reg, &mut unspillable);
                }
            }
        }
    }

    let class = function
        .instrs()
        .flat_map(|instr| instr.regs())
        .find(Reg::is_virtual)
        .map_or(RegClass::Gpr, |reg| reg.class());
    Err(RegAllocError::Exhausted {
        function: function.name.to_string(),
        class,
    })
}

enum ScanOutcome {
    Assigned(HashMap<Reg, Reg>),
    /// Registers to spill before trying again.
    Spill(Vec<Reg>),
}

struct Active {
    interval: Interval,
    phys: Reg,
}

/// Runs a linear scan over `intervals`. Fails with the exhausted register class if an unspillable
/// interval can't be assigned.
fn scan(
    intervals: &[Interval],
    fixed: &FixedRanges,
    target: &TargetInfo,
    unspillable: &HashSet<Reg>,
) -> Result<ScanOutcome, RegClass> {
    let allocatable = [
        target.allocatable(RegClass::Gpr),
        target.allocatable(RegClass::Fpr),
    ];
    let mut assignment = HashMap::new();
    let mut active: Vec<Active> = Vec::new();
    let mut spilled = Vec::new();

    for interval in intervals {
        active.retain(|a| a.interval.end >= interval.start);
        let class = interval.reg.class();
        let candidates = &allocatable[class as usize];

        let free = candidates.iter().copied().find(|&phys| {
            !active.iter().any(|a| a.phys == phys) && !fixed.conflicts(phys, interval)
        });
        if let Some(phys) = free {
            assignment.insert(interval.reg, phys);
            active.push(Active {
                interval: *interval,
                phys,
            });
            continue;
        }

        // Only active intervals whose register the current one could take are candidates.
        let victim = active
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.interval.reg.class() == class
                    && !unspillable.contains(&a.interval.reg)
                    && !fixed.conflicts(a.phys, interval)
            })
            .max_by_key(|(_, a)| (a.interval.end, a.interval.reg.id()))
            .map(|(i, a)| (i, a.interval.end));

        let self_spillable = !unspillable.contains(&interval.reg);
        match victim {
            Some((i, end)) if !self_spillable || end > interval.end => {
                let victim = active.swap_remove(i);
                assignment.remove(&victim.interval.reg);
                spilled.push(victim.interval.reg);
                assignment.insert(interval.reg, victim.phys);
                active.push(Active {
                    interval: *interval,
                    phys: victim.phys,
                });
            }
            _ if self_spillable => spilled.push(interval.reg),
            _ => return Err(class),
        }
    }

    if spilled.is_empty() {
        Ok(ScanOutcome::Assigned(assignment))
    } else {
        Ok(ScanOutcome::Spill(spilled))
    }
}

/// Rewrites every virtual register to its assigned register and records the callee-saved
/// registers the function writes.
fn apply(function: &mut Function, assignment: &HashMap<Reg, Reg>) {
    for block in function.blocks.iter_mut() {
        for instr in &mut block.instrs {
            for reg in instr.regs_mut() {
                if let Some(&phys) = assignment.get(reg) {
                    *reg = phys;
                }
            }
        }
    }
    let written: Vec<Reg> = function.instrs().flat_map(|instr| instr.defs()).collect();
    function.frame.set_callee_saved(written);
}
