use crate::{
    dfa::liveness::{live_after_each, LiveSets},
    Function, Reg,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Every instruction `g` (numbered across all blocks in order) has a use slot `2g` and a def slot
/// `2g + 1`. A register read and a register written by the same instruction therefore don't
/// overlap.
pub(super) fn use_slot(g: u32) -> u32 {
    2 * g
}

pub(super) fn def_slot(g: u32) -> u32 {
    2 * g + 1
}

/// The live range of a virtual register, as a single conservative range of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Interval {
    pub reg: Reg,
    pub start: u32,
    pub end: u32,
}

impl Interval {
    fn extend(&mut self, slot: u32) {
        self.start = self.start.min(slot);
        self.end = self.end.max(slot);
    }
}

/// The slots at which physical registers hold a value or get clobbered, as sorted, disjoint
/// segments.
#[derive(Debug, Clone, Default)]
pub(super) struct FixedRanges(HashMap<Reg, Vec<(u32, u32)>>);

impl FixedRanges {
    pub fn conflicts(&self, reg: Reg, interval: &Interval) -> bool {
        self.0.get(&reg).is_some_and(|segments| {
            segments
                .iter()
                .any(|&(start, end)| start <= interval.end && interval.start <= end)
        })
    }
}

/// Builds the intervals of all virtual registers, sorted by start (then by id), together with
/// the fixed ranges of the physical registers.
pub(super) fn build(function: &Function) -> (Vec<Interval>, FixedRanges) {
    let live_sets = LiveSets::build_from(function);
    let mut intervals: BTreeMap<Reg, Interval> = BTreeMap::new();
    let mut fixed_points: HashMap<Reg, BTreeSet<u32>> = HashMap::new();

    let mut extend = |reg: Reg, slot: u32| {
        if reg.is_virtual() {
            intervals
                .entry(reg)
                .or_insert(Interval {
                    reg,
                    start: slot,
                    end: slot,
                })
                .extend(slot);
        } else {
            fixed_points.entry(reg).or_default().insert(slot);
        }
    };

    let mut g = 0;
    for (index, block) in function.blocks.iter().enumerate() {
        if block.instrs.is_empty() {
            continue;
        }
        let first = g;
        let last = g + block.instrs.len() as u32 - 1;
        for &reg in &live_sets[index].live_ins {
            extend(reg, use_slot(first));
        }
        for &reg in &live_sets[index].live_outs {
            extend(reg, def_slot(last));
        }

        let live_after = live_after_each(block, &live_sets[index].live_outs);
        for (instr, live_after) in block.instrs.iter().zip(live_after) {
            for reg in instr.uses() {
                extend(reg, use_slot(g));
            }
            for reg in instr.defs() {
                extend(reg, def_slot(g));
            }
            // Virtual registers only need their extremes; physical registers are tracked at
            // every slot they are live across.
            for reg in live_after.into_iter().filter(Reg::is_phys) {
                extend(reg, def_slot(g));
                extend(reg, use_slot(g + 1));
            }
            g += 1;
        }
    }

    let mut intervals: Vec<Interval> = intervals.into_values().collect();
    intervals.sort_by_key(|interval| (interval.start, interval.reg.id()));

    let fixed = fixed_points
        .into_iter()
        .map(|(reg, points)| {
            let mut segments: Vec<(u32, u32)> = Vec::new();
            for point in points {
                match segments.last_mut() {
                    Some((_, end)) if *end + 1 >= point => *end = point,
                    _ => segments.push((point, point)),
                }
            }
            (reg, segments)
        })
        .collect();

    (intervals, FixedRanges(fixed))
}
