//! Block Layout
//!
//! Orders the blocks of a function as greedy traces. Starting at the entry block, a trace follows
//! the unconditional branch (or fall-through) at the end of each block as long as its target isn't
//! placed yet. When a trace ends, the next one starts at the lowest numbered unplaced block.
//!
//! Peephole turns the branches that end up pointing at the next block into fall-throughs.

#[cfg(test)]
mod test;

use crate::{instr, BasicBlock, Function, Opcode};
use tracing::debug;
use vec1::Vec1;

pub fn run(function: &mut Function) {
    let order = trace_order(function);
    if order.iter().enumerate().any(|(i, &index)| i != index) {
        debug!(function = %function.name, ?order, "reordering blocks");
        reorder(function, &order);
    }
    fix_fall_throughs(function);
}

/// The new position of every block, as indices into the current order.
fn trace_order(function: &Function) -> Vec<usize> {
    let n = function.blocks.len();
    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);

    let mut current = Some(0);
    while order.len() < n {
        let Some(index) = current.or_else(|| placed.iter().position(|&placed| !placed)) else {
            break;
        };
        placed[index] = true;
        order.push(index);

        current = function.blocks[index]
            .instrs
            .last()
            .filter(|instr| matches!(instr.opcode, Opcode::Br | Opcode::FallThrough))
            .and_then(|instr| instr.branch_target())
            .and_then(|target| function.block_index(target.as_str()))
            .filter(|&target| !placed[target]);
    }

    order
}

fn reorder(function: &mut Function, order: &[usize]) {
    let placeholder = Vec1::new(BasicBlock::new(function.name.clone()));
    let mut slots: Vec<Option<BasicBlock>> = std::mem::replace(&mut function.blocks, placeholder)
        .into_iter()
        .map(Some)
        .collect();

    let mut blocks = order.iter().filter_map(|&index| slots[index].take());
    if let Some(entry) = blocks.next() {
        let mut reordered = Vec1::new(entry);
        reordered.extend(blocks);
        function.blocks = reordered;
    }
}

/// A fall-through only makes sense when its target is the next block. Any other one becomes an
/// explicit branch again.
fn fix_fall_throughs(function: &mut Function) {
    let n = function.blocks.len();
    for index in 0..n {
        let next = (index + 1 < n).then(|| function.blocks[index + 1].name.clone());
        let Some(last) = function.blocks[index].instrs.last_mut() else {
            continue;
        };
        if last.opcode != Opcode::FallThrough {
            continue;
        }
        if let Some(target) = last.branch_target().cloned() {
            if next.as_ref() != Some(&target) {
                *last = instr::b(target);
            }
        }
    }
}
