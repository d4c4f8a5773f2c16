//! Instruction Scheduling
//!
//! A list scheduler that reorders the instructions before the terminators of every block. A
//! dependency graph is built from the def/use information of the opcodes, and the ready
//! instruction with the longest latency-weighted path to the end of the block is picked first.
//! Ties keep program order.
//!
//! Besides true (read-after-write) dependencies, the graph has write-after-read and
//! write-after-write edges for registers and the condition flags, because after register
//! allocation unrelated values share registers. Loads depend on the last store, stores on the last
//! store and all loads since, and a call orders everything around it.

#[cfg(test)]
mod test;

use crate::{BasicBlock, Function, Instr, MemEffect, Reg};
use generational_arena::{Arena, Index};
use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
};
use tracing::trace;

pub fn run(function: &mut Function) {
    for block in function.blocks.iter_mut() {
        schedule_block(block);
    }
}

#[derive(Debug)]
struct Node {
    /// Position in the original order.
    position: usize,
    succs: Vec<(Index, u32)>,
    unscheduled_preds: usize,
    priority: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Resource {
    Reg(Reg),
    Flags,
}

struct Dag {
    nodes: Arena<Node>,
    /// Node indices in program order.
    order: Vec<Index>,
}

impl Dag {
    fn build(body: &[Instr]) -> Self {
        let mut edges: HashMap<(usize, usize), u32> = HashMap::new();
        let mut last_def: HashMap<Resource, usize> = HashMap::new();
        let mut readers: HashMap<Resource, Vec<usize>> = HashMap::new();
        let mut last_store: Option<usize> = None;
        let mut loads_since_store: Vec<usize> = Vec::new();
        let mut last_call: Option<usize> = None;

        let mut raw = Vec::new();
        let mut ordering = Vec::new();
        for (j, instr) in body.iter().enumerate() {
            let mut uses: Vec<Resource> = instr.uses().into_iter().map(Resource::Reg).collect();
            let mut defs: Vec<Resource> = instr.defs().into_iter().map(Resource::Reg).collect();
            if instr.reads_flags() {
                uses.push(Resource::Flags);
            }
            if instr.writes_flags() {
                defs.push(Resource::Flags);
            }

            for resource in uses {
                if let Some(&i) = last_def.get(&resource) {
                    raw.push((i, j));
                }
                readers.entry(resource).or_default().push(j);
            }
            for resource in defs {
                for &k in readers.get(&resource).into_iter().flatten() {
                    if k != j {
                        ordering.push((k, j, 0));
                    }
                }
                if let Some(&i) = last_def.get(&resource) {
                    ordering.push((i, j, 1));
                }
                last_def.insert(resource, j);
                readers.remove(&resource);
            }

            match instr.info().memory {
                MemEffect::None => {}
                MemEffect::Load => {
                    raw.extend(last_store.map(|s| (s, j)));
                    loads_since_store.push(j);
                }
                MemEffect::Store => {
                    raw.extend(last_store.map(|s| (s, j)));
                    raw.extend(loads_since_store.drain(..).map(|l| (l, j)));
                    last_store = Some(j);
                }
                MemEffect::Call => {
                    raw.extend((last_call.map_or(0, |c| c)..j).map(|i| (i, j)));
                    loads_since_store.clear();
                    last_store = Some(j);
                    last_call = Some(j);
                }
            }
            if let Some(c) = last_call.filter(|&c| c != j) {
                raw.push((c, j));
            }
        }

        let raw = raw
            .into_iter()
            .map(|(from, to)| (from, to, body[from].opcode.latency()));
        for (from, to, weight) in raw.chain(ordering) {
            let entry = edges.entry((from, to)).or_insert(weight);
            *entry = (*entry).max(weight);
        }

        let mut nodes = Arena::with_capacity(body.len());
        let order: Vec<Index> = (0..body.len())
            .map(|position| {
                nodes.insert(Node {
                    position,
                    succs: Vec::new(),
                    unscheduled_preds: 0,
                    priority: 0,
                })
            })
            .collect();
        let mut edges: Vec<_> = edges.into_iter().collect();
        edges.sort();
        for ((from, to), weight) in edges {
            nodes[order[from]].succs.push((order[to], weight));
            nodes[order[to]].unscheduled_preds += 1;
        }

        // Edges always point forward, so reverse program order visits successors first.
        for &index in order.iter().rev() {
            let priority = nodes[index]
                .succs
                .iter()
                .map(|&(succ, weight)| weight + nodes[succ].priority)
                .max()
                .unwrap_or(0);
            nodes[index].priority = priority;
        }

        Self { nodes, order }
    }

    /// Returns the scheduled order as original positions, or `None` if the graph has a cycle.
    fn schedule(mut self) -> Option<Vec<usize>> {
        let mut ready: BinaryHeap<(u32, Reverse<usize>)> = self
            .order
            .iter()
            .map(|&index| &self.nodes[index])
            .filter(|node| node.unscheduled_preds == 0)
            .map(|node| (node.priority, Reverse(node.position)))
            .collect();

        let mut scheduled = Vec::with_capacity(self.order.len());
        while let Some((_, Reverse(position))) = ready.pop() {
            scheduled.push(position);
            let succs = std::mem::take(&mut self.nodes[self.order[position]].succs);
            for (succ, _) in succs {
                let node = &mut self.nodes[succ];
                node.unscheduled_preds -= 1;
                if node.unscheduled_preds == 0 {
                    ready.push((node.priority, Reverse(node.position)));
                }
            }
        }

        (scheduled.len() == self.order.len()).then_some(scheduled)
    }
}

fn schedule_block(block: &mut BasicBlock) {
    let body_len = block.terminator_start();
    if body_len <= 1 {
        return;
    }

    let Some(order) = Dag::build(&block.instrs[..body_len]).schedule() else {
        trace!(block = %block.name, "dependency cycle, keeping program order");
        return;
    };
    if order.iter().enumerate().all(|(i, &position)| i == position) {
        return;
    }

    let mut body: Vec<Option<Instr>> = block.instrs.drain(..body_len).map(Some).collect();
    let scheduled: Vec<Instr> = order
        .into_iter()
        .filter_map(|position| body[position].take())
        .collect();
    trace!(block = %block.name, "rescheduled {} instructions", scheduled.len());
    block.instrs.splice(0..0, scheduled);
}
