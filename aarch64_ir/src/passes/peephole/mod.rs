//! Peephole Optimization
//!
//! Local rewrites on allocated code. Every block is rewritten until none of the patterns apply
//! anymore, using post-allocation liveness to check that a register a rewrite drops isn't needed
//! afterwards. Liveness is recomputed until no block changes.
//!
//! Afterwards branches to the next block become fall-throughs, conditional branches are inverted
//! where that saves a jump, and callee-saved registers that are no longer written are dropped from
//! the frame.


use crate::{
    dfa::liveness::{live_after_each, LiveSets},
    instr, BasicBlock, Cond, Function, Instr, Opcode, Reg,
};
use std::collections::HashSet;
use tracing::{debug, trace};

pub fn run(function: &mut Function) {
    let mut rounds = 0;
    loop {
        rounds += 1;
        let live_sets = LiveSets::build_from(function);
        let reads_flags_first: Vec<bool> = function
            .blocks
            .iter()
            .map(|block| flags_live_from(&block.instrs, false))
            .collect();

        let mut changed = false;
        for index in 0..function.blocks.len() {
            let flags_live_out = function
                .successor_indices(index)
                .into_iter()
                .any(|succ| reads_flags_first[succ]);
            changed |= simplify_block(
                &mut function.blocks[index],
                &live_sets[index].live_outs,
                flags_live_out,
            );
        }
        if !changed {
            break;
        }
    }

    rewrite_branches(function);
    prune_callee_saved(function);
    debug!(function = %function.name, rounds, "peephole done");
}

/// Whether the flags are read by `instrs` before they are written, or `live_out` if neither
/// happens.
fn flags_live_from(instrs: &[Instr], live_out: bool) -> bool {
    for instr in instrs {
        if instr.reads_flags() {
            return true;
        }
        if instr.writes_flags() {
            return false;
        }
    }
    live_out
}

struct Rewrite {
    name: &'static str,
    start: usize,
    len: usize,
    replacement: Vec<Instr>,
}

impl Rewrite {
    fn new(name: &'static str, start: usize, len: usize, replacement: Vec<Instr>) -> Self {
        Self {
            name,
            start,
            len,
            replacement,
        }
    }
}

fn simplify_block(
    block: &mut BasicBlock,
    live_outs: &HashSet<Reg>,
    flags_live_out: bool,
) -> bool {
    let mut changed = false;
    while let Some(rewrite) = find_rewrite(block, live_outs, flags_live_out) {
        trace!(
            block = %block.name,
            at = rewrite.start,
            "{}",
            rewrite.name
        );
        block.instrs.splice(
            rewrite.start..rewrite.start + rewrite.len,
            rewrite.replacement,
        );
        changed = true;
    }
    changed
}

fn find_rewrite(
    block: &BasicBlock,
    live_outs: &HashSet<Reg>,
    flags_live_out: bool,
) -> Option<Rewrite> {
    let instrs = &block.instrs;
    let live_after = live_after_each(block, live_outs);

    for i in 0..instrs.len() {
        if let Some(rewrite) = single(&instrs[i]) {
            return Some(Rewrite::new(rewrite.0, i, 1, rewrite.1));
        }
        if i + 1 == instrs.len() {
            break;
        }

        let (first, second) = (&instrs[i], &instrs[i + 1]);
        let dead_after_pair = |reg: Reg| !live_after[i + 1].contains(&reg);
        let flags_live = || flags_live_from(&instrs[i + 2..], flags_live_out);
        let rewrite = forward_move(first, second, dead_after_pair)
            .map(|instr| ("forward move", instr))
            .or_else(|| {
                fuse_multiply_add(first, second, dead_after_pair).map(|instr| ("fuse madd", instr))
            })
            .or_else(|| {
                fuse_compare_branch(first, second, flags_live())
                    .map(|instr| ("fuse compare and branch", instr))
            })
            .or_else(|| pair_memory(first, second).map(|instr| ("pair load/store", instr)));
        if let Some((name, instr)) = rewrite {
            return Some(Rewrite::new(name, i, 2, vec![instr]));
        }
    }
    None
}

/// Rewrites of a single instruction: identity moves are dropped, and arithmetic with a zero
/// immediate becomes a move.
fn single(instr: &Instr) -> Option<(&'static str, Vec<Instr>)> {
    match instr.opcode {
        Opcode::MovRR | Opcode::FMovRR if instr.reg(0) == instr.reg(1) => {
            Some(("remove identity move", vec![]))
        }
        Opcode::AddRI | Opcode::SubRI | Opcode::LslRI | Opcode::LsrRI | Opcode::AsrRI
            if instr.imm(2) == Some(0) =>
        {
            let (rd, rn) = (instr.reg(0)?, instr.reg(1)?);
            if rd == Reg::SP || rn == Reg::SP {
                return None;
            }
            Some(("fold zero immediate", vec![instr::mov(rd, rn)]))
        }
        _ => None,
    }
}

/// `mov a, b; mov c, a` with `a` dead afterwards becomes `mov c, b`.
fn forward_move(first: &Instr, second: &Instr, dead: impl Fn(Reg) -> bool) -> Option<Instr> {
    let same_kind = matches!(
        (first.opcode, second.opcode),
        (Opcode::MovRR, Opcode::MovRR) | (Opcode::FMovRR, Opcode::FMovRR)
    );
    if !same_kind {
        return None;
    }
    let (a, b) = (first.reg(0)?, first.reg(1)?);
    let (c, source) = (second.reg(0)?, second.reg(1)?);
    if source != a || c == a || !dead(a) {
        return None;
    }
    Some(match first.opcode {
        Opcode::FMovRR => instr::fmov(c, b),
        _ => instr::mov(c, b),
    })
}

/// `mul t, a, b; add d, c, t` with `t` dead afterwards becomes `madd d, a, b, c`.
fn fuse_multiply_add(first: &Instr, second: &Instr, dead: impl Fn(Reg) -> bool) -> Option<Instr> {
    if first.opcode != Opcode::MulRRR || second.opcode != Opcode::AddRRR {
        return None;
    }
    let (t, a, b) = (first.reg(0)?, first.reg(1)?, first.reg(2)?);
    let (d, n, m) = (second.reg(0)?, second.reg(1)?, second.reg(2)?);
    let addend = match (n == t, m == t) {
        (true, false) => m,
        (false, true) => n,
        _ => return None,
    };
    if !dead(t) && d != t {
        return None;
    }
    Some(instr::madd(d, a, b, addend))
}

/// `cmp r, #0; b.eq L` becomes `cbz r, L` (and `b.ne` becomes `cbnz`) when nothing reads the
/// flags afterwards.
fn fuse_compare_branch(first: &Instr, second: &Instr, flags_live: bool) -> Option<Instr> {
    if first.opcode != Opcode::CmpRI || first.imm(1) != Some(0) || second.opcode != Opcode::BCond
    {
        return None;
    }
    if flags_live {
        return None;
    }
    let reg = first.reg(0)?;
    let target = second.branch_target()?.clone();
    match second.operands.first().and_then(|operand| operand.as_cond())? {
        Cond::Eq => Some(instr::cbz(reg, target)),
        Cond::Ne => Some(instr::cbnz(reg, target)),
        _ => None,
    }
}

/// Whether `offset` can be encoded in the scaled 7-bit immediate of a 64-bit `ldp`/`stp`.
fn is_pair_offset(offset: i32) -> bool {
    offset % 8 == 0 && (-512..=504).contains(&offset)
}

/// Two frame pointer relative 64-bit loads (or stores) of adjacent slots become one `ldp` (or
/// `stp`).
fn pair_memory(first: &Instr, second: &Instr) -> Option<Instr> {
    let pair: fn(Reg, Reg, Reg, i32) -> Instr = match (first.opcode, second.opcode) {
        (Opcode::Ldr, Opcode::Ldr) => instr::ldp,
        (Opcode::Str, Opcode::Str) => instr::stp,
        _ => return None,
    };
    let (r1, (base1, offset1)) = (first.reg(0)?, first.mem()?);
    let (r2, (base2, offset2)) = (second.reg(0)?, second.mem()?);
    if base1 != Reg::FP || base2 != Reg::FP || r1 == r2 {
        return None;
    }
    // A load into the base register would change the address of the second one.
    if first.opcode == Opcode::Ldr && (r1 == Reg::FP || r2 == Reg::FP) {
        return None;
    }
    let (low, high, offset) = if offset2 == offset1 + 8 {
        (r1, r2, offset1)
    } else if offset1 == offset2 + 8 {
        (r2, r1, offset2)
    } else {
        return None;
    };
    if !is_pair_offset(offset) {
        return None;
    }
    Some(pair(low, high, Reg::FP, offset))
}

/// Turns branches to the next block into fall-throughs, inverting a conditional branch to the
/// next block where that removes the unconditional one behind it.
fn rewrite_branches(function: &mut Function) {
    for index in 0..function.blocks.len() - 1 {
        let next = function.blocks[index + 1].name.clone();
        let block = &mut function.blocks[index];
        let len = block.instrs.len();

        if len >= 2 {
            let (conditional, last) = (&block.instrs[len - 2], &block.instrs[len - 1]);
            let inverted = (last.opcode == Opcode::Br
                && conditional.branch_target() == Some(&next)
                && last.branch_target() != Some(&next))
                .then(|| invert(conditional, last.branch_target()?.clone()))
                .flatten();
            if let Some(inverted) = inverted {
                trace!(block = %block.name, "invert branch to {next}");
                block.instrs.truncate(len - 2);
                block.instrs.push(inverted);
                block.instrs.push(instr::fall_through(next));
                continue;
            }
        }

        if let Some(last) = block.instrs.last_mut() {
            if last.opcode == Opcode::Br && last.branch_target() == Some(&next) {
                trace!(block = %block.name, "fall through to {next}");
                *last = instr::fall_through(next);
            }
        }
    }
}

/// The conditional branch `instr` with its condition inverted and retargeted to `target`.
fn invert(instr: &Instr, target: crate::Label) -> Option<Instr> {
    match instr.opcode {
        Opcode::BCond => {
            let cond = instr.operands.first()?.as_cond()?;
            Some(instr::b_cond(cond.invert(), target))
        }
        Opcode::Cbz => Some(instr::cbnz(instr.reg(0)?, target)),
        Opcode::Cbnz => Some(instr::cbz(instr.reg(0)?, target)),
        _ => None,
    }
}

fn prune_callee_saved(function: &mut Function) {
    let written: HashSet<Reg> = function.instrs().flat_map(|instr| instr.defs()).collect();
    function
        .frame
        .callee_saved
        .retain(|reg| written.contains(reg));
}
