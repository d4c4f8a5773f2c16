#[cfg(test)]
mod test;

use crate::{instr, Abi, BasicBlock, Function, Instr, Label, Opcode, Operand, Reg, TargetInfo};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    #[error("virtual register {reg} reached the emitter in `{function}`")]
    VirtualRegister { function: String, reg: Reg },
    #[error("failed to write assembly")]
    Fmt(#[from] fmt::Error),
}

pub type EmitResult = Result<(), EmitError>;

/// Largest immediate of a single `add`/`sub` of the stack pointer.
const MAX_SP_ADJUST: u32 = 4095;

/// Can be used to format allocated [`Function`]s as AArch64 assembly to a writer.
///
/// A mutable reference to the writer---an implementor of [`std::fmt::Write`]---must be passed to
/// [`new`](AsmOutputter::new) together with the target. Then a module can be formatted with
/// [`write_module`](AsmOutputter::write_module).
///
/// # Validity of output
///
/// The output only assembles if:
///
///  - No virtual registers are present. The outputter reports them as an error.
///  - Every block ends in a terminator and every `FallThrough` targets the block right after it.
///  - The frame info of every function covers all frame pointer relative accesses.
pub struct AsmOutputter<'w, W: fmt::Write> {
    writer: &'w mut W,
    target: TargetInfo,
}

impl<'w, W: fmt::Write> AsmOutputter<'w, W> {
    pub fn new(writer: &'w mut W, target: TargetInfo) -> Self {
        Self { writer, target }
    }

    pub fn write_module(&mut self, functions: &[Function]) -> EmitResult {
        if functions.is_empty() {
            return Ok(());
        }

        self.write_directive(".text")?;
        for (i, function) in functions.iter().enumerate() {
            if i != 0 {
                self.writeln()?;
            }
            self.write_function(function)?;
        }
        Ok(())
    }

    pub fn write_function(&mut self, function: &Function) -> EmitResult {
        let symbol = self.target.mangle(function.name.as_str());
        self.write_directive(&format!(".globl {symbol}"))?;
        self.write_directive(".p2align 2")?;
        if self.target.abi == Abi::Linux {
            self.write_directive(&format!(".type {symbol}, @function"))?;
        }
        writeln!(self.writer, "{symbol}:")?;

        self.write_prologue(function)?;
        for block in &function.blocks {
            self.write_block(function, block)?;
        }

        if self.target.abi == Abi::Linux {
            self.write_directive(&format!(".size {symbol}, .-{symbol}"))?;
        }
        Ok(())
    }

    fn write_prologue(&mut self, function: &Function) -> EmitResult {
        self.write_line("stp x29, x30, [sp, #-16]!")?;
        self.write_line("mov x29, sp")?;

        self.adjust_sp("sub", function.frame.locals_size())?;

        for (first, second) in function.frame.save_groups() {
            match second {
                Some(second) => self.write_line(&format!("stp {first}, {second}, [sp, #-16]!"))?,
                None => self.write_line(&format!("str {first}, [sp, #-16]!"))?,
            }
        }
        self.adjust_sp("sub", function.frame.outgoing_size())
    }

    fn write_epilogue(&mut self, function: &Function) -> EmitResult {
        self.adjust_sp("add", function.frame.outgoing_size())?;
        for (first, second) in function.frame.save_groups().into_iter().rev() {
            match second {
                Some(second) => self.write_line(&format!("ldp {first}, {second}, [sp], #16"))?,
                None => self.write_line(&format!("ldr {first}, [sp], #16"))?,
            }
        }
        if function.frame.locals_size() > 0 {
            self.write_line("mov sp, x29")?;
        }
        self.write_line("ldp x29, x30, [sp], #16")?;
        self.write_line("ret")
    }

    /// Moves the stack pointer by `bytes` with `op` (`add` or `sub`), in steps the immediate can
    /// encode.
    fn adjust_sp(&mut self, op: &str, bytes: u32) -> EmitResult {
        let mut remaining = bytes;
        while remaining > 0 {
            let chunk = remaining.min(MAX_SP_ADJUST);
            self.write_line(&format!("{op} sp, sp, #{chunk}"))?;
            remaining -= chunk;
        }
        Ok(())
    }

    fn write_block(&mut self, function: &Function, block: &BasicBlock) -> EmitResult {
        let label = self
            .target
            .local_label(function.name.as_str(), block.name.as_str());
        writeln!(self.writer, "{label}:")?;
        for instr in &block.instrs {
            self.write_instr(function, instr)?;
        }
        Ok(())
    }

    pub fn write_instr(&mut self, function: &Function, instr: &Instr) -> EmitResult {
        if let Some(reg) = instr.regs().find(|reg| reg.is_virtual()) {
            return Err(EmitError::VirtualRegister {
                function: function.name.to_string(),
                reg,
            });
        }

        match instr.opcode {
            Opcode::FallThrough => Ok(()),
            Opcode::Ret => self.write_epilogue(function),
            _ => match instr.mem() {
                Some((base, offset)) if !fits_offset(instr.opcode, offset) => {
                    self.write_with_scratch_base(function, instr, base, offset)
                }
                _ => self.write_asm(function, instr),
            },
        }
    }

    /// Computes the address of an out-of-range memory operand into `x16` first.
    fn write_with_scratch_base(
        &mut self,
        function: &Function,
        instr: &Instr,
        base: Reg,
        offset: i32,
    ) -> EmitResult {
        for load in instr::materialize_imm(Reg::IP0, offset as i64) {
            self.write_asm(function, &load)?;
        }
        self.write_asm(function, &instr::add(Reg::IP0, base, Reg::IP0))?;

        let mut instr = instr.clone();
        for operand in instr.operands.iter_mut() {
            if let Operand::Mem { .. } = operand {
                *operand = Operand::Mem {
                    base: Reg::IP0,
                    offset: 0,
                };
            }
        }
        self.write_asm(function, &instr)
    }

    fn write_asm(&mut self, function: &Function, instr: &Instr) -> EmitResult {
        let target = &self.target;
        let label = |label: &Label| match instr.opcode {
            Opcode::Bl => target.mangle(label.as_str()),
            _ => target.local_label(function.name.as_str(), label.as_str()),
        };
        self.writer.write_str("  ")?;
        instr.write_asm(&mut *self.writer, &label)?;
        self.writeln()
    }

    fn write_directive(&mut self, directive: &str) -> EmitResult {
        self.write_line(directive)
    }

    /// Writes an indented line.
    fn write_line(&mut self, line: &str) -> EmitResult {
        writeln!(self.writer, "  {line}")?;
        Ok(())
    }

    /// Writes a single newline character.
    #[inline]
    fn writeln(&mut self) -> EmitResult {
        self.writer.write_char('\n')?;
        Ok(())
    }
}

/// Returns `true` if the memory operand of an `opcode` access can encode `offset` directly,
/// either as an unscaled signed 9-bit offset or as a scaled unsigned 12-bit one.
fn fits_offset(opcode: Opcode, offset: i32) -> bool {
    let size = match opcode {
        Opcode::Ldp | Opcode::Stp => {
            return offset % 8 == 0 && (-512..=504).contains(&offset);
        }
        Opcode::Ldr | Opcode::Str | Opcode::LdrD | Opcode::StrD => 8,
        Opcode::LdrSw | Opcode::StrW => 4,
        _ => 1,
    };
    (-256..=255).contains(&offset) || (offset >= 0 && offset % size == 0 && offset / size <= 4095)
}
