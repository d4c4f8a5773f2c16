/// The closed set of machine opcodes.
///
/// The suffix names the operand layout: `RRR` is three registers, `RI` is register(s) followed by
/// an immediate. Memory opcodes take their address as a single [`Operand::Mem`](crate::Operand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `mov rd, rs`
    MovRR,
    /// `mov rd, #imm` for immediates the assembler can encode with a single instruction.
    MovRI,
    /// `movz rd, #imm16, lsl #shift`
    MovZ,
    /// `movk rd, #imm16, lsl #shift`, keeps the other bits of `rd`.
    MovK,
    /// `fmov dd, ds`
    FMovRR,
    /// `fmov dd, xs`, moves the raw bits of a general-purpose register.
    FMovGR,

    AddRRR,
    SubRRR,
    MulRRR,
    SDivRRR,
    UDivRRR,
    AndRRR,
    OrrRRR,
    EorRRR,
    LslRRR,
    LsrRRR,
    AsrRRR,
    /// `madd rd, rn, rm, ra`: `rd = ra + rn * rm`
    MAddRRRR,
    /// `msub rd, rn, rm, ra`: `rd = ra - rn * rm`
    MSubRRRR,
    /// `smulh rd, rn, rm`: the high 64 bits of the signed 128-bit product.
    SMulHRRR,
    /// `adds rd, rn, rm`, sets the flags.
    AddsRRR,
    /// `subs rd, rn, rm`, sets the flags.
    SubsRRR,
    /// `sxtw xd, wn`: sign-extends the low 32 bits of `rn`.
    SxtW,
    /// `mov wd, wn`: zero-extends the low 32 bits of `rn`.
    UxtW,

    AddRI,
    SubRI,
    LslRI,
    LsrRI,
    AsrRI,

    CmpRR,
    CmpRI,
    TstRR,
    /// `cset rd, cond`
    Cset,

    FAddRRR,
    FSubRRR,
    FMulRRR,
    FDivRRR,
    FCmpRR,
    /// `scvtf dd, xn`
    SCvtF,
    /// `fcvtzs xd, dn`
    FCvtZS,
    /// `ucvtf dd, xn`
    UCvtF,
    /// `fcvtzu xd, dn`
    FCvtZU,

    Ldr,
    /// Loads 32 bits and sign-extends them to 64.
    LdrSw,
    LdrB,
    LdrD,
    Str,
    /// Stores the low 32 bits.
    StrW,
    StrB,
    StrD,
    Ldp,
    Stp,

    /// `b label`
    Br,
    /// `b.cond label`
    BCond,
    Cbz,
    Cbnz,
    /// `bl label`. The two immediates count the general-purpose and floating-point argument
    /// registers that carry arguments, so that they can be treated as used by the call.
    Bl,
    /// `ret`. The optional register operand is the return value register, which is used.
    Ret,
    /// Control continues with the next block. Emits nothing.
    FallThrough,
}

/// How an opcode touches memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemEffect {
    None,
    Load,
    Store,
    /// Calls may read and write any memory.
    Call,
}

/// Static information about an [`Opcode`].
///
/// `defs` and `uses` are operand indices. A memory operand listed as a use contributes its base
/// register. Implicit registers (argument registers and clobbers of a call) are not listed here;
/// see [`Instr::defs`](crate::Instr::defs) and [`Instr::uses`](crate::Instr::uses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub defs: &'static [usize],
    pub uses: &'static [usize],
    pub reads_flags: bool,
    pub writes_flags: bool,
    pub memory: MemEffect,
    pub is_terminator: bool,
    /// Cycles until the result is available to a dependent instruction.
    pub latency: u32,
}

const fn op(mnemonic: &'static str, defs: &'static [usize], uses: &'static [usize]) -> OpcodeInfo {
    OpcodeInfo {
        mnemonic,
        defs,
        uses,
        reads_flags: false,
        writes_flags: false,
        memory: MemEffect::None,
        is_terminator: false,
        latency: 1,
    }
}

impl OpcodeInfo {
    const fn latency(self, latency: u32) -> Self {
        Self { latency, ..self }
    }

    const fn reads_flags(self) -> Self {
        Self {
            reads_flags: true,
            ..self
        }
    }

    const fn writes_flags(self) -> Self {
        Self {
            writes_flags: true,
            ..self
        }
    }

    const fn memory(self, memory: MemEffect) -> Self {
        Self { memory, ..self }
    }

    const fn terminator(self) -> Self {
        Self {
            is_terminator: true,
            ..self
        }
    }
}

const RRR: (&[usize], &[usize]) = (&[0], &[1, 2]);
const RI: (&[usize], &[usize]) = (&[0], &[1]);
const LOAD_LATENCY: u32 = 4;
const MUL_LATENCY: u32 = 3;
const FP_LATENCY: u32 = 3;

impl Opcode {
    pub fn info(self) -> OpcodeInfo {
        use Opcode::*;
        match self {
            MovRR => op("mov", &[0], &[1]),
            MovRI => op("mov", &[0], &[]),
            MovZ => op("movz", &[0], &[]),
            MovK => op("movk", &[0], &[0]),
            FMovRR => op("fmov", &[0], &[1]),
            FMovGR => op("fmov", &[0], &[1]),

            AddRRR => op("add", RRR.0, RRR.1),
            SubRRR => op("sub", RRR.0, RRR.1),
            MulRRR => op("mul", RRR.0, RRR.1).latency(MUL_LATENCY),
            SDivRRR => op("sdiv", RRR.0, RRR.1).latency(MUL_LATENCY),
            UDivRRR => op("udiv", RRR.0, RRR.1).latency(MUL_LATENCY),
            AndRRR => op("and", RRR.0, RRR.1),
            OrrRRR => op("orr", RRR.0, RRR.1),
            EorRRR => op("eor", RRR.0, RRR.1),
            LslRRR => op("lsl", RRR.0, RRR.1),
            LsrRRR => op("lsr", RRR.0, RRR.1),
            AsrRRR => op("asr", RRR.0, RRR.1),
            MAddRRRR => op("madd", &[0], &[1, 2, 3]).latency(MUL_LATENCY),
            MSubRRRR => op("msub", &[0], &[1, 2, 3]).latency(MUL_LATENCY),
            SMulHRRR => op("smulh", RRR.0, RRR.1).latency(MUL_LATENCY),
            AddsRRR => op("adds", RRR.0, RRR.1).writes_flags(),
            SubsRRR => op("subs", RRR.0, RRR.1).writes_flags(),
            SxtW => op("sxtw", &[0], &[1]),
            UxtW => op("mov", &[0], &[1]),

            AddRI => op("add", RI.0, RI.1),
            SubRI => op("sub", RI.0, RI.1),
            LslRI => op("lsl", RI.0, RI.1),
            LsrRI => op("lsr", RI.0, RI.1),
            AsrRI => op("asr", RI.0, RI.1),

            CmpRR => op("cmp", &[], &[0, 1]).writes_flags(),
            CmpRI => op("cmp", &[], &[0]).writes_flags(),
            TstRR => op("tst", &[], &[0, 1]).writes_flags(),
            Cset => op("cset", &[0], &[]).reads_flags(),

            FAddRRR => op("fadd", RRR.0, RRR.1).latency(FP_LATENCY),
            FSubRRR => op("fsub", RRR.0, RRR.1).latency(FP_LATENCY),
            FMulRRR => op("fmul", RRR.0, RRR.1).latency(FP_LATENCY),
            FDivRRR => op("fdiv", RRR.0, RRR.1).latency(FP_LATENCY),
            FCmpRR => op("fcmp", &[], &[0, 1]).writes_flags(),
            SCvtF => op("scvtf", &[0], &[1]).latency(FP_LATENCY),
            FCvtZS => op("fcvtzs", &[0], &[1]).latency(FP_LATENCY),
            UCvtF => op("ucvtf", &[0], &[1]).latency(FP_LATENCY),
            FCvtZU => op("fcvtzu", &[0], &[1]).latency(FP_LATENCY),

            Ldr => op("ldr", &[0], &[1])
                .memory(MemEffect::Load)
                .latency(LOAD_LATENCY),
            LdrSw => op("ldrsw", &[0], &[1])
                .memory(MemEffect::Load)
                .latency(LOAD_LATENCY),
            LdrB => op("ldrb", &[0], &[1])
                .memory(MemEffect::Load)
                .latency(LOAD_LATENCY),
            LdrD => op("ldr", &[0], &[1])
                .memory(MemEffect::Load)
                .latency(LOAD_LATENCY),
            Str => op("str", &[], &[0, 1]).memory(MemEffect::Store),
            StrW => op("str", &[], &[0, 1]).memory(MemEffect::Store),
            StrB => op("strb", &[], &[0, 1]).memory(MemEffect::Store),
            StrD => op("str", &[], &[0, 1]).memory(MemEffect::Store),
            Ldp => op("ldp", &[0, 1], &[2])
                .memory(MemEffect::Load)
                .latency(LOAD_LATENCY),
            Stp => op("stp", &[], &[0, 1, 2]).memory(MemEffect::Store),

            Br => op("b", &[], &[]).terminator(),
            BCond => op("b", &[], &[]).reads_flags().terminator(),
            Cbz => op("cbz", &[], &[0]).terminator(),
            Cbnz => op("cbnz", &[], &[0]).terminator(),
            Bl => op("bl", &[], &[])
                .memory(MemEffect::Call)
                .writes_flags(),
            Ret => op("ret", &[], &[0]).terminator(),
            FallThrough => op("", &[], &[]).terminator(),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    pub fn is_terminator(self) -> bool {
        self.info().is_terminator
    }

    pub fn latency(self) -> u32 {
        self.info().latency
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Br | Opcode::BCond | Opcode::Cbz | Opcode::Cbnz | Opcode::FallThrough
        )
    }
}
