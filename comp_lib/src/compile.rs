use crate::{
    control_flow,
    diagnostic::{AggregateResult, Code, DiagnosticBuilder},
    pipeline::{
        BlockLayoutPass, Diagnostics, EmitPass, LoweringPass, MirStage, Module, Pass,
        PassManager, PeepholePass, RegAllocPass, SchedulerPass, VerifyPass,
    },
};
use aarch64_ir::TargetInfo;
use std::{collections::HashSet, fmt};

pub use aarch64_ir::Abi;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// The assembly text.
    Asm,
    /// The MIR after the last enabled pass before emission.
    MirDbg,
    /// The IL as parsed, in its canonical text form.
    Il,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Asm => "asm",
            OutputFormat::MirDbg => "mir dbg",
            OutputFormat::Il => "il",
        };
        write!(f, "{name}")
    }
}

/// The passes that can be left out of the pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OptionalPass {
    Scheduler,
    BlockLayout,
    Peephole,
}

impl fmt::Display for OptionalPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionalPass::Scheduler => "scheduler",
            OptionalPass::BlockLayout => "block-layout",
            OptionalPass::Peephole => "peephole",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct CompileOpts {
    output_format: OutputFormat,
    target: TargetInfo,
    skip: HashSet<OptionalPass>,
    verify: bool,
}

impl CompileOpts {
    pub fn target(&self) -> &TargetInfo {
        &self.target
    }
}

#[derive(Debug, Clone)]
pub struct CompileOptsBuilder {
    output_format: OutputFormat,
    abi: Abi,
    skip: HashSet<OptionalPass>,
    verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileOptsErr {
    #[error("Can't skip the {0} pass with the {1} format, it doesn't run the backend.")]
    SkipWithoutBackend(OptionalPass, OutputFormat),
}

impl Default for CompileOptsBuilder {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Asm,
            abi: Abi::host(),
            skip: HashSet::default(),
            verify: false,
        }
    }
}

impl CompileOptsBuilder {
    /// Output assembly for the host ABI, running every pass and not verifying.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn abi(mut self, abi: Abi) -> Self {
        self.abi = abi;
        self
    }

    pub fn skip(mut self, pass: OptionalPass) -> Self {
        self.skip.insert(pass);
        self
    }

    /// Check the MIR invariants after every pass.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn build(self) -> Result<CompileOpts, CompileOptsErr> {
        if self.output_format == OutputFormat::Il {
            if let Some(&pass) = self.skip.iter().next() {
                return Err(CompileOptsErr::SkipWithoutBackend(pass, self.output_format));
            }
        }
        Ok(CompileOpts {
            output_format: self.output_format,
            target: TargetInfo::new(self.abi),
            skip: self.skip,
            verify: self.verify,
        })
    }
}

/// Collects the messages of the failing pass.
#[derive(Default)]
struct Collected(Vec<String>);

impl Diagnostics for Collected {
    fn error(&mut self, message: String) {
        self.0.push(message);
    }
}

pub fn compile(source: &str, opts: &CompileOpts) -> AggregateResult<Vec<u8>> {
    let il = match viper_il::parse_module(source) {
        Ok(il) => il,
        Err(error) => {
            return AggregateResult::new_err(
                DiagnosticBuilder::unspanned().build_parse_error(&error),
            )
        }
    };

    if opts.output_format == OutputFormat::Il {
        return AggregateResult::new_ok(il.to_string().into_bytes());
    }

    let mut res = AggregateResult::new_ok(());
    for diagnostic in control_flow::find_unreachable_blocks(&il) {
        res.add_rec_diagnostic(diagnostic);
    }

    let mut manager = build_pipeline(opts);
    let mut module = Module::new(&il, &opts.target);
    let mut diagnostics = Collected::default();
    if !manager.run(&mut module, &mut diagnostics) {
        let code = manager
            .failed_pass()
            .map_or(Code::Unspecified, |pass| pass.error_code());
        for message in diagnostics.0 {
            res.add_err(DiagnosticBuilder::unspanned().build_custom(code, message));
        }
        return res.map(|()| Vec::new());
    }

    res.map(|()| match opts.output_format {
        OutputFormat::MirDbg => module
            .mir
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes(),
        _ => module.assembly.into_bytes(),
    })
}

fn build_pipeline(opts: &CompileOpts) -> PassManager {
    let mut manager = PassManager::new();
    let mut add = |pass: Box<dyn Pass>, stage: MirStage| {
        let name = pass.name();
        manager.add_boxed(pass);
        if opts.verify {
            manager.add_pass(VerifyPass::new(name, stage));
        }
    };

    add(Box::new(LoweringPass), MirStage::Lowered);
    add(Box::new(RegAllocPass), MirStage::Allocated);
    let optional: [(OptionalPass, Box<dyn Pass>); 3] = [
        (OptionalPass::Scheduler, Box::new(SchedulerPass)),
        (OptionalPass::BlockLayout, Box::new(BlockLayoutPass)),
        (OptionalPass::Peephole, Box::new(PeepholePass)),
    ];
    for (kind, pass) in optional {
        if !opts.skip.contains(&kind) {
            add(pass, MirStage::Allocated);
        }
    }

    if opts.output_format == OutputFormat::Asm {
        manager.add_pass(EmitPass);
    }
    manager
}
