use crate::util::PathOrStd;

use comp_lib::compile::{self, Abi, CompileOpts, CompileOptsBuilder, CompileOptsErr, OptionalPass};

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use codespan_reporting::files::SimpleFile;

use std::{fs::File, io::Read};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Asm,
    MirDbg,
    Il,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Mach-O on macOS
    #[value(alias = "macos")]
    Darwin,
    /// ELF on Linux
    #[value(alias = "elf")]
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SkippablePasses {
    Scheduler,
    BlockLayout,
    Peephole,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The input IL file, use `-` for std in.
    #[arg(default_value = "-")]
    pub input_path: PathOrStd,

    /// The ABI to emit assembly for. Defaults to the one of the host.
    #[arg(short = 't', long, value_name = "TARGET", value_enum)]
    target: Option<Target>,

    /// The output format.
    #[arg(short = 'e', long, value_name = "FORMAT", value_enum, default_value = "asm")]
    emit: OutputFormat,

    /// Zero or more passes to skip
    #[arg(long = "skip", value_name = "PASS", value_enum)]
    skips: Vec<SkippablePasses>,

    /// Check the MIR after every pass
    #[arg(long)]
    verify: bool,

    /// The output file, use `-` for std out.
    #[arg(short = 'o', long = "output", default_value = "-")]
    pub output_path: PathOrStd,

    /// Log what the passes do to std err, repeat for more detail. `VIPER_LOG` overrides this.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

pub fn open_input_source(args: &Args) -> anyhow::Result<SimpleFile<String, String>> {
    match &args.input_path {
        PathOrStd::Path(path) => {
            if !path.exists() {
                bail!("Input file `{}` doesn't exist", path.display());
            }
            let mut handle = File::open(path)
                .with_context(|| format!("Failed to open input file `{}`", path.display()))?;
            let mut s = String::new();
            handle
                .read_to_string(&mut s)
                .with_context(|| format!("Failed to read from input file `{}`", path.display()))?;

            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |name| {
                    name.to_string_lossy().into_owned()
                });
            Ok(SimpleFile::new(name, s))
        }
        PathOrStd::StdStream => {
            let mut handle = std::io::stdin().lock();
            let mut s = String::new();
            handle
                .read_to_string(&mut s)
                .context("Failed to read from stdin")?;

            Ok(SimpleFile::new("stdin stream".to_owned(), s))
        }
    }
}

pub fn extract_compile_opts(args: &Args) -> Result<CompileOpts, CompileOptsErr> {
    let format = match args.emit {
        OutputFormat::Asm => compile::OutputFormat::Asm,
        OutputFormat::MirDbg => compile::OutputFormat::MirDbg,
        OutputFormat::Il => compile::OutputFormat::Il,
    };
    let opts = CompileOptsBuilder::new()
        .output_format(format)
        .verify(args.verify);

    let opts = if let Some(target) = args.target {
        let abi = match target {
            Target::Darwin => Abi::Darwin,
            Target::Linux => Abi::Linux,
        };
        opts.abi(abi)
    } else {
        opts
    };

    args.skips
        .iter()
        .fold(opts, |opts, skip| {
            opts.skip(match skip {
                SkippablePasses::Scheduler => OptionalPass::Scheduler,
                SkippablePasses::BlockLayout => OptionalPass::BlockLayout,
                SkippablePasses::Peephole => OptionalPass::Peephole,
            })
        })
        .build()
}

pub fn open_output(args: &Args) -> anyhow::Result<Box<dyn std::io::Write>> {
    match &args.output_path {
        PathOrStd::Path(path) => std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .map(|f| Box::new(f) as Box<dyn std::io::Write>)
            .with_context(|| format!("Failed to open output file `{}`", path.display())),
        PathOrStd::StdStream => Ok(Box::new(std::io::stdout().lock())),
    }
}
