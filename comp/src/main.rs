mod cli;
mod report;
mod util;

use anyhow::{bail, Context, Result};
use clap::Parser;
use comp_lib::compile::compile;
use std::io::Write;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("VIPER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_logging(args.verbose);

    let source = cli::open_input_source(&args)?;

    let compile_opts = cli::extract_compile_opts(&args)?;
    debug!(
        input = %args.input_path,
        output = %args.output_path,
        abi = %compile_opts.target().abi,
        "compiling"
    );
    let res = compile(source.source(), &compile_opts);

    if !res.is_ok() {
        report::eprint_aggregate(&res, &source);
    }

    let Some(output) = res.into_value() else {
        bail!("couldn't compile due to the previous errors");
    };

    cli::open_output(&args)?
        .write_all(&output)
        .with_context(|| "Failed to write to output".to_string())?;

    Ok(())
}
