//! # Fission CLI Entry Point
//!
//! Command-line driver for the fission code generator.
//!
//! ## Usage
//!
//! ```bash
//! # Generate workers, the orchestrator entry, and the build manifest for
//! # every service file in ./services
//! fission build --src ./services --out ./generated
//! ```

use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;

use fission_codegen::CodegenConfig;

#[derive(FromArgs)]
/// Fission - turn a service definition into a process fleet
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Build(BuildArgs),
}

/// Generate worker programs from the service files in a directory.
#[derive(FromArgs)]
#[argh(subcommand, name = "build")]
struct BuildArgs {
    /// directory containing service source files
    #[argh(option, default = "PathBuf::from(\"./\")")]
    src: PathBuf,

    /// directory the generated tree is written under
    #[argh(option, default = "PathBuf::from(\"./generated\")")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli: Cli = argh::from_env();
    match cli.command {
        Commands::Build(args) => build(args),
    }
}

fn build(args: BuildArgs) -> Result<()> {
    let config = CodegenConfig {
        src_dir: args.src,
        output_dir: args.out.clone(),
    };

    let methods = fission_codegen::build_dir(&config)?;
    if methods.is_empty() {
        anyhow::bail!("no service methods found under {}", config.src_dir.display());
    }

    println!(
        "generated {} workers under {}",
        methods.len(),
        args.out.display()
    );
    for method in &methods {
        println!("  {} -> {}/main.rs ({})", method.method_address, method.dir, method.short_id);
    }
    Ok(())
}
