//! Build automation tasks for the oradb workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

/// Fuzz targets defined in `fuzz/Cargo.toml`.
const FUZZ_TARGETS: &[&str] = &["parse_tag", "infer_metadata", "bind_rows"];

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for oradb")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks (format, lint, test, docs)
    Ci,
    /// Run cargo fmt --check
    Fmt,
    /// Run clippy with all features
    Clippy,
    /// Run tests, optionally for a single crate
    Test {
        /// Crate to test, e.g. `oradb-pool`
        #[arg(short, long)]
        package: Option<String>,
    },
    /// Generate documentation
    Doc,
    /// Run a fuzz target (requires nightly and cargo-fuzz)
    Fuzz {
        /// Target name; every target when omitted
        target: Option<String>,
        /// Seconds to run each target
        #[arg(short, long, default_value_t = 60)]
        seconds: u32,
    },
    /// Clean build artifacts
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh)?;
            clippy(&sh)?;
            test(&sh, None)?;
            doc(&sh)?;
            println!("All CI checks passed!");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test { package } => test(&sh, package.as_deref())?,
        Command::Doc => doc(&sh)?,
        Command::Fuzz { target, seconds } => fuzz(&sh, target.as_deref(), seconds)?,
        Command::Clean => clean(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("Running clippy...");
    cmd!(
        sh,
        "cargo clippy --workspace --all-features --all-targets -- -D warnings"
    )
    .run()?;
    Ok(())
}

fn test(sh: &Shell, package: Option<&str>) -> Result<()> {
    match package {
        Some(package) => {
            println!("Running tests for {package}...");
            cmd!(sh, "cargo test --all-features -p {package}").run()?;
        }
        None => {
            println!("Running tests...");
            cmd!(sh, "cargo test --workspace --all-features").run()?;
        }
    }
    println!("All tests passed.");
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    println!("Generating documentation...");
    cmd!(sh, "cargo doc --workspace --all-features --no-deps").run()?;
    Ok(())
}

fn fuzz(sh: &Shell, target: Option<&str>, seconds: u32) -> Result<()> {
    let targets: Vec<&str> = match target {
        Some(name) if FUZZ_TARGETS.contains(&name) => vec![name],
        Some(name) => bail!(
            "unknown fuzz target '{name}', expected one of: {}",
            FUZZ_TARGETS.join(", ")
        ),
        None => FUZZ_TARGETS.to_vec(),
    };

    let _dir = sh.push_dir("fuzz");
    let max_time = format!("-max_total_time={seconds}");
    for target in targets {
        println!("Fuzzing {target} for {seconds}s...");
        cmd!(sh, "cargo +nightly fuzz run {target} -- {max_time}").run()?;
    }
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    Ok(())
}
