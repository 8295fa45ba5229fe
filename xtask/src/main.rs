use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for hideseek")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, deny, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates, with and without the gpu backend
    Clippy,
    /// Run all tests
    Test {
        /// Also build and test the wgpu backend
        #[arg(long)]
        gpu: bool,
    },
    /// Run the manager step benchmark
    Bench {
        #[arg(long)]
        gpu: bool,
    },
    /// Run cargo deny check
    Deny,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            run_fmt()?;
            run_clippy()?;
            run_tests(false)?;
            run_deny()?;
            run_doc()?;
        }
        Commands::Fmt => run_fmt()?,
        Commands::Clippy => run_clippy()?,
        Commands::Test { gpu } => run_tests(gpu)?,
        Commands::Bench { gpu } => run_bench(gpu)?,
        Commands::Deny => run_deny()?,
        Commands::Doc => run_doc()?,
        Commands::Build => cargo("cargo build", &["build", "--workspace"])?,
    }

    Ok(())
}

/// Run one cargo invocation, failing if it exits unsuccessfully.
fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("==> Running {step}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{step} failed");
    }
    Ok(())
}

fn run_fmt() -> Result<()> {
    cargo("cargo fmt --check", &["fmt", "--all", "--", "--check"])
}

fn run_clippy() -> Result<()> {
    let lints = ["--", "-D", "warnings"];
    let mut cpu = vec!["clippy", "--workspace", "--all-targets"];
    cpu.extend(lints);
    cargo("cargo clippy", &cpu)?;

    let mut gpu = vec!["clippy", "--workspace", "--all-targets", "--features", "hideseek-mgr/gpu"];
    gpu.extend(lints);
    cargo("cargo clippy (gpu)", &gpu)
}

fn run_tests(gpu: bool) -> Result<()> {
    cargo("cargo test", &["test", "--workspace"])?;
    if gpu {
        cargo(
            "cargo test (gpu)",
            &["test", "-p", "hideseek-mgr", "-p", "hideseek-cli", "--features", "hideseek-mgr/gpu"],
        )?;
    }
    Ok(())
}

fn run_bench(gpu: bool) -> Result<()> {
    let mut args = vec!["bench", "-p", "hideseek-mgr", "--bench", "bench_step"];
    if gpu {
        args.extend(["--features", "gpu"]);
    }
    cargo("cargo bench", &args)
}

fn run_deny() -> Result<()> {
    cargo(
        "cargo deny check (licenses bans sources)",
        &["deny", "check", "licenses", "bans", "sources"],
    )
}

fn run_doc() -> Result<()> {
    cargo("cargo doc", &["doc", "--workspace", "--no-deps"])
}
