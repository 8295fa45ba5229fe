use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use hideseek_common::{Config, ExecMode};
use hideseek_kernel::NUM_MOVE_ACTIONS;
use hideseek_mgr::Manager;

#[derive(Parser)]
#[command(name = "hideseek-cli", about = "Drive the hideseek execution manager")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and compiled backends
    Info,
    /// Step a batch of worlds with a fixed action schedule
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// YAML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Execution backend (cpu or gpu)
    #[arg(short, long)]
    exec_mode: Option<ExecMode>,
    /// Number of worlds
    #[arg(short, long)]
    num_worlds: Option<u32>,
    /// Adapter index for GPU execution
    #[arg(long)]
    gpu_id: Option<u32>,
    /// Image observation width
    #[arg(long)]
    width: Option<u32>,
    /// Image observation height
    #[arg(long)]
    height: Option<u32>,
    /// Compile the GPU task graph with validation
    #[arg(long)]
    debug_compile: bool,
    /// Directory holding sphere.obj, plane.obj and cube.obj
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Number of steps to run
    #[arg(short, long, default_value = "100")]
    steps: u32,
    /// Reset every world each time this many steps have passed (0 never resets)
    #[arg(long, default_value = "0")]
    reset_every: u32,
}

impl RunArgs {
    fn config(&self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(mode) = self.exec_mode {
            cfg.exec_mode = mode;
        }
        if let Some(n) = self.num_worlds {
            cfg.num_worlds = n;
        }
        if self.gpu_id.is_some() {
            cfg.gpu_id = self.gpu_id;
        }
        if let Some(w) = self.width {
            cfg.render_width = w;
        }
        if let Some(h) = self.height {
            cfg.render_height = h;
        }
        if self.debug_compile {
            cfg.debug_compile = true;
        }
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        Ok(cfg)
    }
}

#[derive(Serialize)]
struct RunSummary {
    exec_mode: ExecMode,
    num_worlds: u32,
    steps: u32,
    elapsed_secs: f64,
    world_steps_per_sec: f64,
    episodes_started: u32,
    mean_position: [f32; 2],
}

/// Deterministic schedule: world `i` takes action `(step + i) % NUM_MOVE_ACTIONS`.
fn fill_actions(actions: &mut [i32], step: u32) {
    for (i, a) in actions.iter_mut().enumerate() {
        *a = (step as i32).wrapping_add(i as i32).rem_euclid(NUM_MOVE_ACTIONS);
    }
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    let cfg = args.config()?;
    tracing::debug!(?cfg, "resolved run configuration");
    let mut mgr = Manager::new(cfg.clone()).context("initializing manager")?;

    let n = cfg.num_worlds as usize;
    let mut actions = vec![0i32; n];
    let resets = vec![1i32; n];

    let start = Instant::now();
    for step in 0..args.steps {
        fill_actions(&mut actions, step);
        mgr.move_action_tensor().copy_from_slice(&actions)?;
        if args.reset_every > 0 && step > 0 && step % args.reset_every == 0 {
            mgr.reset_tensor().copy_from_slice(&resets)?;
        }
        mgr.step();
    }
    let elapsed = start.elapsed().as_secs_f64();

    let positions = mgr.position_tensor().copy_to_vec::<f32>()?;
    let mut mean = [0.0f32; 2];
    for p in positions.chunks_exact(2) {
        mean[0] += p[0] / n as f32;
        mean[1] += p[1] / n as f32;
    }

    let world_steps = f64::from(cfg.num_worlds) * f64::from(args.steps);
    let summary = RunSummary {
        exec_mode: cfg.exec_mode,
        num_worlds: cfg.num_worlds,
        steps: args.steps,
        elapsed_secs: elapsed,
        world_steps_per_sec: if elapsed > 0.0 { world_steps / elapsed } else { 0.0 },
        episodes_started: mgr.episodes_started()?,
        mean_position: mean,
    };

    tracing::info!(
        mode = %summary.exec_mode,
        worlds = summary.num_worlds,
        steps = summary.steps,
        episodes = summary.episodes_started,
        "run complete"
    );
    println!(
        "{} worlds x {} steps in {:.3}s ({:.0} world-steps/s)",
        summary.num_worlds, summary.steps, summary.elapsed_secs, summary.world_steps_per_sec
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("hideseek-cli v{}", env!("CARGO_PKG_VERSION"));
            let backends: Vec<&str> = hideseek_mgr::compiled_backends()
                .iter()
                .map(|m| m.as_str())
                .collect();
            println!("backends: {}", backends.join(", "));
            println!("exported slots: {}", hideseek_mgr::NUM_EXPORTED_BUFFERS);
            println!("default data dir: {}", hideseek_common::DEFAULT_DATA_DIR);
        }
        Commands::Run(args) => run(&args)?,
    }

    Ok(())
}
