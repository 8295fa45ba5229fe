use std::hint::black_box;
use std::time::Instant;

use hideseek_common::{Config, ExecMode};
use hideseek_mgr::Manager;

fn config(exec_mode: ExecMode, num_worlds: u32, width: u32, height: u32) -> Config {
    Config {
        exec_mode,
        num_worlds,
        gpu_id: (exec_mode == ExecMode::Gpu).then_some(0),
        render_width: width,
        render_height: height,
        ..Config::default()
    }
}

fn make_manager(num_worlds: u32, width: u32, height: u32) -> Manager {
    match Manager::new(config(ExecMode::Cpu, num_worlds, width, height)) {
        Ok(mgr) => mgr,
        Err(err) => panic!("manager construction failed: {err}"),
    }
}

fn bench_step(num_worlds: u32, width: u32, height: u32, iterations: usize) {
    let mut mgr = make_manager(num_worlds, width, height);
    run_steps(&mut mgr, iterations);
}

fn run_steps(mgr: &mut Manager, iterations: usize) {
    let num_worlds = mgr.num_worlds() as u32;
    let (width, height) = (mgr.config().render_width, mgr.config().render_height);
    let actions: Vec<i32> = (0..num_worlds as i32).map(|i| i % 5).collect();

    let start = Instant::now();
    for _ in 0..iterations {
        mgr.move_action_tensor()
            .copy_from_slice(black_box(&actions))
            .unwrap_or_else(|err| panic!("action write failed: {err}"));
        mgr.step();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    let worlds_per_sec = f64::from(num_worlds) * iterations as f64 / elapsed.as_secs_f64();
    println!(
        "  step ({num_worlds} worlds, {width}x{height}, {iterations} iters): {per_iter:?}/iter, {worlds_per_sec:.0} world-steps/s"
    );
}

fn bench_position_readback(num_worlds: u32, iterations: usize) {
    let mut mgr = make_manager(num_worlds, 0, 0);
    mgr.step();

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(mgr.position_tensor().copy_to_vec::<f32>());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!("  position readback ({num_worlds} worlds, {iterations} iters): {per_iter:?}/iter");
}

#[cfg(feature = "gpu")]
fn bench_gpu() {
    println!("\n=== GPU Step Benchmarks ===\n");
    for (num_worlds, width, height, iterations) in [(1024, 0, 0, 100), (16384, 0, 0, 100), (256, 32, 32, 50)] {
        match Manager::new(config(ExecMode::Gpu, num_worlds, width, height)) {
            Ok(mut mgr) => run_steps(&mut mgr, iterations),
            Err(err) => {
                println!("  skipped: {err}");
                return;
            }
        }
    }
}

fn main() {
    println!("=== CPU Step Benchmarks ===\n");

    println!("Step without observations:");
    bench_step(64, 0, 0, 1000);
    bench_step(1024, 0, 0, 100);
    bench_step(16384, 0, 0, 10);

    println!("\nStep with 32x32 observations:");
    bench_step(16, 32, 32, 100);
    bench_step(256, 32, 32, 10);

    println!("\nTensor readback:");
    bench_position_readback(1024, 1000);
    bench_position_readback(16384, 100);

    #[cfg(feature = "gpu")]
    bench_gpu();

    println!("\n=== Done ===");
}
