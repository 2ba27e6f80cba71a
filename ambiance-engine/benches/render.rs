//! Graph rendering benchmarks
//!
//! Per-block render cost of a live mix, and the cost of starting a sound
//! (buffer preparation plus wiring).

use ambiance_engine::{EngineConfig, ManualBackend, PlaybackController, RecipeTable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn controller() -> PlaybackController<ManualBackend> {
    let cfg = EngineConfig { sample_rate: 48_000, loop_seconds: 2.0, seed: Some(3), ..EngineConfig::default() };
    let recipes = RecipeTable::builtin().expect("built-in recipes");
    PlaybackController::new(ManualBackend::new(cfg.sample_rate), recipes, cfg).expect("controller")
}

fn benchmark_render(c: &mut Criterion) {
    let mut ctl = controller();
    ctl.play_background("thunderstorm");
    ctl.play_asset("fireplace-crackle");
    ctl.play_asset("clock-ticking");
    let mut block = vec![0.0_f32; 512 * 2];

    c.bench_function("render_mix_512_stereo", |b| {
        b.iter(|| ctl.backend_mut().render_interleaved(black_box(&mut block), 2))
    });
}

fn benchmark_start_stop(c: &mut Criterion) {
    let mut ctl = controller();
    c.bench_function("asset_start_stop_2s_loops", |b| {
        b.iter(|| {
            ctl.play_asset(black_box("wind-chimes"));
            ctl.stop_asset("wind-chimes");
        })
    });
}

criterion_group!(benches, benchmark_render, benchmark_start_stop);
criterion_main!(benches);
