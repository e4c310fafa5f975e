use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use voxel_battle::battle::{BattleStore, SimulationLoop, SquadSpec};
use voxel_battle::core::config::BattleRules;
use voxel_battle::core::types::Vec2;
use voxel_battle::sync::{ReplayBundle, ReplayManager};

fn lane(i: u32, squads_per_side: u32) -> f64 {
    (i as f64 - squads_per_side as f64 / 2.0) * 18.0
}

fn store(squads_per_side: u32, seed: u64) -> BattleStore {
    let attackers = (0..squads_per_side)
        .map(|i| SquadSpec::infantry(1 + i, 120, 80.0, Vec2::new(-50.0, lane(i, squads_per_side))))
        .collect();
    let defenders = (0..squads_per_side)
        .map(|i| {
            SquadSpec::infantry(100 + i, 120, 75.0, Vec2::new(50.0, lane(i, squads_per_side)))
                .facing(Vec2::new(-1.0, 0.0))
        })
        .collect();
    let rules = BattleRules {
        max_ticks: 300,
        ..BattleRules::default()
    };
    BattleStore::with_battle(rules, attackers, defenders, seed).expect("valid battle")
}

fn bench_battle(c: &mut Criterion) {
    let mut group = c.benchmark_group("battle");

    for squads in [1u32, 4, 12] {
        group.bench_with_input(BenchmarkId::new("to_completion", squads), &squads, |b, &squads| {
            b.iter_batched(
                || SimulationLoop::live(store(squads, 42)).expect("initialized"),
                |mut sim| sim.run_to_completion().expect("completes"),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let battle = store(4, 7);
    let initial = battle.snapshot().expect("initialized");
    let mut sim = SimulationLoop::live(battle).expect("initialized");
    sim.run_to_completion().expect("completes");
    let bundle =
        ReplayBundle::capture(&initial, &sim.snapshot().expect("state")).expect("completed");

    c.bench_function("replay/verify", |b| {
        b.iter(|| ReplayManager::replay(&bundle).expect("replay matches"))
    });
}

criterion_group!(simulation_benches, bench_battle, bench_replay);
criterion_main!(simulation_benches);
