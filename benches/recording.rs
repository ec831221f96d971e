//! Recording and playback benchmarks
use criterion::{
    criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion, PlotConfiguration,
    Throughput,
};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;
use trace_recording::{Info, TraceRecorderConfig, TraceScanner};

const EPISODE_LEN: usize = 100;
const OBSERVATION_SIZE: usize = 16;

/// Random `(action, observation, reward)` steps.
fn random_steps(rng: &mut StdRng, num_steps: usize) -> Vec<(i64, Array1<f32>, f64)> {
    (0..num_steps)
        .map(|_| {
            let observation = (0..OBSERVATION_SIZE).map(|_| rng.gen()).collect();
            (rng.gen_range(0..4), observation, rng.gen())
        })
        .collect()
}

fn record(dir: &TempDir, batch_size: usize, num_episodes: usize, steps: &[(i64, Array1<f32>, f64)]) {
    let mut recorder = TraceRecorderConfig::new(dir.path())
        .with_batch_size(batch_size)
        .build_recorder::<f32, i64>()
        .unwrap();
    let initial = Array1::<f32>::zeros(OBSERVATION_SIZE);
    for _ in 0..num_episodes {
        recorder.add_reset(&initial).unwrap();
        for (action, observation, reward) in steps {
            recorder
                .add_step(action, observation, *reward, Info::Null)
                .unwrap();
        }
        recorder.end_episode().unwrap();
    }
    recorder.close().unwrap();
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = StdRng::seed_from_u64(0);
    let steps = random_steps(&mut rng, EPISODE_LEN);
    let num_episodes = 64;
    group.throughput(Throughput::Elements((num_episodes * EPISODE_LEN) as u64));

    for batch_size in [1, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter_with_setup(
                    || TempDir::new().unwrap(),
                    |dir| record(&dir, batch_size, num_episodes, &steps),
                )
            },
        );
    }
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    let mut rng = StdRng::seed_from_u64(1);
    let steps = random_steps(&mut rng, EPISODE_LEN);
    for num_episodes in [1, 16, 256] {
        let dir = TempDir::new().unwrap();
        record(&dir, 16, num_episodes, &steps);
        group.throughput(Throughput::Elements((num_episodes * EPISODE_LEN) as u64));
        group.bench_with_input(
            BenchmarkId::new("episodes", num_episodes),
            &dir,
            |b, dir| {
                b.iter(|| {
                    TraceScanner::<f32, i64>::new(dir.path())
                        .episodes()
                        .unwrap()
                        .count()
                })
            },
        );
    }
}

criterion_group!(benches, bench_record, bench_scan);
criterion_main!(benches);
