use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use edf_core::{
    DiffusionSchedule, HarmonicWell, Pose, Quaternion, SampleOptions, Sampler, UpdateStrategy,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn seed_batch(n: usize, rng: &mut SmallRng) -> Vec<Pose> {
    (0..n)
        .map(|_| Pose::new(Quaternion::random(rng), [0.0; 3]).unwrap())
        .collect()
}

fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");
    let model = HarmonicWell::new(Pose::identity(), 1.0, 1.0);
    let schedule =
        DiffusionSchedule::from_parts(&[(1.0, 0.1), (0.1, 0.01)], &[50, 50], &[0.02, 0.01])
            .unwrap();

    for strategy in [UpdateStrategy::FirstOrder, UpdateStrategy::Exponential] {
        let options = SampleOptions {
            strategy,
            ..SampleOptions::default()
        };
        let sampler = Sampler::new(&model, options).unwrap();
        for n in [16usize, 256] {
            let mut rng = SmallRng::seed_from_u64(42);
            let seed = seed_batch(n, &mut rng);
            group.bench_with_input(BenchmarkId::new(format!("{strategy:?}"), n), &seed, |b, seed| {
                b.iter(|| sampler.sample(seed, &[()], &(), &schedule, &mut rng).unwrap())
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_sample);
criterion_main!(benches);
