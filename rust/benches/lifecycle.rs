use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ctensor::{Config, Tensor, TensorManager};
use rand::Rng;

const DIMENSIONS: usize = 1536;

fn generate_random_vector(dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rand::thread_rng().gen()).collect()
}

pub fn lifecycle_benchmark(c: &mut Criterion) {
    let data = generate_random_vector(DIMENSIONS);
    let mut group = c.benchmark_group("Handle Lifecycle");

    for diagnostics in [false, true] {
        let manager = TensorManager::native(Config::default().with_diagnostics(diagnostics));

        group.bench_with_input(BenchmarkId::new("Create and Release", diagnostics), &data, |b, data| {
            b.iter(|| {
                let mut t = Tensor::of_slice(&manager, black_box(data)).unwrap();
                t.release().unwrap();
            })
        });

        let base = Tensor::of_slice(&manager, &data).unwrap();
        group.bench_with_input(BenchmarkId::new("Shallow Clone", diagnostics), &base, |b, base| {
            b.iter(|| drop(black_box(base.shallow_clone().unwrap())))
        });

        group.bench_with_input(BenchmarkId::new("Leak Report", diagnostics), &base, |b, _| {
            b.iter(|| black_box(manager.leak_report()))
        });
    }
}

criterion_group!(benches, lifecycle_benchmark);
criterion_main!(benches);
