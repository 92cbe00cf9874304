use canopy_sync_tree::{Name, NodeBuilder};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn bench_names(count: usize) -> Vec<Name> {
    let mut names: Vec<Name> = (0..count)
        .map(|index| {
            let digest = blake3::hash(format!("bench-{index}").as_bytes());
            let bytes = digest.as_bytes();
            Name::from_components([
                b"bench".to_vec(),
                bytes[0..4].to_vec(),
                bytes[4..12].to_vec(),
            ])
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

fn bench_build_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_tree");

    for size in [100, 1000, 10000, 100000] {
        let names = bench_names(size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                NodeBuilder::build(&names).unwrap().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_leaf_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_leaves");

    for size in [1000, 10000] {
        let names = bench_names(size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut remaining = names.as_slice();
                while !remaining.is_empty() {
                    let (_, consumed) = NodeBuilder::build_leaf(remaining).unwrap();
                    remaining = &remaining[consumed..];
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_tree, bench_leaf_runs);
criterion_main!(benches);
