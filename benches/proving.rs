use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pos::{
    config::{PlotConfig, ProofConfig},
    hash_chain::PlotNonce,
    interrupt::Interrupt,
    plotting::PlotBuilder,
    prove::find_proofs,
    store::PlotStore,
    Challenge,
};
use pprof::criterion::{Output, PProfProfiler};
use rand::{thread_rng, RngCore};
use tempfile::tempdir;

fn prover_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("proving");
    let dir = tempdir().unwrap();
    let builder = PlotBuilder::new(PlotConfig::default());
    for i in 0..8 {
        builder
            .build(
                &dir.path().join(format!("{i}.plot")),
                18,
                b"bench",
                &PlotNonce::random(),
                &Interrupt::new(),
            )
            .unwrap();
    }
    let store = PlotStore::open_dir(dir.path()).unwrap();

    for plots in [1, 8] {
        group.bench_with_input(
            BenchmarkId::new("find_proofs", format!("plots={plots}/k=18")),
            &plots,
            |b, &plots| {
                let mut challenge = Challenge([0; 32]);
                b.iter(|| {
                    thread_rng().fill_bytes(&mut challenge.0);
                    find_proofs(&store.plots()[..plots], &challenge, ProofConfig::default())
                        .unwrap()
                });
            },
        );
    }
}

criterion_group!(
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(1000, Output::Flamegraph(None)));
    targets=prover_bench,
);

criterion_main!(benches);
