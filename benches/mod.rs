use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    agent::bench_route,
    agent::bench_metadata_update,
    agent::bench_register,
    mqtt::bench_publish,
    mqtt::bench_poll
);
criterion_main!(benches);
