use criterion::{black_box, criterion_group, criterion_main, Criterion};
use originsim_balancers::{build_chain, Balancer};
use originsim_core::{simulator, MemorySink};
use originsim_model::events::FEEDBACK_CAPACITY;
use originsim_model::server::init_servers;
use originsim_model::{Config, EventSink, SimRng};
use std::sync::Arc;

fn bench_config(strategy: &str) -> Arc<Config> {
    Arc::new(
        Config::from_str(&format!(
            r#"
simulation: {{ time_seconds: 60, step_seconds: 1, seed: 42 }}
traffic: {{ base_rps: 50, users_amount: 5000 }}
cluster: {{ servers: 8, bitrate: 4, segment_duration: 6 }}
balancer: {{ strategy: "{strategy}" }}
"#,
        ))
        .unwrap(),
    )
}

fn run_once(cfg: &Arc<Config>) -> usize {
    let rng = Arc::new(SimRng::new(cfg.simulation.seed));
    let (rtt_tx, rtt_rx) = crossbeam_channel::bounded(FEEDBACK_CAPACITY);
    let servers = init_servers(cfg, &rng, &rtt_tx).unwrap();
    let balancer: Arc<dyn Balancer> =
        Arc::from(build_chain(cfg, &servers, &rng, &rtt_rx).unwrap());
    let sink = Arc::new(MemorySink::new(servers.len()));
    simulator::run(
        Arc::clone(cfg),
        servers,
        balancer,
        rng,
        Arc::clone(&sink) as Arc<dyn EventSink>,
    )
    .unwrap();
    sink.arrivals.lock().len()
}

fn bench_60s_ch_chain(c: &mut Criterion) {
    let cfg = bench_config("ch+p2c");
    c.bench_function("simulate_60s_8_servers_ch_p2c", |b| {
        b.iter(|| run_once(black_box(&cfg)))
    });
}

fn bench_60s_wlc(c: &mut Criterion) {
    let cfg = bench_config("wlc");
    c.bench_function("simulate_60s_8_servers_wlc", |b| {
        b.iter(|| run_once(black_box(&cfg)))
    });
}

criterion_group!(benches, bench_60s_ch_chain, bench_60s_wlc);
criterion_main!(benches);
