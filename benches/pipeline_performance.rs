use criterion::{black_box, criterion_group, criterion_main, Criterion};
use floatlink::telemetry::{
    decode_notification, BenchmarkMonitor, Characteristic, SpeedMonitor, StateUpdate, VehicleState,
};
use std::time::{Duration, Instant, SystemTime};

fn rpm_payload(step: usize) -> [u8; 2] {
    ((step % 900) as i16).to_be_bytes()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let rpm = rpm_payload(423);
    group.bench_function("decode_rpm_notification", |b| {
        b.iter(|| black_box(decode_notification(Characteristic::Rpm, black_box(&rpm)).unwrap()));
    });

    let status = [0b0000_0111u8];
    group.bench_function("decode_status_notification", |b| {
        b.iter(|| {
            black_box(decode_notification(Characteristic::Status, black_box(&status)).unwrap())
        });
    });

    group.finish();
}

fn bench_state_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_merge");

    let state = VehicleState::default();
    let update = StateUpdate::Rpm(423);
    group.bench_function("merge_single_update", |b| {
        b.iter(|| black_box(state.merged(black_box(&update), SystemTime::UNIX_EPOCH)));
    });

    group.bench_function("merge_and_diff", |b| {
        b.iter(|| {
            let next = state.merged(black_box(&update), SystemTime::UNIX_EPOCH);
            black_box(next.diff(&state))
        });
    });

    group.finish();
}

fn bench_monitors(c: &mut Criterion) {
    let mut group = c.benchmark_group("monitors");

    group.bench_function("benchmark_monitor_check", |b| {
        let mut monitor = BenchmarkMonitor::new(
            vec![90.0, 80.0, 70.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0],
            1.0,
        );
        let mut value = 0usize;
        b.iter(|| {
            value = (value + 7) % 100;
            black_box(monitor.passed_benchmark(value as f64))
        });
    });

    group.bench_function("speed_monitor_check", |b| {
        let mut monitor = SpeedMonitor::default();
        let start = Instant::now();
        let mut step = 0u64;
        b.iter(|| {
            step += 1;
            let at = start + Duration::from_millis(100 * step);
            black_box(monitor.passed_benchmark_at(((step % 30) as f64) * 0.9, at))
        });
    });

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    // decode -> merge -> diff -> monitor for one rpm notification, the hot
    // path a connected session runs hundreds of times per minute
    group.bench_function("rpm_notification_to_alert_check", |b| {
        let mut monitor = SpeedMonitor::default();
        let mut state = VehicleState::default();
        let start = Instant::now();
        let mut step = 0u64;
        b.iter(|| {
            step += 1;
            let payload = rpm_payload(step as usize);
            let update = decode_notification(Characteristic::Rpm, &payload).unwrap();
            let next = state.merged(&update, SystemTime::UNIX_EPOCH);
            let changes = next.diff(&state);
            let at = start + Duration::from_millis(100 * step);
            let mut crossed = false;
            for _ in &changes {
                crossed |= monitor.passed_benchmark_at(next.mph(), at);
            }
            state = next;
            black_box(crossed)
        });
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let state = VehicleState {
        time: SystemTime::UNIX_EPOCH,
        rider_present: true,
        foot_pad1: true,
        foot_pad2: true,
        rpm: 423,
        safety_headroom: 100,
        battery_level: 87,
        motor_temp: 40,
        controller_temp: 35,
        battery_voltage: 541,
        trip_odometer: 300,
        ..Default::default()
    };

    group.bench_function("serialize_state", |b| {
        b.iter(|| black_box(serde_json::to_string(&state).unwrap()));
    });

    let json = serde_json::to_string(&state).unwrap();
    group.bench_function("deserialize_state", |b| {
        b.iter(|| black_box(serde_json::from_str::<VehicleState>(&json).unwrap()));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_decode, bench_state_merge, bench_monitors, bench_full_pipeline, bench_serialization
}
criterion_main!(benches);
