use criterion::{black_box, criterion_group, criterion_main, Criterion};
use os_compat_thread::platform;
use os_compat_thread::prelude::*;

fn benchmark_spawn_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_join");

    group.bench_function("default_properties", |b| {
        b.iter(|| {
            let mut thread = Thread::spawn(|| black_box(1 + 1)).expect("Failed to spawn");
            thread.join().expect("Failed to join");
            black_box(thread.get_result().expect("Missing result"));
        });
    });

    group.bench_function("named", |b| {
        let props = SchedulingProperties::new().with_name("bench");
        b.iter(|| {
            let mut thread =
                Thread::with_properties(props.clone(), || black_box(1 + 1)).expect("Failed to spawn");
            thread.join().expect("Failed to join");
        });
    });

    group.finish();
}

fn benchmark_pinned_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pinned_spawn");
    let core = platform::allowed_cores()
        .expect("Failed to read process affinity")
        .iter()
        .next()
        .expect("No allowed cores");
    let props = SchedulingProperties::new()
        .with_policy(Policy::Other)
        .with_priority(0)
        .with_affinity(CoreSet::single(core));

    group.bench_function("attributes_before_start", |b| {
        b.iter(|| {
            let mut thread =
                Thread::with_properties(props.clone(), || black_box(1 + 1)).expect("Failed to spawn");
            thread.join().expect("Failed to join");
        });
    });

    #[cfg(target_os = "linux")]
    group.bench_function("configured_after_start", |b| {
        b.iter(|| {
            let mut thread = Thread::spawn_on(platform::PosixLive, props.clone(), || black_box(1 + 1))
                .expect("Failed to spawn");
            thread.join().expect("Failed to join");
        });
    });

    group.finish();
}

fn benchmark_fan_out(c: &mut Criterion) {
    let workers = num_cpus::get();

    c.bench_function("fan_out_per_core", |b| {
        b.iter(|| {
            let mut threads: Vec<Thread<u64>> = (0..workers)
                .map(|i| {
                    Thread::spawn(move || {
                        let mut sum = 0u64;
                        for n in 0..1000 {
                            sum = sum.wrapping_add(n * i as u64);
                        }
                        sum
                    })
                    .expect("Failed to spawn")
                })
                .collect();

            for thread in &mut threads {
                thread.join().expect("Failed to join");
                black_box(thread.get_result().expect("Missing result"));
            }
        });
    });
}

criterion_group!(
    benches,
    benchmark_spawn_join,
    benchmark_pinned_spawn,
    benchmark_fan_out
);
criterion_main!(benches);
