//! Basic native thread usage example
//!
//! Demonstrates spawning threads, pinning them to cores, reading their
//! results, and how rejected properties are reported.
//!
//! Run with: cargo run --example basic_usage

use os_compat_thread::platform;
use os_compat_thread::prelude::*;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    println!("=== os_compat_thread - Basic Usage Example ===\n");

    println!("1. Spawning a thread with default properties:");
    let mut thread = Thread::spawn(|| (1..=10u64).product::<u64>())?;
    thread.join()?;
    println!("   10! = {}", thread.get_result()?);

    let allowed = platform::allowed_cores()?;
    println!(
        "\n2. Pinning one thread per allowed core ({} of {} online, {} usable per num_cpus):",
        allowed.len(),
        platform::online_cores(),
        num_cpus::get()
    );
    let mut pinned: Vec<Thread<usize>> = Vec::new();
    for core in allowed.iter() {
        let props = SchedulingProperties::new()
            .with_policy(Policy::Other)
            .with_affinity(CoreSet::single(core))
            .with_name(format!("pinned-{}", core));
        pinned.push(Thread::with_properties(props, move || core)?);
    }
    for thread in &mut pinned {
        let id = thread.id();
        thread.join()?;
        println!("   thread {:?} ran pinned to core {}", id, thread.get_result()?);
    }

    println!("\n3. Waiting with a timeout:");
    let mut slow = Thread::spawn(|| {
        std::thread::sleep(Duration::from_millis(200));
        "done"
    })?;
    match slow.join_timeout(Duration::from_millis(20)) {
        Err(ThreadError::JoinTimeout { timeout_ms }) => {
            println!("   still running after {}ms", timeout_ms)
        }
        other => println!("   unexpected: {:?}", other),
    }
    slow.join()?;
    println!("   result: {}", slow.get_result()?);

    println!("\n4. Panics are reported through the result:");
    let mut failing = Thread::<()>::spawn(|| panic!("sensor offline"))?;
    failing.join()?;
    if let Err(err) = failing.get_result() {
        println!("   {}", err);
    }

    println!("\n5. A mask with no cores flagged is rejected:");
    let props = SchedulingProperties::new().with_affinity_mask(&[false, false, false, false]);
    match Thread::with_properties(props, || ()) {
        Err(err) => println!("   rejected: {}", err),
        Ok(_) => println!("   unexpectedly created"),
    }

    println!("\n6. Real-time scheduling usually needs privileges:");
    let props = SchedulingProperties::new().with_policy(Policy::Fifo);
    match Thread::with_properties(props, || ()) {
        Ok(mut thread) => {
            thread.join()?;
            println!("   FIFO thread ran");
        }
        Err(err) if err.is_scheduling_rejection() => println!("   rejected: {}", err),
        Err(err) => return Err(err),
    }

    println!("\n=== Example completed successfully ===");
    Ok(())
}
