//! Overhead of an installed but untraced bridge.
//!
//! Times a recursive Fibonacci that reports every call through
//! `usdt_hooks::enter`, first with no bridge and then with the bridge
//! installed and no tracer attached. Both runs should take about the same
//! time, since the hooks stay disarmed until a tracer enables the probes.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --example overhead -- [n] [rounds]
//! ```

use std::hint::black_box;
use std::time::{Duration, Instant};

fn fib(n: u32) -> u64 {
    usdt_hooks::enter("fib");
    if n < 2 {
        u64::from(n)
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

fn time_rounds(n: u32, rounds: u32) -> Duration {
    let start = Instant::now();
    for _ in 0..rounds {
        black_box(fib(black_box(n)));
    }
    start.elapsed() / rounds
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let n: u32 = args.next().map_or(Ok(27), |s| s.parse())?;
    let rounds: u32 = args.next().map_or(Ok(5), |s| s.parse())?;
    if rounds == 0 {
        return Err("rounds must be at least 1".into());
    }

    // Warm up caches and the branch predictor.
    black_box(fib(20));

    let baseline = time_rounds(n, rounds);
    println!("fib({n}) without bridge: {baseline:?}");

    let bridge = usdt_bridge::install();
    println!("bridge state: {}", bridge.state());

    let with_bridge = time_rounds(n, rounds);
    println!("fib({n}) with bridge:    {with_bridge:?}");

    let ratio = with_bridge.as_secs_f64() / baseline.as_secs_f64();
    println!("overhead: {:+.1}%", (ratio - 1.0) * 100.0);

    bridge.shutdown();
    Ok(())
}
