use request_dedupe::{DedupeConfig, Deduplicator, SharedDeduplicator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stand-in for a slow upstream lookup
async fn fetch_profile(calls: Arc<AtomicUsize>) -> Result<String, std::io::Error> {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(150)).await;
    Ok(format!("profile payload #{call}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // Example 1: five workers ask for the same key at once
    println!("=== Coalescing concurrent lookups ===");
    let deduplicator: SharedDeduplicator = Arc::new(Deduplicator::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = vec![];
    for worker in 0..5 {
        let deduplicator = Arc::clone(&deduplicator);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            let value = deduplicator
                .dedupe("user:42/profile", move || fetch_profile(calls))
                .await?;
            println!("worker {worker} got: {value}");
            Ok::<_, request_dedupe::DedupeError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }
    println!(
        "5 workers, {} upstream call(s), {:?} total",
        calls.load(Ordering::SeqCst),
        start.elapsed()
    );

    // Example 2: results expire once the retention window passes
    println!("\n=== Retention window ===");
    let short_lived = Deduplicator::with_config(DedupeConfig::new(Duration::from_millis(100)));
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 1..=2 {
        let calls = Arc::clone(&calls);
        let value = short_lived
            .dedupe("user:42/profile", move || fetch_profile(calls))
            .await?;
        println!("round {round} got: {value}");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    println!(
        "2 rounds spaced past the window, {} upstream call(s)",
        calls.load(Ordering::SeqCst)
    );

    // Example 3: failures leave the registry right away, so retries hit
    // the upstream again
    println!("\n=== Failed entries leave immediately ===");
    let deduplicator = Deduplicator::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let flaky = |attempts: Arc<AtomicUsize>| async move {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == 1 {
            Err(std::io::Error::other("upstream briefly offline"))
        } else {
            Ok(format!("recovered on attempt {attempt}"))
        }
    };

    let first_attempts = Arc::clone(&attempts);
    let first = deduplicator
        .dedupe("user:42/avatar", move || flaky(first_attempts))
        .await;
    println!("first attempt: {:?}", first.err().map(|e| e.to_string()));
    println!(
        "entry still present: {}",
        deduplicator.has("user:42/avatar")
    );

    let second_attempts = Arc::clone(&attempts);
    let second = deduplicator
        .dedupe("user:42/avatar", move || flaky(second_attempts))
        .await?;
    println!("second attempt: {second}");

    println!("\nRegistry stats: {:?}", deduplicator.stats());

    Ok(())
}
