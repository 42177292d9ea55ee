use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upstream hit by two call sites that know nothing about each other
async fn load_settings(calls: Arc<AtomicUsize>) -> Result<String, std::io::Error> {
    calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(120)).await;
    Ok(r#"{"theme":"dark"}"#.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let calls = Arc::new(AtomicUsize::new(0));

    // Both tasks go through the crate-level bindings, so they share the
    // process-wide registry without passing a Deduplicator around
    println!("=== Two independent call sites, one upstream call ===");
    let from_sidebar = {
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            request_dedupe::dedupe("settings:u1", move || load_settings(calls)).await
        })
    };
    let from_header = {
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            request_dedupe::dedupe("settings:u1", move || load_settings(calls)).await
        })
    };

    println!("sidebar: {}", from_sidebar.await??);
    println!("header:  {}", from_header.await??);
    println!("upstream calls: {}", calls.load(Ordering::SeqCst));

    println!("\n=== Registry management ===");
    println!("has settings:u1 -> {}", request_dedupe::has("settings:u1"));
    println!("entries -> {}", request_dedupe::len());
    println!("stats -> {:?}", request_dedupe::shared().stats());

    request_dedupe::clear();
    println!("after clear, empty -> {}", request_dedupe::is_empty());

    Ok(())
}
