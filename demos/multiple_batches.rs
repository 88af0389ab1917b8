use futures_abort_queue::{RequestDescriptor, RequestQueue};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_RESULTS: usize = 6;

// Pretends to call `target`, taking a random amount of time and rejecting when
// the request carries `reject=true`.
async fn fake_api(request: Arc<RequestDescriptor>, token: CancellationToken) -> Result<String, String> {
  let ms = rand::rng().random_range(100..2000);
  let started = Instant::now();
  info!(target_url = %request.target(), key = ?request.option("key"), expected_ms = ms, "Calling API.");

  tokio::select! {
    _ = token.cancelled() => Err(format!("{} cancelled after {:?}", request.target(), started.elapsed())),
    _ = tokio::time::sleep(Duration::from_millis(ms)) => {
      if request.option("reject") == Some("true") {
        Err(format!("{} FAILURE after {:?}", request.target(), started.elapsed()))
      } else {
        Ok(format!("{} SUCCESS after {:?}", request.target(), started.elapsed()))
      }
    }
  }
}

fn batch(targets: &[(&str, bool)], first_key: usize) -> Vec<RequestDescriptor> {
  targets
    .iter()
    .enumerate()
    .map(|(i, (target, reject))| {
      let descriptor = RequestDescriptor::new(*target).with_option("key", (first_key + i).to_string());
      if *reject {
        descriptor.with_option("reject", "true")
      } else {
        descriptor
      }
    })
    .collect()
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Multiple Batches Example ---");
  let queue = RequestQueue::new(fake_api, Handle::current(), "multiple_batches");

  let producer = queue.clone();
  tokio::spawn(async move {
    let first = batch(
      &[("first.com", false), ("second.com", false), ("third.com", true), ("fourth.com", false)],
      0,
    );
    for descriptor in first {
      if let Err(e) = producer.submit(descriptor) {
        warn!("Submit rejected: {}", e);
      }
    }

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let second = batch(&[("fifth.com", true), ("sixth.com", false), ("seventh.com", false)], 4);
    for descriptor in second {
      if let Err(e) = producer.submit(descriptor) {
        warn!("Submit rejected: {}", e);
      }
    }
  });

  let mut results = queue.results();
  let mut count = 0;
  while let Some(record) = results.next().await {
    match record.error() {
      None => info!(id = record.id(), "Result: {:?}", record.data()),
      Some(e) => info!(id = record.id(), "Failure: {}", e),
    }
    count += 1;
    if count >= MAX_RESULTS {
      info!("Reached {} results. Closing queue.", MAX_RESULTS);
      queue.close();
    }
  }

  info!("Result stream terminated after {} results.", count);
  info!("--- Multiple Batches Example End ---");
}
