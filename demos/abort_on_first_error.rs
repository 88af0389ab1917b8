use futures::StreamExt;
use futures_abort_queue::{QueueConfig, RequestDescriptor, RequestQueue, WaitStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

async fn fake_api(request: Arc<RequestDescriptor>, token: CancellationToken) -> Result<String, String> {
  let ms: u64 = request.option("ms").and_then(|v| v.parse().ok()).unwrap_or(500);
  tokio::select! {
    _ = token.cancelled() => {
      info!(target_url = %request.target(), "Operation observed cancellation.");
      Err(format!("{} cancelled", request.target()))
    }
    _ = tokio::time::sleep(Duration::from_millis(ms)) => {
      if request.option("reject") == Some("true") {
        Err(format!("{} FAILURE", request.target()))
      } else {
        Ok(format!("{} SUCCESS", request.target()))
      }
    }
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Abort On First Error Example ---");
  let config = QueueConfig::default().with_wait(WaitStrategy::Poll(Duration::from_millis(100)));
  let queue = RequestQueue::with_config(fake_api, Handle::current(), "abort_on_first_error", config);

  let plan = [
    ("first.com", 300, false),
    ("second.com", 600, true),
    ("third.com", 3000, false),
    ("fourth.com", 4000, false),
  ];
  for (target, ms, reject) in plan {
    let mut descriptor = RequestDescriptor::new(target).with_option("ms", ms.to_string());
    if reject {
      descriptor = descriptor.with_option("reject", "true");
    }
    match queue.submit(descriptor) {
      Ok(id) => info!(id, target_url = %target, "Submitted."),
      Err(e) => tracing::error!("Failed to submit {}: {}", target, e),
    }
  }

  let mut stream = Box::pin(queue.results().into_stream());
  while let Some(record) = stream.next().await {
    if let Some(e) = record.error() {
      info!(id = record.id(), "First failure: {}. Aborting remaining requests.", e);
      let cancelled = queue.abort();
      info!(cancelled, "Abort signaled.");
    } else {
      info!(id = record.id(), "Result: {:?}", record.data());
    }
  }

  // Give cancelled operations a moment to log that they observed the signal.
  tokio::time::sleep(Duration::from_millis(50)).await;
  info!("--- Abort On First Error Example End ---");
}
