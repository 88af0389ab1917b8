use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Free-form per-request options handed to the operation untouched.
pub type RequestConfig = HashMap<String, String>;

/// The future an operation returns. It must be `Send` and `'static` so it can
/// be spawned on the queue's runtime.
pub type OperationFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// Type-erased operation shared by every launch of a queue.
pub(crate) type SharedOperation<T, E> =
  Arc<dyn Fn(Arc<RequestDescriptor>, CancellationToken) -> OperationFuture<T, E> + Send + Sync + 'static>;

/// Describes one unit of work: what to call and with which options.
///
/// Immutable once submitted; the queue shares it between the running
/// operation and the eventual [`ResultRecord`](crate::ResultRecord).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
  target: String,
  config: Option<RequestConfig>,
}

impl RequestDescriptor {
  pub fn new(target: impl Into<String>) -> Self {
    Self {
      target: target.into(),
      config: None,
    }
  }

  pub fn with_config(mut self, config: RequestConfig) -> Self {
    self.config = Some(config);
    self
  }

  /// Adds a single option, creating the config map if needed.
  pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self
      .config
      .get_or_insert_with(RequestConfig::new)
      .insert(key.into(), value.into());
    self
  }

  /// The URL or key the operation is invoked with.
  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn config(&self) -> Option<&RequestConfig> {
    self.config.as_ref()
  }

  /// Looks up one option by key.
  pub fn option(&self, key: &str) -> Option<&str> {
    self.config.as_ref()?.get(key).map(String::as_str)
  }
}

/// Boxes a caller-supplied async function into the queue's operation type.
pub(crate) fn share_operation<T, E, F, Fut>(operation: F) -> SharedOperation<T, E>
where
  F: Fn(Arc<RequestDescriptor>, CancellationToken) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  Arc::new(
    move |request: Arc<RequestDescriptor>, token: CancellationToken| -> OperationFuture<T, E> {
      Box::pin(operation(request, token))
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_options_are_looked_up_by_key() {
    let request = RequestDescriptor::new("first.example")
      .with_option("key", "abc")
      .with_option("reject", "true");

    assert_eq!(request.target(), "first.example");
    assert_eq!(request.option("key"), Some("abc"));
    assert_eq!(request.option("reject"), Some("true"));
    assert_eq!(request.option("missing"), None);
    assert_eq!(request.config().map(|c| c.len()), Some(2));
  }

  #[test]
  fn test_descriptor_without_config() {
    let request = RequestDescriptor::new("plain");
    assert!(request.config().is_none());
    assert_eq!(request.option("key"), None);
  }
}
