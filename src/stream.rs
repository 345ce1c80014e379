//! Streaming mode: progress events delivered to one consumer as they happen.
//!
//! [`extract_stream`] registers a consumer with the caller's
//! [`ConnectionRegistry`], runs the request on a spawned task and returns the
//! receiving side as a `Stream`. Events arrive in emission order; the last
//! one is `complete` or `error`, after which the stream ends.
//!
//! Dropping the returned stream is a disconnect. The task notices at the next
//! stage boundary, stops, and its sink deregisters the consumer on the way
//! out. Nothing is reported as a failure.
//!
//! Generation requests use the longer streaming timeout.

use crate::extract::{ExtractionRequest, Extractor, RunMode, RunOutcome};
use crate::progress::ProgressEvent;
use crate::registry::{ConnectionId, ConnectionRegistry, RegisteredSink};
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of progress events.
pub type EventStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

/// A running streaming request.
pub struct ExtractionStream {
    pub id: ConnectionId,
    /// Progress events, terminal event last.
    pub events: EventStream,
    /// Resolves once processing has stopped and the consumer is released.
    pub task: JoinHandle<()>,
}

impl std::fmt::Debug for ExtractionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionStream")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Start `request` on a new task and stream its progress.
///
/// Fatal errors do not surface here; they arrive as the terminal `error`
/// event.
///
/// # Example
/// ```rust,no_run
/// use eventdoc_extract::{extract_stream, ConnectionRegistry, ExtractionConfig, ExtractionRequest, Extractor};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let registry = Arc::new(ConnectionRegistry::new());
/// let extractor = Extractor::new(ExtractionConfig::default());
/// let mut stream = extract_stream(&extractor, ExtractionRequest::Text("DR. A".into()), &registry);
/// while let Some(event) = stream.events.next().await {
///     println!("{:?}: {}", event.status, event.message);
/// }
/// # }
/// ```
pub fn extract_stream(
    extractor: &Extractor,
    request: ExtractionRequest,
    registry: &Arc<ConnectionRegistry>,
) -> ExtractionStream {
    let (id, rx) = registry.connect();
    info!("streaming request on {}", id);

    let extractor = extractor.clone();
    let registry = Arc::clone(registry);
    let task = tokio::spawn(async move {
        let mut sink = RegisteredSink::new(registry, id);
        match extractor.run(request, &mut sink, RunMode::Streaming).await {
            Ok(RunOutcome::Finished(_)) => debug!("{} finished", id),
            Ok(RunOutcome::Abandoned) => info!("{} abandoned by consumer", id),
            // Already delivered as the terminal error event.
            Err(e) => debug!("{} failed: {}", id, e),
        }
        // `sink` drops here: the consumer is deregistered and its stream ends.
    });

    ExtractionStream {
        id,
        events: Box::pin(UnboundedReceiverStream::new(rx)),
        task,
    }
}
