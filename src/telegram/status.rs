//! Single-writer status message.
//!
//! Progress callbacks fire from inside the pipeline and must not block it, so
//! they only publish the latest text. One task applies edits in order, and
//! [`StatusEditor::finish`] waits for that task before the final edit, so no
//! progress text can land on top of the result.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Applies one text to the status message.
pub type EditFn = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Idle,
    Progress(String),
    Closed,
}

pub struct StatusEditor {
    slot: watch::Sender<Slot>,
    worker: JoinHandle<()>,
    edit: EditFn,
}

impl StatusEditor {
    pub fn spawn(edit: EditFn) -> Self {
        let (slot, mut rx) = watch::channel(Slot::Idle);
        let worker_edit = edit.clone();
        let worker = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                match current {
                    Slot::Progress(text) => worker_edit(text).await,
                    Slot::Closed => break,
                    Slot::Idle => {}
                }
            }
        });
        Self { slot, worker, edit }
    }

    /// Handle for progress callbacks. Intermediate texts may be coalesced.
    pub fn publisher(&self) -> StatusPublisher {
        StatusPublisher(self.slot.clone())
    }

    /// Stops progress edits, waits for the one in flight, then applies `text`.
    ///
    /// Publishing after this point is a no-op.
    pub async fn finish(self, text: String) {
        self.slot.send_replace(Slot::Closed);
        if let Err(e) = self.worker.await {
            log::warn!("Status edit task ended abnormally: {}", e);
        }
        (self.edit)(text).await;
    }
}

#[derive(Clone)]
pub struct StatusPublisher(watch::Sender<Slot>);

impl StatusPublisher {
    pub fn publish(&self, text: String) {
        self.0.send_if_modified(|slot| {
            if *slot == Slot::Closed {
                return false;
            }
            *slot = Slot::Progress(text);
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Edit function that records texts after `delay`, like a slow API call.
    fn recorder(delay: Duration) -> (Arc<Mutex<Vec<String>>>, EditFn) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let edit: EditFn = Arc::new(move |text: String| {
            let sink = sink.clone();
            async move {
                tokio::time::sleep(delay).await;
                sink.lock().unwrap().push(text);
            }
            .boxed()
        });
        (seen, edit)
    }

    #[tokio::test]
    async fn test_final_text_lands_after_slow_progress_edits() {
        let (seen, edit) = recorder(Duration::from_millis(30));
        let editor = StatusEditor::spawn(edit);
        let publisher = editor.publisher();

        for percent in [10, 40, 70, 100] {
            publisher.publish(format!("📤 upload: {}%", percent));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        editor.finish("✅ Archived".to_string()).await;
        // Late callbacks from the pipeline change nothing
        publisher.publish("📤 upload: 100%".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last().map(String::as_str), Some("✅ Archived"));
        assert_eq!(seen.iter().filter(|t| t.starts_with('✅')).count(), 1);
        assert!(seen.len() >= 2, "{:?}", seen);
    }

    #[tokio::test]
    async fn test_progress_edits_apply_in_order() {
        let (seen, edit) = recorder(Duration::from_millis(1));
        let editor = StatusEditor::spawn(edit);
        let publisher = editor.publisher();

        for step in 0..5 {
            publisher.publish(format!("step {}", step));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        editor.finish("done".to_string()).await;

        let seen = seen.lock().unwrap();
        let steps: Vec<usize> = seen
            .iter()
            .filter_map(|t| t.strip_prefix("step ").and_then(|n| n.parse().ok()))
            .collect();
        assert!(steps.windows(2).all(|w| w[0] < w[1]), "{:?}", steps);
        assert_eq!(seen.last().map(String::as_str), Some("done"));
    }

    #[tokio::test]
    async fn test_finish_without_progress() {
        let (seen, edit) = recorder(Duration::ZERO);
        StatusEditor::spawn(edit).finish("❌ failed".to_string()).await;
        assert_eq!(*seen.lock().unwrap(), vec!["❌ failed".to_string()]);
    }
}
