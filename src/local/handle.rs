//! # Completion handle of an offloaded trigger.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::BusError;

/// Completes with the result of a trigger running on the tokio worker pool.
///
/// Awaiting is optional: dropping the handle detaches the work, it keeps running.
#[must_use = "dropping the handle detaches the trigger; await it to observe failures"]
#[derive(Debug)]
pub struct TriggerHandle {
    inner: JoinHandle<Result<(), BusError>>,
}

impl TriggerHandle {
    pub(crate) fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<(), BusError>> + Send + 'static,
    {
        Self {
            inner: tokio::spawn(work),
        }
    }

    /// True once the trigger finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Waits for the trigger to finish.
    pub async fn wait(self) -> Result<(), BusError> {
        self.await
    }
}

impl Future for TriggerHandle {
    type Output = Result<(), BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join)) => Poll::Ready(Err(BusError::Join {
                reason: join.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[tokio::test]
    async fn forwards_the_task_result() {
        let ok = TriggerHandle::spawn(async { Ok::<(), BusError>(()) });
        assert!(ok.await.is_ok());

        let err = TriggerHandle::spawn(async {
            Err::<(), BusError>(TransportError::ChannelClosed.into())
        });
        assert_eq!(
            err.wait().await.unwrap_err().as_label(),
            "transport_channel_closed"
        );
    }

    #[tokio::test]
    async fn panicking_task_becomes_join_error() {
        let handle = TriggerHandle::spawn(async {
            let lost = true;
            if lost {
                panic!("lost");
            }
            Ok::<(), BusError>(())
        });
        assert_eq!(handle.await.unwrap_err().as_label(), "bus_join");
    }
}
