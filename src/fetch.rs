//! Background fetch coordination.
//!
//! Each fetch runs a blocking operation on its own worker thread and reports
//! back through a single-consumer channel drained by the presentation loop.
//! Every issued fetch yields exactly one envelope, stamped with the slot it
//! targets and a per-slot increasing token so the consumer can discard
//! results that a newer request has superseded. Cancellation is cooperative:
//! a superseded fetch runs to completion and its envelope is simply dropped.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::reddit::{Comment, Post};

/// Which piece of UI state a fetch result targets. At most one in-flight
/// fetch per slot is current; older ones are superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchSlot {
    PostList,
    PostDetail,
}

/// Per-slot increasing sequence number identifying fetch freshness.
pub type RequestToken = u64;

#[derive(Debug)]
pub enum FetchPayload {
    Posts(Vec<Post>),
    Detail(Box<Post>, Vec<Comment>),
}

#[derive(Debug)]
pub struct FetchEnvelope {
    pub slot: FetchSlot,
    pub token: RequestToken,
    pub outcome: Result<FetchPayload>,
}

pub struct Coordinator {
    tx: Sender<FetchEnvelope>,
    next_list_token: RequestToken,
    next_detail_token: RequestToken,
}

impl Coordinator {
    pub fn new() -> (Self, Receiver<FetchEnvelope>) {
        let (tx, rx) = unbounded();
        (
            Coordinator {
                tx,
                next_list_token: 1,
                next_detail_token: 1,
            },
            rx,
        )
    }

    /// Allocates the next token for `slot` and starts `operation` on a worker
    /// thread. Returns immediately; the outcome arrives as one envelope on
    /// the receiver, with operation errors and panics both captured as
    /// failure outcomes.
    pub fn issue<F>(&mut self, slot: FetchSlot, operation: F) -> RequestToken
    where
        F: FnOnce() -> Result<FetchPayload> + Send + 'static,
    {
        let token = self.allocate(slot);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(operation)) {
                Ok(result) => result,
                Err(panic) => Err(anyhow!(
                    "fetch worker panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            let _ = tx.send(FetchEnvelope {
                slot,
                token,
                outcome,
            });
        });
        token
    }

    fn allocate(&mut self, slot: FetchSlot) -> RequestToken {
        let counter = match slot {
            FetchSlot::PostList => &mut self.next_list_token,
            FetchSlot::PostDetail => &mut self.next_detail_token,
        };
        let token = *counter;
        *counter = counter.wrapping_add(1);
        token
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn issue_yields_exactly_one_envelope() {
        let (mut coordinator, rx) = Coordinator::new();
        let token = coordinator.issue(FetchSlot::PostList, || Ok(FetchPayload::Posts(vec![])));
        assert_eq!(token, 1);

        let envelope = rx.recv_timeout(RECV_TIMEOUT).expect("envelope");
        assert_eq!(envelope.slot, FetchSlot::PostList);
        assert_eq!(envelope.token, token);
        assert!(envelope.outcome.is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn operation_error_becomes_failure_envelope() {
        let (mut coordinator, rx) = Coordinator::new();
        let token = coordinator.issue(FetchSlot::PostDetail, || Err(anyhow!("timeout")));

        let envelope = rx.recv_timeout(RECV_TIMEOUT).expect("envelope");
        assert_eq!(envelope.slot, FetchSlot::PostDetail);
        assert_eq!(envelope.token, token);
        let err = envelope.outcome.expect_err("failure outcome");
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn panicking_operation_becomes_failure_envelope() {
        let (mut coordinator, rx) = Coordinator::new();
        coordinator.issue(FetchSlot::PostList, || panic!("worker exploded"));

        let envelope = rx.recv_timeout(RECV_TIMEOUT).expect("envelope");
        let err = envelope.outcome.expect_err("failure outcome");
        assert_eq!(err.to_string(), "fetch worker panicked: worker exploded");
    }

    #[test]
    fn formatted_panic_payload_is_preserved() {
        let (mut coordinator, rx) = Coordinator::new();
        coordinator.issue(FetchSlot::PostDetail, || {
            panic!("index {} out of range", 42)
        });

        let envelope = rx.recv_timeout(RECV_TIMEOUT).expect("envelope");
        let err = envelope.outcome.expect_err("failure outcome");
        assert_eq!(
            err.to_string(),
            "fetch worker panicked: index 42 out of range"
        );
    }

    #[test]
    fn tokens_increase_independently_per_slot() {
        let (mut coordinator, rx) = Coordinator::new();
        let list_one = coordinator.issue(FetchSlot::PostList, || Ok(FetchPayload::Posts(vec![])));
        let list_two = coordinator.issue(FetchSlot::PostList, || Ok(FetchPayload::Posts(vec![])));
        let detail_one = coordinator.issue(FetchSlot::PostDetail, || {
            Ok(FetchPayload::Detail(Box::default(), vec![]))
        });

        assert_eq!(list_one, 1);
        assert_eq!(list_two, 2);
        assert_eq!(detail_one, 1);

        for _ in 0..3 {
            rx.recv_timeout(RECV_TIMEOUT).expect("envelope");
        }
    }
}
