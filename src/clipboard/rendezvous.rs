//! Single-slot handoff between the transport thread and the download worker.
//!
//! A response payload is only valid while the transport callback is on the
//! stack. The transport therefore hands it over with [`Rendezvous::deliver`]
//! and stays blocked until the worker has finished with it and released the
//! [`Lease`]. The release carries the status the transport reports back.

use std::ops::Deref;

use clipsync_cliprdr::ResponseStatus;
use crossbeam_channel::{bounded, select, Receiver, Sender};

/// Handoff channel for one kind of response
#[derive(Debug)]
pub(crate) struct Rendezvous<T> {
    response_tx: Sender<T>,
    response_rx: Receiver<T>,
    ack_tx: Sender<ResponseStatus>,
    ack_rx: Receiver<ResponseStatus>,
}

/// How a wait ended without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupted {
    /// The cancel channel fired first
    Cancelled,
}

impl<T> Rendezvous<T> {
    pub(crate) fn new() -> Self {
        let (response_tx, response_rx) = bounded(1);
        let (ack_tx, ack_rx) = bounded(1);
        Self {
            response_tx,
            response_rx,
            ack_tx,
            ack_rx,
        }
    }

    /// Transport side: hand `response` to the worker and block until it is released.
    pub(crate) fn deliver(&self, response: T) -> ResponseStatus {
        if self.response_tx.send(response).is_err() {
            return ResponseStatus::Fail;
        }
        self.ack_rx.recv().unwrap_or(ResponseStatus::Fail)
    }

    /// Worker side: wait for a response, or for `cancel` to fire or disconnect.
    pub(crate) fn wait(&self, cancel: &Receiver<()>) -> Result<Lease<'_, T>, Interrupted> {
        select! {
            recv(self.response_rx) -> response => match response {
                Ok(value) => Ok(self.lease(value)),
                Err(_) => Err(Interrupted::Cancelled),
            },
            recv(cancel) -> _ => Err(Interrupted::Cancelled),
        }
    }

    /// Worker side: wait for a response that is known to be in flight.
    pub(crate) fn wait_claimed(&self) -> Option<Lease<'_, T>> {
        self.response_rx.recv().ok().map(|value| self.lease(value))
    }

    fn lease(&self, value: T) -> Lease<'_, T> {
        Lease {
            value,
            ack: &self.ack_tx,
            released: false,
        }
    }
}

/// Worker's borrow of a delivered response.
///
/// Dropping an unreleased lease reports [`ResponseStatus::Fail`].
#[derive(Debug)]
pub(crate) struct Lease<'a, T> {
    value: T,
    ack: &'a Sender<ResponseStatus>,
    released: bool,
}

impl<T> Lease<'_, T> {
    /// Finish with the response and unblock the transport
    pub(crate) fn release(mut self, status: ResponseStatus) {
        self.finish(status);
    }

    fn finish(&mut self, status: ResponseStatus) {
        if !self.released {
            self.released = true;
            let _ = self.ack.send(status);
        }
    }
}

impl<T> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        self.finish(ResponseStatus::Fail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_deliver_blocks_until_release() {
        let rendezvous = Arc::new(Rendezvous::<Vec<u8>>::new());
        let (_cancel_tx, cancel) = bounded::<()>(0);

        let transport = {
            let rendezvous = Arc::clone(&rendezvous);
            thread::spawn(move || {
                let started = Instant::now();
                let status = rendezvous.deliver(vec![1, 2, 3]);
                (status, started.elapsed())
            })
        };

        let lease = rendezvous.wait(&cancel).unwrap();
        assert_eq!(&**lease, &[1, 2, 3]);
        thread::sleep(Duration::from_millis(50));
        lease.release(ResponseStatus::Ok);

        let (status, blocked_for) = transport.join().unwrap();
        assert_eq!(status, ResponseStatus::Ok);
        assert!(blocked_for >= Duration::from_millis(50));
    }

    #[test]
    fn test_dropped_lease_reports_fail() {
        let rendezvous = Arc::new(Rendezvous::<u32>::new());
        let (_cancel_tx, cancel) = bounded::<()>(0);

        let transport = {
            let rendezvous = Arc::clone(&rendezvous);
            thread::spawn(move || rendezvous.deliver(7))
        };

        let lease = rendezvous.wait(&cancel).unwrap();
        assert_eq!(*lease, 7);
        drop(lease);

        assert_eq!(transport.join().unwrap(), ResponseStatus::Fail);
    }

    #[test]
    fn test_disconnected_cancel_wakes_wait() {
        let rendezvous = Rendezvous::<u32>::new();
        let (cancel_tx, cancel) = bounded::<()>(0);
        drop(cancel_tx);

        assert_eq!(rendezvous.wait(&cancel).unwrap_err(), Interrupted::Cancelled);
    }
}
