// SPDX-License-Identifier: Apache-2.0

//! # Mailbox queue
//!
//! The building block for every mailbox: an unbounded multi-producer,
//! single-consumer queue with an atomic depth counter. Any task may `push`
//! concurrently; only the owning actor task holds the receiver and pops.
//!
//! The depth counter exists for the drain-before-stop discipline: an actor
//! that has been asked to close keeps popping until every one of its queues
//! reports zero depth, so the counter is re-checked after every wake rather
//! than trusting one wakeup per item.
//!

use tokio::sync::mpsc;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::Error;

/// Producer half of a mailbox queue. Cheap to clone; shared by every task
/// that may deliver to the owning actor.
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
    depth: Arc<AtomicUsize>,
}

/// Consumer half of a mailbox queue. Owned exclusively by the actor task.
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
    depth: Arc<AtomicUsize>,
}

/// Creates a new mailbox queue pair.
pub fn queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        QueueSender {
            tx,
            depth: depth.clone(),
        },
        QueueReceiver { rx, depth },
    )
}

impl<T> QueueSender<T> {
    /// Enqueues one item. Fails with [`Error::QueueClosed`] once the receiver
    /// has been destroyed.
    ///
    /// The depth counter is raised before the send so a consumer that checks
    /// depth never sees fewer items than are reachable.
    pub fn push(&self, item: T) -> Result<(), Error> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(item).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::QueueClosed);
        }
        Ok(())
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            depth: self.depth.clone(),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Waits for the next item. Returns `None` once the queue is destroyed
    /// and drained.
    pub async fn pop(&mut self) -> Option<T> {
        let item = self.rx.recv().await;
        if item.is_some() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }

    /// Pops without waiting.
    pub fn try_pop(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => {
                self.depth.fetch_sub(1, Ordering::AcqRel);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// True when no items are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys the queue: no further `push` is permitted. Items already in
    /// transit can still be popped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn fifo_single_producer() {
        let (tx, mut rx) = queue();
        for i in 0..100 {
            tx.push(i).unwrap();
        }
        assert_eq!(rx.len(), 100);
        for i in 0..100 {
            assert_eq!(rx.try_pop(), Some(i));
        }
        assert!(rx.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fifo_per_producer_under_contention() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 1000;

        let (tx, mut rx) = queue::<(u64, u64)>();
        let mut tasks = Vec::new();
        for p in 0..PRODUCERS {
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                for seq in 0..PER_PRODUCER {
                    tx.push((p, seq)).unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut last_seen = vec![None::<u64>; PRODUCERS as usize];
        for _ in 0..(PRODUCERS * PER_PRODUCER) {
            let (p, seq) = rx.pop().await.unwrap();
            let last = &mut last_seen[p as usize];
            match last {
                None => assert_eq!(seq, 0),
                Some(prev) => assert_eq!(seq, *prev + 1),
            }
            *last = Some(seq);
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn push_after_close_fails() {
        let (tx, mut rx) = queue();
        tx.push(1u8).unwrap();
        rx.close();
        assert_eq!(tx.push(2u8), Err(Error::QueueClosed));
        // Items already in transit remain poppable.
        assert_eq!(rx.try_pop(), Some(1));
        assert_eq!(rx.try_pop(), None);
    }

    #[tokio::test]
    async fn depth_tracks_pop() {
        let (tx, mut rx) = queue();
        tx.push("a").unwrap();
        tx.push("b").unwrap();
        assert_eq!(rx.len(), 2);
        rx.pop().await.unwrap();
        assert_eq!(rx.len(), 1);
        rx.pop().await.unwrap();
        assert!(rx.is_empty());
    }
}
