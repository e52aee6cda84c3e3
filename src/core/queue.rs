//! Work queue feeding planned ranges to the worker pool

use tokio::sync::{mpsc, Mutex};

use crate::core::planner::ChunkRange;

/// Multi-consumer end of the queue, shared by all workers
#[derive(Debug)]
pub struct WorkQueue {
    rx: Mutex<mpsc::Receiver<ChunkRange>>,
}

/// Single producer end; dropping it closes the queue
#[derive(Debug)]
pub struct WorkProducer {
    tx: mpsc::Sender<ChunkRange>,
}

/// Create a bounded queue holding at most `capacity` pending ranges
pub fn work_queue(capacity: usize) -> (WorkProducer, WorkQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (WorkProducer { tx }, WorkQueue { rx: Mutex::new(rx) })
}

impl WorkQueue {
    /// Next range in planner order, or `None` once closed and drained
    pub async fn next(&self) -> Option<ChunkRange> {
        self.rx.lock().await.recv().await
    }
}

impl WorkProducer {
    /// Enqueue every range in order, then close the queue.
    ///
    /// Returns the number of ranges enqueued. Stops early if every consumer
    /// has gone away.
    pub async fn feed<I>(self, ranges: I) -> u64
    where
        I: IntoIterator<Item = ChunkRange>,
    {
        let mut sent = 0;
        for range in ranges {
            if self.tx.send(range).await.is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::plan_ranges;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_single_consumer_sees_planner_order() {
        let (producer, queue) = work_queue(2);
        let ranges: Vec<_> = plan_ranges(1000, 300).unwrap().collect();
        let feeder = tokio::spawn(producer.feed(ranges.clone()));

        let mut received = Vec::new();
        while let Some(range) = queue.next().await {
            received.push(range);
        }

        assert_eq!(feeder.await.unwrap(), 4);
        assert_eq!(received, ranges);
    }

    #[tokio::test]
    async fn test_every_range_delivered_exactly_once() {
        let (producer, queue) = work_queue(4);
        let queue = Arc::new(queue);
        let ranges: Vec<_> = plan_ranges(100_000, 7).unwrap().collect();
        tokio::spawn(producer.feed(ranges.clone()));

        let mut consumers = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(range) = queue.next().await {
                    taken.push(range);
                }
                taken
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for consumer in consumers {
            for range in consumer.await.unwrap() {
                assert!(seen.insert(range), "range {range} delivered twice");
                total += 1;
            }
        }
        assert_eq!(total, ranges.len());
    }

    #[tokio::test]
    async fn test_empty_plan_closes_immediately() {
        let (producer, queue) = work_queue(1);
        assert_eq!(producer.feed(plan_ranges(0, 10).unwrap()).await, 0);
        assert_eq!(queue.next().await, None);
    }
}
