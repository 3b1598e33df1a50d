//! Priority-weighted queue dispatch (§4.8, §5): one channel per
//! [`Queue`](crate::worker::job::Queue), drained with a fixed `6:3:1`
//! weighted round-robin so that, in the steady state, roughly 6 of every
//! 10 dispatched jobs come from `critical`, 3 from `default`, 1 from
//! `low` — not strict priority, which would starve `low` entirely.

use tokio::sync::mpsc;

use crate::worker::job::{Job, Queue};

const CRITICAL_WEIGHT: u32 = 6;
const DEFAULT_WEIGHT: u32 = 3;
const LOW_WEIGHT: u32 = 1;

#[derive(Clone)]
pub struct QueueSender {
    critical: mpsc::Sender<Job>,
    default: mpsc::Sender<Job>,
    low: mpsc::Sender<Job>,
}

impl QueueSender {
    pub async fn send(&self, job: Job) -> Result<(), mpsc::error::SendError<Job>> {
        match job.queue {
            Queue::Critical => self.critical.send(job).await,
            Queue::Default => self.default.send(job).await,
            Queue::Low => self.low.send(job).await,
        }
    }
}

pub struct WeightedQueue {
    critical: mpsc::Receiver<Job>,
    default: mpsc::Receiver<Job>,
    low: mpsc::Receiver<Job>,
    cursor: Vec<Queue>,
    position: usize,
}

impl WeightedQueue {
    pub fn bounded(capacity: usize) -> (QueueSender, Self) {
        let (critical_tx, critical_rx) = mpsc::channel(capacity);
        let (default_tx, default_rx) = mpsc::channel(capacity);
        let (low_tx, low_rx) = mpsc::channel(capacity);

        let cursor = Self::build_weighted_cycle();

        (
            QueueSender { critical: critical_tx, default: default_tx, low: low_tx },
            Self { critical: critical_rx, default: default_rx, low: low_rx, cursor, position: 0 },
        )
    }

    /// Interleaves the three queues into one cycle of length
    /// `6 + 3 + 1 = 10`, e.g. `[C, D, C, L, C, D, C, D, C, C]`-shaped —
    /// the exact interleaving doesn't matter, only that each queue
    /// appears `weight` times per cycle.
    fn build_weighted_cycle() -> Vec<Queue> {
        let mut cycle = Vec::with_capacity((CRITICAL_WEIGHT + DEFAULT_WEIGHT + LOW_WEIGHT) as usize);
        let total = CRITICAL_WEIGHT + DEFAULT_WEIGHT + LOW_WEIGHT;
        let mut remaining = [CRITICAL_WEIGHT, DEFAULT_WEIGHT, LOW_WEIGHT];
        for _ in 0..total {
            let max_index = remaining.iter().enumerate().max_by_key(|(_, &w)| w).map(|(i, _)| i).unwrap();
            remaining[max_index] -= 1;
            cycle.push(match max_index {
                0 => Queue::Critical,
                1 => Queue::Default,
                _ => Queue::Low,
            });
        }
        cycle
    }

    /// Pulls the next job, trying queues in weighted order but falling
    /// through to whichever non-empty queue comes next so an idle
    /// `critical` queue never blocks `default`/`low` progress.
    pub async fn recv(&mut self) -> Option<Job> {
        loop {
            let preferred = self.cursor[self.position];
            self.position = (self.position + 1) % self.cursor.len();

            let order: [Queue; 3] = match preferred {
                Queue::Critical => [Queue::Critical, Queue::Default, Queue::Low],
                Queue::Default => [Queue::Default, Queue::Critical, Queue::Low],
                Queue::Low => [Queue::Low, Queue::Critical, Queue::Default],
            };

            for queue in order {
                let received = match queue {
                    Queue::Critical => self.critical.try_recv(),
                    Queue::Default => self.default.try_recv(),
                    Queue::Low => self.low.try_recv(),
                };
                if let Ok(job) = received {
                    return Some(job);
                }
            }

            tokio::select! {
                job = self.critical.recv() => return job,
                job = self.default.recv() => return job,
                job = self.low.recv() => return job,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_cycle_has_the_stable_six_three_one_ratio() {
        let cycle = WeightedQueue::build_weighted_cycle();
        assert_eq!(cycle.iter().filter(|&&q| matches!(q, Queue::Critical)).count(), 6);
        assert_eq!(cycle.iter().filter(|&&q| matches!(q, Queue::Default)).count(), 3);
        assert_eq!(cycle.iter().filter(|&&q| matches!(q, Queue::Low)).count(), 1);
        assert_eq!(cycle.len(), 10);
    }

    #[tokio::test]
    async fn jobs_route_to_the_queue_they_were_enqueued_on() {
        let (sender, mut queue) = WeightedQueue::bounded(16);
        sender.send(Job::new("a:b", vec![], Queue::Low)).await.unwrap();
        let job = queue.recv().await.unwrap();
        assert!(matches!(job.queue, Queue::Low));
    }
}
