//! A single thread running deferred tasks, shared by every request of a node.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{self, AtomicBool},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::Result;

type Task = Box<dyn FnOnce() + Send>;

#[derive(Clone)]
pub struct Timer {
    sender: Sender<Scheduled>,
}

impl Debug for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("queued", &self.sender.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
/// Handle to a scheduled task, cancelling it prevents the task from running.
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, atomic::Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }
}

impl Timer {
    /// Spawn the timer thread, it stops once every [Timer] clone is dropped.
    pub fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = flume::unbounded();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(receiver))?;

        Ok(Self { sender })
    }

    /// Run `task` on the timer thread after `delay`, unless the returned handle is cancelled first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = TimerHandle::default();

        let scheduled = Scheduled {
            deadline: Instant::now() + delay,
            seq: 0,
            cancelled: handle.cancelled.clone(),
            task: Box::new(task),
        };

        if self.sender.send(scheduled).is_err() {
            debug!("Timer thread is gone, task will never run");
        }

        handle
    }
}

struct Scheduled {
    deadline: Instant,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    task: Task,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed, so the max-heap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

fn run(receiver: Receiver<Scheduled>) {
    let mut queue = BinaryHeap::<Scheduled>::new();
    let mut seq = 0_u64;

    loop {
        let received = match queue.peek() {
            Some(next) => receiver.recv_deadline(next.deadline),
            None => receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(mut scheduled) => {
                scheduled.seq = seq;
                seq = seq.wrapping_add(1);
                queue.push(scheduled);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();

        while queue.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = queue.pop() {
                if due.cancelled.load(atomic::Ordering::Acquire) {
                    continue;
                }
                (due.task)();
            }
        }
    }

    trace!(pending = queue.len(), "Timer thread stopped");
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_in_deadline_order() {
        let timer = Timer::new("timer-test").unwrap();
        let (tx, rx) = flume::unbounded();

        for (delay, label) in [(60, "c"), (20, "a"), (40, "b")] {
            let tx = tx.clone();
            timer.schedule(Duration::from_millis(delay), move || {
                let _ = tx.send(label);
            });
        }

        let order: Vec<_> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap())
            .collect();

        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn cancelled_task_does_not_run() {
        let timer = Timer::new("timer-test").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let handle = timer.schedule(Duration::from_millis(20), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();

        let c = counter.clone();
        timer.schedule(Duration::from_millis(40), move || {
            c.fetch_add(10, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(150));

        assert!(handle.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
