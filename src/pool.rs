// Worker pools for the compression and extraction phases.
//
// Results land in a table addressed by original index, never by completion
// order. Each slot is written once by the worker that owns that index, so no
// lock is held around the work itself.

use crate::error::Result;
use crate::queue::BoundedWorkQueue;
use std::sync::OnceLock;
use std::thread;

pub struct ResultsTable<R> {
    slots: Vec<OnceLock<Result<R>>>,
}

impl<R> ResultsTable<R> {
    pub fn new(len: usize) -> Self {
        ResultsTable {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stores the outcome for `index`. A second write to the same slot is
    /// dropped and logged.
    pub fn store(&self, index: usize, value: Result<R>) {
        match self.slots.get(index) {
            Some(slot) => {
                if slot.set(value).is_err() {
                    log::error!("Result slot {} written twice, keeping the first value", index);
                }
            }
            None => log::error!("Result index {} out of range ({} slots)", index, self.slots.len()),
        }
    }

    pub fn is_filled(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|s| s.get().is_some())
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Slots in index order. `None` marks an index nobody reported on.
    pub fn into_slots(self) -> impl Iterator<Item = Option<Result<R>>> {
        self.slots.into_iter().map(OnceLock::into_inner)
    }
}

pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
    log_prefix: String,
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize, log_prefix: impl Into<String>) -> Self {
        WorkerPool {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            log_prefix: log_prefix.into(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `job` over every `(index, task)` on a fixed set of threads fed by a
    /// bounded queue. The calling thread is the producer; it blocks while the
    /// queue is full, then closes it and waits for every worker to exit.
    pub fn run<T, R, I, F>(&self, tasks: I, results: &ResultsTable<R>, job: F)
    where
        T: Send,
        R: Send + Sync,
        I: IntoIterator<Item = (usize, T)>,
        F: Fn(T) -> Result<R> + Sync,
    {
        let queue = BoundedWorkQueue::new(self.queue_capacity);
        let queue = &queue;
        let job = &job;
        let prefix = self.log_prefix.as_str();

        thread::scope(|s| {
            for worker_id in 0..self.workers {
                s.spawn(move || {
                    let _guard = CloseOnUnwind(queue);
                    let mut done = 0usize;
                    while let Some((index, task)) = queue.pop() {
                        let outcome = job(task);
                        if let Err(e) = &outcome {
                            log::warn!(
                                "[{}] worker {}: task #{} failed: {}",
                                prefix,
                                worker_id,
                                index,
                                e
                            );
                        }
                        results.store(index, outcome);
                        done += 1;
                    }
                    log::debug!("[{}] worker {} exiting after {} tasks", prefix, worker_id, done);
                });
            }

            for item in tasks {
                // Fails only if a worker panicked and closed the queue early
                if queue.push(item).is_err() {
                    break;
                }
            }
            queue.close();
        });
    }
}

// Closes the queue if a worker unwinds, so a producer blocked on a full
// queue wakes up and the scope can propagate the panic.
struct CloseOnUnwind<'a, T>(&'a BoundedWorkQueue<T>);

impl<T> Drop for CloseOnUnwind<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

/// One thread per task, no queue. Suits a modest number of tasks known up
/// front; larger batches should go through [`WorkerPool::run`].
pub fn spawn_per_task<T, R, I, F>(tasks: I, results: &ResultsTable<R>, job: F)
where
    T: Send,
    R: Send + Sync,
    I: IntoIterator<Item = (usize, T)>,
    F: Fn(T) -> Result<R> + Sync,
{
    let job = &job;
    thread::scope(|s| {
        for (index, task) in tasks {
            s.spawn(move || results.store(index, job(task)));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_results_follow_index_not_completion() {
        let pool = WorkerPool::new(4, 2, "test");
        let results = ResultsTable::new(8);
        // Early indices sleep longest so they finish last
        pool.run((0..8).map(|i| (i, i)), &results, |i| {
            thread::sleep(Duration::from_millis((8 - i as u64) * 5));
            Ok(i * 10)
        });

        let values: Vec<usize> = results.into_slots().map(|s| s.unwrap().unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[test]
    fn test_failures_stay_in_their_slot() {
        let pool = WorkerPool::new(3, 1, "test");
        let results = ResultsTable::new(5);
        pool.run((0..5).map(|i| (i, i)), &results, |i| {
            if i == 2 {
                Err(Error::EmptyAlphabet)
            } else {
                Ok(i)
            }
        });
        assert_eq!(results.filled(), 5);
        let slots: Vec<_> = results.into_slots().map(|s| s.unwrap()).collect();
        assert!(slots[2].is_err());
        assert_eq!(slots.iter().filter(|r| r.is_ok()).count(), 4);
    }

    #[test]
    fn test_every_task_runs_once() {
        let counter = AtomicUsize::new(0);
        let pool = WorkerPool::new(6, 3, "test");
        let results = ResultsTable::new(100);
        pool.run((0..100).map(|i| (i, ())), &results, |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(results.filled(), 100);
    }

    #[test]
    fn test_spawn_per_task() {
        let results = ResultsTable::new(4);
        spawn_per_task((0..4).map(|i| (i, i)), &results, |i| Ok(i + 1));
        let values: Vec<usize> = results.into_slots().map(|s| s.unwrap().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_panicking_workers_do_not_hang_producer() {
        let pool = WorkerPool::new(2, 1, "test");
        let results: ResultsTable<usize> = ResultsTable::new(50);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.run((0..50).map(|i| (i, i)), &results, |i: usize| -> Result<usize> {
                panic!("job {} blew up", i)
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(results.filled(), 0);
    }

    #[test]
    fn test_double_store_keeps_first() {
        let results = ResultsTable::new(1);
        results.store(0, Ok(1));
        results.store(0, Ok(2));
        results.store(5, Ok(3));
        assert!(results.is_filled(0));
        assert_eq!(results.into_slots().next().unwrap().unwrap().unwrap(), 1);
    }
}
