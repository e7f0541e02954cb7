// The event loop of the current thread. It owns three sources of work:
//
// - jobs: deferred callbacks, run in FIFO order, each to completion
// - tasks: rust futures, polled on a `LocalPool` whenever there are no jobs
// - timers: callbacks on a virtual clock, fired when there are neither jobs nor runnable tasks
//
// Pan futures notify their handlers exclusively through jobs. Since everything here is
// thread-local, a future and all of its handlers live on one thread.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::{LocalFutureObj, LocalSpawn};
use tracing::{debug, trace, warn};

use crate::config::{self, Config};
use crate::error::LoopError;
use crate::types::futures::PanFuture;
use crate::value::Value;

// A unit of deferred work.
struct Job(Box<dyn FnOnce()>);

impl Job {
    fn new<F: FnOnce() + 'static>(f: F) -> Job {
        Job(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    // Keyed by deadline and registration sequence, so iteration order is firing order.
    timers: BTreeMap<(u64, u64), Job>,
    // The virtual clock, in milliseconds. Only advanced by firing timers.
    now: u64,
    next_timer: u64,
}

thread_local! {
    static QUEUE: RefCell<Queue> = RefCell::new(Queue::default());
    static POOL: RefCell<LocalPool> = RefCell::new(LocalPool::new());
    static SPAWNER: LocalSpawner = POOL.with(|pool| pool.borrow().spawner());
    static RUNNING: Cell<bool> = Cell::new(false);
}

/// Run `f` after the currently executing code, behind everything deferred before it.
pub fn defer<F: FnOnce() + 'static>(f: F) {
    QUEUE.with(|queue| queue.borrow_mut().jobs.push_back(Job::new(f)));
}

/// Run `f` once the virtual clock reaches `now() + delay`.
///
/// Timers with the same deadline fire in the order they were set.
pub fn set_timeout<F: FnOnce() + 'static>(delay: u64, f: F) {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let deadline = queue.now.saturating_add(delay);
        let sequence = queue.next_timer;
        queue.next_timer += 1;
        trace!(deadline, "timer set");
        queue.timers.insert((deadline, sequence), Job::new(f));
    });
}

/// The current reading of the virtual clock.
pub fn now() -> u64 {
    QUEUE.with(|queue| queue.borrow().now)
}

/// Run a rust future as a task on this thread's loop.
pub fn spawn<F: Future<Output = ()> + 'static>(task: F) -> Result<(), LoopError> {
    SPAWNER
        .with(|spawner| spawner.spawn_local_obj(LocalFutureObj::new(Box::pin(task))))
        .map_err(|err| LoopError::Spawn(err.to_string()))
}

/// Run until there is no work left, using the default config.
pub fn run() -> Result<(), LoopError> {
    run_with(config::default_config())
}

pub fn run_with(config: &Config) -> Result<(), LoopError> {
    drive(config, || false)
}

/// Run until `future` has settled and return its outcome.
///
/// Fails with `LoopError::Stalled` if the loop runs out of work while the future is pending.
pub fn run_until_settled(future: &PanFuture) -> Result<Result<Value, Value>, LoopError> {
    drive(config::default_config(), || !future.is_pending())?;
    future.outcome().ok_or(LoopError::Stalled)
}

// Resets the running flag even if a job panics.
struct Running;

impl Running {
    fn enter() -> Result<Running, LoopError> {
        RUNNING.with(|running| {
            if running.replace(true) {
                Err(LoopError::Reentrant)
            } else {
                Ok(Running)
            }
        })
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        RUNNING.with(|running| running.set(false));
    }
}

fn drive<D: Fn() -> bool>(config: &Config, done: D) -> Result<(), LoopError> {
    let _running = Running::enter()?;
    let mut executed = 0;

    while !done() {
        let job = match next_job() {
            Some(job) => job,
            None => {
                poll_tasks();
                if done() || has_jobs() {
                    continue;
                }

                match next_timer() {
                    Some(job) => job,
                    None => {
                        debug!(executed, "event loop idle");
                        return Ok(());
                    }
                }
            }
        };

        if let Some(budget) = config.job_budget {
            if executed >= budget {
                // Leave the job for the next run.
                QUEUE.with(|queue| queue.borrow_mut().jobs.push_front(job));
                warn!(budget, "event loop job budget exhausted");
                return Err(LoopError::BudgetExhausted { budget });
            }
        }

        executed += 1;
        job.run();
    }

    Ok(())
}

fn next_job() -> Option<Job> {
    QUEUE.with(|queue| queue.borrow_mut().jobs.pop_front())
}

fn has_jobs() -> bool {
    QUEUE.with(|queue| !queue.borrow().jobs.is_empty())
}

// Pops the earliest timer and advances the clock to its deadline.
fn next_timer() -> Option<Job> {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let key = *queue.timers.keys().next()?;
        queue.now = queue.now.max(key.0);
        queue.timers.remove(&key)
    })
}

fn poll_tasks() {
    POOL.with(|pool| pool.borrow_mut().run_until_stalled());
}
