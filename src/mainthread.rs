//! Main-thread scheduler
//!
//! Some platforms only accept hotkey registration from the thread that
//! owns the application's event pump. [`run`] turns the calling thread into
//! that thread: the real entry function moves to a worker thread, and the
//! calling thread executes closures submitted through a [`Scheduler`] until
//! the entry function returns.
//!
//! ```no_run
//! globalkey::mainthread::run(|scheduler| {
//!     let answer = scheduler.call(|| 6 * 7).unwrap();
//!     assert_eq!(answer, 42);
//!
//!     scheduler.go(|| println!("runs on the main thread later")).unwrap();
//! });
//! ```
//!
//! Tasks run in submission order; [`Scheduler::call`] and
//! [`Scheduler::go`] share one queue. A panicking task never stops the
//! loop. A panic inside `call` comes back to the caller as
//! [`Error::SchedulerFault`]; a panic inside `go` is kept for a later
//! [`Scheduler::error`] poll, up to [`MAX_FAULTS`] at a time.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Number of fire-and-forget faults retained until collected
pub const MAX_FAULTS: usize = 42;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    /// A closure to execute on the main thread
    Task { job: Job, detached: bool },
    /// The entry function has returned
    Finished,
}

struct Shared {
    tx: mpsc::Sender<Message>,
    main: ThreadId,
    faults: Mutex<VecDeque<Error>>,
}

/// Handle for submitting work to the main thread
///
/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

/// Sends `Finished` when the entry function ends, even by panicking
struct FinishGuard(mpsc::Sender<Message>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let _ = self.0.send(Message::Finished);
    }
}

/// Make the calling thread the main thread and run `entry` alongside it
///
/// Returns what `entry` returns. If `entry` panics, the panic resumes on
/// the calling thread after the dispatch loop has stopped.
///
/// # Panics
///
/// Panics if the worker thread for `entry` cannot be spawned.
pub fn run<F, R>(entry: F) -> R
where
    F: FnOnce(Scheduler) -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let scheduler = Scheduler {
        shared: Arc::new(Shared {
            tx: tx.clone(),
            main: thread::current().id(),
            faults: Mutex::new(VecDeque::with_capacity(MAX_FAULTS)),
        }),
    };

    info!(main = ?scheduler.shared.main, "main thread scheduler started");

    let worker = thread::Builder::new()
        .name("globalkey-entry".to_string())
        .spawn({
            let scheduler = scheduler.clone();
            move || {
                let _finish = FinishGuard(tx);
                entry(scheduler)
            }
        })
        .unwrap_or_else(|e| panic!("failed to spawn entry thread: {e}"));

    let mut executed = 0u64;
    while let Ok(message) = rx.recv() {
        match message {
            Message::Task { job, detached } => {
                executed += 1;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    // `call` jobs catch their own panics, so only detached
                    // tasks can land here.
                    let fault = Error::SchedulerFault(panic_message(payload.as_ref()));
                    if detached {
                        scheduler.record_fault(fault);
                    } else {
                        warn!(%fault, "main thread task panicked outside its caller");
                    }
                }
            }
            Message::Finished => break,
        }
    }

    // Nothing else runs after this point; queued `call`s observe
    // `SchedulerStopped` when their reply channel is dropped.
    drop(rx);
    debug!(executed, "main thread dispatch loop stopped");

    match worker.join() {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

impl Scheduler {
    /// Run `f` on the main thread and wait for its result
    ///
    /// Called from the main thread itself, `f` runs inline.
    pub fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_main_thread() {
            return panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| Error::SchedulerFault(panic_message(payload.as_ref())));
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = reply_tx.send(outcome);
        });
        self.submit(job, false)?;

        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(Error::SchedulerFault(panic_message(payload.as_ref()))),
            Err(_) => Err(Error::SchedulerStopped),
        }
    }

    /// Queue `f` for the main thread without waiting
    pub fn go<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(f), true)
    }

    /// Oldest uncollected fault from a [`go`](Self::go) task, if any
    pub fn error(&self) -> Option<Error> {
        self.shared
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Whether the current thread is this scheduler's main thread
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.shared.main
    }

    fn submit(&self, job: Job, detached: bool) -> Result<()> {
        self.shared
            .tx
            .send(Message::Task { job, detached })
            .map_err(|_| Error::SchedulerStopped)
    }

    fn record_fault(&self, fault: Error) {
        let mut faults = self
            .shared
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if faults.len() >= MAX_FAULTS {
            debug!(%fault, "fault buffer full, dropping fault");
            return;
        }
        warn!(%fault, "main thread task panicked");
        faults.push_back(fault);
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("main", &self.shared.main)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_call_runs_on_main_thread() {
        let main = thread::current().id();

        let ran_on = run(|scheduler| {
            assert!(!scheduler.is_main_thread());
            scheduler.call(|| thread::current().id()).unwrap()
        });

        assert_eq!(ran_on, main);
    }

    #[test]
    fn test_call_returns_after_execution() {
        run(|scheduler| {
            let done = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&done);
            scheduler
                .call(move || {
                    thread::sleep(std::time::Duration::from_millis(20));
                    flag.store(true, Ordering::SeqCst);
                })
                .unwrap();
            assert!(done.load(Ordering::SeqCst));
        });
    }

    #[test]
    fn test_fifo_order_single_submitter() {
        let order = run(|scheduler| {
            let seen = Arc::new(Mutex::new(Vec::new()));
            for i in 0..100 {
                let seen = Arc::clone(&seen);
                if i % 3 == 0 {
                    scheduler.call(move || seen.lock().unwrap().push(i)).unwrap();
                } else {
                    scheduler.go(move || seen.lock().unwrap().push(i)).unwrap();
                }
            }
            // Flush the queue.
            scheduler.call(|| ()).unwrap();
            let seen = seen.lock().unwrap().clone();
            seen
        });

        assert_eq!(order, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_submitters_keep_their_own_order() {
        let seen = run(|scheduler| {
            let seen = Arc::new(Mutex::new(Vec::new()));
            thread::scope(|s| {
                for worker in 0..4 {
                    let scheduler = scheduler.clone();
                    let seen = Arc::clone(&seen);
                    s.spawn(move || {
                        for i in 0..50 {
                            let seen = Arc::clone(&seen);
                            scheduler
                                .go(move || seen.lock().unwrap().push((worker, i)))
                                .unwrap();
                        }
                    });
                }
            });
            scheduler.call(|| ()).unwrap();
            let seen = seen.lock().unwrap().clone();
            seen
        });

        assert_eq!(seen.len(), 200);
        for worker in 0..4 {
            let own: Vec<_> = seen
                .iter()
                .filter(|(w, _)| *w == worker)
                .map(|(_, i)| *i)
                .collect();
            assert_eq!(own, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_call_surfaces_panic() {
        run(|scheduler| {
            let err = scheduler.call(|| panic!("boom")).unwrap_err();
            assert_eq!(err, Error::SchedulerFault("boom".to_string()));

            // The loop keeps going.
            assert_eq!(scheduler.call(|| 1).unwrap(), 1);
        });
    }

    #[test]
    fn test_go_fault_is_cached() {
        run(|scheduler| {
            assert!(scheduler.error().is_none());

            scheduler.go(|| panic!("die")).unwrap();
            scheduler.call(|| ()).unwrap();

            assert_eq!(
                scheduler.error(),
                Some(Error::SchedulerFault("die".to_string()))
            );
            assert!(scheduler.error().is_none());
        });
    }

    #[test]
    fn test_fault_buffer_is_bounded() {
        run(|scheduler| {
            for i in 0..MAX_FAULTS + 8 {
                scheduler.go(move || panic!("fault {i}")).unwrap();
            }
            assert_eq!(scheduler.call(|| "alive").unwrap(), "alive");

            let mut collected = Vec::new();
            while let Some(err) = scheduler.error() {
                collected.push(err);
            }
            assert_eq!(collected.len(), MAX_FAULTS);
            assert_eq!(collected[0], Error::SchedulerFault("fault 0".to_string()));

            // Space frees up once drained.
            scheduler.go(|| panic!("again")).unwrap();
            scheduler.call(|| ()).unwrap();
            assert!(scheduler.error().is_some());
        });
    }

    #[test]
    fn test_call_from_main_thread_runs_inline() {
        run(|scheduler| {
            let inner = scheduler.clone();
            let nested = scheduler
                .call(move || inner.call(|| "nested").unwrap())
                .unwrap();
            assert_eq!(nested, "nested");
        });
    }

    #[test]
    fn test_submissions_after_exit_fail() {
        let scheduler = run(|scheduler| scheduler);
        assert_eq!(scheduler.go(|| ()), Err(Error::SchedulerStopped));

        // Off the main thread, `call` has to go through the stopped queue.
        let outcome = thread::spawn(move || scheduler.call(|| ()))
            .join()
            .unwrap();
        assert_eq!(outcome, Err(Error::SchedulerStopped));
    }

    #[test]
    #[should_panic(expected = "entry failed")]
    fn test_entry_panic_resumes_on_main_thread() {
        run(|_scheduler| panic!("entry failed"));
    }
}
