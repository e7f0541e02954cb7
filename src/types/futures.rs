// Pan futures: a container for an eventual value that settles exactly once and can be chained.
//
// All notification happens through the event loop. Handlers never run synchronously inside `then`
// or inside a settlement function, they run as jobs after the current code has returned.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::event_loop;
use crate::value::{Fun, Value};

/// The observable lifecycle of a `PanFuture`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Fulfilled,
    Rejected,
}

// A continuation pair. Exactly one of the two gets invoked, exactly once.
struct Reaction {
    on_fulfilled: Fun,
    on_rejected: Fun,
}

impl Reaction {
    fn run(self, outcome: &Result<Value, Value>) {
        // Reactions settle their derived future themselves, what they return is meaningless.
        let _ = match outcome {
            Ok(value) => self.on_fulfilled.apply(&[value.clone()]),
            Err(reason) => self.on_rejected.apply(&[reason.clone()]),
        };
    }
}

// The reactions live inside the pending state, so they are gone the moment the future settles.
// That also drops every handler closure, which is what breaks reference cycles between a future
// and handlers that capture it.
enum State {
    Pending(Vec<Reaction>),
    Fulfilled(Value),
    Rejected(Value),
}

struct Inner {
    id: u64,
    state: State,
}

thread_local! {
    static NEXT_ID: Cell<u64> = Cell::new(0);
}

/// A value that becomes available later, or fails to.
///
/// Cloning a `PanFuture` yields another handle to the same future.
///
/// Future state is reference counted rather than gc-managed: handles end up inside handler
/// closures and event loop jobs, which the collector cannot trace.
#[derive(Clone)]
pub struct PanFuture(Rc<RefCell<Inner>>);

impl PanFuture {
    /// Create a future and synchronously run `init` with its settlement capability.
    ///
    /// If `init` returns `Err`, the future is rejected with the thrown value (unless `init`
    /// already settled it).
    pub fn new<F>(init: F) -> PanFuture
    where
        F: FnOnce(&Resolver) -> Result<(), Value>,
    {
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });

        let future = PanFuture(Rc::new(RefCell::new(Inner {
            id,
            state: State::Pending(Vec::new()),
        })));
        let resolver = Resolver { future: future.clone() };

        if let Err(thrown) = init(&resolver) {
            trace!(future = id, "initializer threw");
            resolver.reject(thrown);
        }

        future
    }

    pub fn id(&self) -> u64 {
        self.0.borrow().id
    }

    pub fn state(&self) -> FutureState {
        match self.0.borrow().state {
            State::Pending(_) => FutureState::Pending,
            State::Fulfilled(_) => FutureState::Fulfilled,
            State::Rejected(_) => FutureState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == FutureState::Pending
    }

    // Peek at the outcome without registering anything.
    pub fn outcome(&self) -> Option<Result<Value, Value>> {
        match self.0.borrow().state {
            State::Pending(_) => None,
            State::Fulfilled(ref value) => Some(Ok(value.clone())),
            State::Rejected(ref reason) => Some(Err(reason.clone())),
        }
    }

    /// Register handlers for the outcome and return a future for the handler's result.
    ///
    /// A missing `on_fulfilled` passes the value through, a missing `on_rejected` rethrows the
    /// reason. If the invoked handler returns a future, the returned future adopts its outcome.
    pub fn then(&self, on_fulfilled: Option<Fun>, on_rejected: Option<Fun>) -> PanFuture {
        let on_fulfilled = on_fulfilled.unwrap_or_else(Fun::identity);
        let on_rejected = on_rejected.unwrap_or_else(Fun::thrower);

        PanFuture::new(|derived| {
            self.subscribe(Reaction {
                on_fulfilled: chain(on_fulfilled, derived.clone()),
                on_rejected: chain(on_rejected, derived.clone()),
            });
            Ok(())
        })
    }

    pub fn catch(&self, on_rejected: Option<Fun>) -> PanFuture {
        self.then(None, on_rejected)
    }

    fn subscribe(&self, reaction: Reaction) {
        let mut inner = self.0.borrow_mut();
        let id = inner.id;
        let outcome = match inner.state {
            State::Pending(ref mut reactions) => {
                reactions.push(reaction);
                return;
            }
            State::Fulfilled(ref value) => Ok(value.clone()),
            State::Rejected(ref reason) => Err(reason.clone()),
        };
        drop(inner);
        trace!(future = id, "subscribed to settled future");

        event_loop::defer(move || reaction.run(&outcome));
    }

    fn settle(&self, outcome: Result<Value, Value>) {
        let (id, reactions) = {
            let mut inner = self.0.borrow_mut();
            let id = inner.id;
            let reactions = match inner.state {
                State::Pending(ref mut reactions) => mem::replace(reactions, Vec::new()),
                _ => {
                    trace!(future = id, "already settled, ignoring");
                    return;
                }
            };

            inner.state = match outcome {
                Ok(ref value) => State::Fulfilled(value.clone()),
                Err(ref reason) => State::Rejected(reason.clone()),
            };
            (id, reactions)
        };

        trace!(future = id, fulfilled = outcome.is_ok(), reactions = reactions.len(), "settled");

        // One job for all reactions keeps them in registration order.
        if !reactions.is_empty() {
            event_loop::defer(move || {
                for reaction in reactions {
                    reaction.run(&outcome);
                }
            });
        }
    }
}

// Wraps a handler so that running it settles `derived`: a throw rejects, a returned future is
// adopted, anything else fulfills.
fn chain(handler: Fun, derived: Resolver) -> Fun {
    Fun::new(move |args| {
        match handler.apply(args) {
            Err(thrown) => derived.reject(thrown),
            Ok(Value::Future(ref returned)) => {
                returned.then(Some(derived.fulfiller()), Some(derived.rejecter()));
            }
            Ok(value) => derived.resolve(value),
        }
        Ok(Value::Nil)
    })
}

// Futures are compared by identity, two distinct futures are never equal.
impl PartialEq for PanFuture {
    fn eq(&self, other: &PanFuture) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PanFuture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => {
                let state = match inner.state {
                    State::Pending(_) => FutureState::Pending,
                    State::Fulfilled(_) => FutureState::Fulfilled,
                    State::Rejected(_) => FutureState::Rejected,
                };
                f.debug_struct("PanFuture")
                    .field("id", &inner.id)
                    .field("state", &state)
                    .finish()
            }
            Err(_) => f.write_str("PanFuture { <settling> }"),
        }
    }
}

/// The capability to settle one particular future. Only the future's initializer receives one.
#[derive(Clone)]
pub struct Resolver {
    future: PanFuture,
}

impl Resolver {
    // Fulfill the future with `value`. No-op if it has already settled. A future passed here is
    // stored as is, not adopted.
    pub fn resolve(&self, value: Value) {
        self.future.settle(Ok(value));
    }

    // Reject the future with `reason`. No-op if it has already settled.
    pub fn reject(&self, reason: Value) {
        self.future.settle(Err(reason));
    }

    // `resolve` as a function value, for passing to `then`.
    pub fn fulfiller(&self) -> Fun {
        let resolver = self.clone();
        Fun::unary(move |value| {
            resolver.resolve(value);
            Ok(Value::Nil)
        })
    }

    // `reject` as a function value, for passing to `then`.
    pub fn rejecter(&self) -> Fun {
        let resolver = self.clone();
        Fun::unary(move |reason| {
            resolver.reject(reason);
            Ok(Value::Nil)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::event_loop;

    fn pending() -> (PanFuture, Resolver) {
        let mut slot = None;
        let future = PanFuture::new(|resolver| {
            slot = Some(resolver.clone());
            Ok(())
        });
        (future, slot.expect("initializer runs synchronously"))
    }

    // A handler that appends `tag` to `log` and passes its argument on.
    fn logging(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Fun {
        let log = log.clone();
        Fun::unary(move |value| {
            log.borrow_mut().push(tag);
            Ok(value)
        })
    }

    #[test]
    fn starts_pending() {
        let (future, _resolver) = pending();
        assert_eq!(future.state(), FutureState::Pending);
        assert_eq!(future.outcome(), None);
    }

    #[test]
    fn settles_exactly_once() {
        let future = PanFuture::new(|resolver| {
            resolver.resolve(1.into());
            resolver.reject("late".into());
            resolver.resolve(2.into());
            Ok(())
        });
        assert_eq!(future.state(), FutureState::Fulfilled);
        assert_eq!(future.outcome(), Some(Ok(Value::Int(1))));

        let (future, resolver) = pending();
        resolver.reject("first".into());
        resolver.resolve(3.into());
        assert_eq!(future.outcome(), Some(Err(Value::from("first"))));

        let observed = future.then(None, None);
        assert_eq!(event_loop::run_until_settled(&observed), Ok(Err(Value::from("first"))));
    }

    #[test]
    fn initializer_throw_rejects() {
        let future = PanFuture::new(|_| Err("thrown".into()));
        assert_eq!(future.outcome(), Some(Err(Value::from("thrown"))));
    }

    #[test]
    fn initializer_throw_after_settling_is_ignored() {
        let future = PanFuture::new(|resolver| {
            resolver.resolve(5.into());
            Err("thrown".into())
        });
        assert_eq!(future.outcome(), Some(Ok(Value::Int(5))));
    }

    #[test]
    fn settling_with_a_future_does_not_flatten() {
        let inner = PanFuture::new(|resolver| {
            resolver.resolve(1.into());
            Ok(())
        });
        let outer = PanFuture::new(|resolver| {
            resolver.resolve(inner.clone().into());
            Ok(())
        });
        let stored = outer.outcome().and_then(|outcome| outcome.ok());
        assert_eq!(stored.as_ref().and_then(Value::as_future), Some(&inner));
    }

    #[test]
    fn handlers_never_run_inside_then() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let future = PanFuture::new(|resolver| {
            resolver.resolve(1.into());
            Ok(())
        });

        let derived = future.then(Some(logging(&log, "handler")), None);
        assert!(log.borrow().is_empty());
        assert!(derived.is_pending());

        assert_eq!(event_loop::run_until_settled(&derived), Ok(Ok(Value::Int(1))));
        assert_eq!(*log.borrow(), vec!["handler"]);
    }

    #[test]
    fn settling_defers_pending_handlers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (future, resolver) = pending();
        future.then(Some(logging(&log, "handler")), None);

        resolver.resolve(1.into());
        assert!(log.borrow().is_empty());

        event_loop::run().expect("loop runs");
        assert_eq!(*log.borrow(), vec!["handler"]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (future, resolver) = pending();
        future.then(Some(logging(&log, "a")), None);
        future.then(Some(logging(&log, "b")), None);
        resolver.resolve(Value::Nil);
        future.then(Some(logging(&log, "c")), None);
        future.then(Some(logging(&log, "d")), None);

        event_loop::run().expect("loop runs");
        assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn only_the_matching_handler_runs() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let rejected = PanFuture::new(|_| Err("no".into()));
        let derived = rejected.then(Some(logging(&log, "fulfilled")), Some(logging(&log, "rejected")));

        // The rejection handler returned normally, so the derived future is fulfilled.
        assert_eq!(event_loop::run_until_settled(&derived), Ok(Ok(Value::from("no"))));
        assert_eq!(*log.borrow(), vec!["rejected"]);
    }

    #[test]
    fn handler_throw_rejects_derived() {
        let future = PanFuture::new(|resolver| {
            resolver.resolve(1.into());
            Ok(())
        });
        let derived = future.then(Some(Fun::unary(|_| Err("handler failed".into()))), None);
        assert_eq!(
            event_loop::run_until_settled(&derived),
            Ok(Err(Value::from("handler failed")))
        );
    }

    #[test]
    fn rejection_skips_fulfillment_handlers_until_caught() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let caught = PanFuture::new(|_| Err("boom".into()))
            .then(Some(logging(&log, "first")), None)
            .then(Some(logging(&log, "second")), None)
            .catch(Some(Fun::unary(|reason| Ok(Value::array(vec!["caught".into(), reason])))));

        assert_eq!(
            event_loop::run_until_settled(&caught),
            Ok(Ok(Value::array(vec!["caught".into(), "boom".into()])))
        );
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn returned_futures_are_adopted() {
        let (later, resolver) = pending();
        let returned = later.clone();
        let derived = PanFuture::new(|r| {
            r.resolve(Value::Nil);
            Ok(())
        })
        .then(Some(Fun::unary(move |_| Ok(returned.clone().into()))), None);

        event_loop::run().expect("loop runs");
        assert!(derived.is_pending());

        resolver.reject("adopted".into());
        assert_eq!(event_loop::run_until_settled(&derived), Ok(Err(Value::from("adopted"))));
    }

    #[test]
    fn adoption_is_transitive() {
        let derived = PanFuture::new(|r| {
            r.resolve(1.into());
            Ok(())
        })
        .then(
            Some(Fun::unary(|value| {
                let nested = PanFuture::new(|r| {
                    r.resolve(value);
                    Ok(())
                })
                .then(
                    Some(Fun::unary(|value| {
                        let n = match value {
                            Value::Int(n) => n,
                            other => return Err(other),
                        };
                        Ok(PanFuture::new(|r| {
                            r.resolve(Value::Int(n + 1));
                            Ok(())
                        })
                        .into())
                    })),
                    None,
                );
                Ok(nested.into())
            })),
            None,
        );

        assert_eq!(event_loop::run_until_settled(&derived), Ok(Ok(Value::Int(2))));
    }

    #[test]
    fn pending_handler_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let (future, resolver) = pending();
        future.then(
            Some(Fun::unary(move |value| {
                counter.set(counter.get() + 1);
                Ok(value)
            })),
            Some(Fun::unary(|_| Err("rejection handler ran".into()))),
        );

        resolver.resolve(1.into());
        resolver.resolve(2.into());
        resolver.reject("late".into());
        event_loop::run().expect("loop runs");
        resolver.resolve(3.into());
        event_loop::run().expect("loop runs again");

        assert_eq!(calls.get(), 1);
        assert_eq!(future.outcome(), Some(Ok(Value::Int(1))));
    }

    #[test]
    fn settling_releases_handlers_that_capture_their_future() {
        let guard = Rc::new(());
        let released = Rc::downgrade(&guard);
        let (future, resolver) = pending();

        let captured = future.clone();
        future.then(
            Some(Fun::unary(move |value| {
                let _keep = (&captured, &guard);
                Ok(value)
            })),
            None,
        );
        assert!(released.upgrade().is_some());

        resolver.resolve(Value::Nil);
        event_loop::run().expect("loop runs");
        drop(future);
        drop(resolver);
        assert!(released.upgrade().is_none());
    }

    #[test]
    fn unfinished_work_survives_thread_exit() {
        let worker = std::thread::spawn(|| {
            let (future, resolver) = pending();
            future.then(Some(Fun::identity()), Some(Fun::thrower()));
            event_loop::set_timeout(100, move || resolver.resolve("late".into()));
            event_loop::defer(move || {
                future.then(None, None);
            });
        });
        assert!(worker.join().is_ok());
    }

    #[test]
    fn futures_compare_by_identity() {
        let (a, _ra) = pending();
        let (b, _rb) = pending();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }
}
