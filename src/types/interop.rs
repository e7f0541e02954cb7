// Bridges between pan futures and rust futures. Rust futures run as tasks on the event loop's
// local pool.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot::{self, Sender};
use futures::future;
use tracing::warn;

use crate::event_loop;
use crate::types::futures::PanFuture;
use crate::value::{Fun, Value};

type Slot = Rc<RefCell<Option<Sender<Result<Value, Value>>>>>;

impl PanFuture {
    /// Spawn `task` on the event loop and settle the returned future with its output.
    pub fn from_rust<F>(task: F) -> PanFuture
    where
        F: Future<Output = Result<Value, Value>> + 'static,
    {
        PanFuture::new(move |resolver| {
            let settle = resolver.clone();
            event_loop::spawn(async move {
                match task.await {
                    Ok(value) => settle.resolve(value),
                    Err(reason) => settle.reject(reason),
                }
            })
            .map_err(|err| {
                warn!(%err, "could not start rust task");
                Value::String(err.to_string())
            })
        })
    }

    /// A rust future that completes with this future's outcome.
    ///
    /// If this future can never settle anymore, the rust future stays pending forever.
    pub fn to_rust(&self) -> impl Future<Output = Result<Value, Value>> {
        let (sender, receiver) = oneshot::channel();
        let on_fulfilled: Slot = Rc::new(RefCell::new(Some(sender)));
        let on_rejected = on_fulfilled.clone();

        self.then(
            Some(Fun::unary(move |value| {
                send(&on_fulfilled, Ok(value));
                Ok(Value::Nil)
            })),
            Some(Fun::unary(move |reason| {
                send(&on_rejected, Err(reason));
                Ok(Value::Nil)
            })),
        );

        async move {
            match receiver.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => future::pending().await,
            }
        }
    }
}

fn send(slot: &Slot, outcome: Result<Value, Value>) {
    if let Some(sender) = slot.borrow_mut().take() {
        // The receiving side may have been dropped, nobody cares about the outcome then.
        let _ = sender.send(outcome);
    }
}
