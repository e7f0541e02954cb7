// The static combinators. None of them touch a future's state directly, they are built from `new`
// and `then` alone.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::types::futures::PanFuture;
use crate::value::{Fun, Value};

impl PanFuture {
    /// A future for `value`. If `value` is itself a future, a new future adopting its outcome is
    /// returned instead of wrapping it.
    pub fn resolve(value: Value) -> PanFuture {
        match value {
            Value::Future(ref source) => PanFuture::new(|resolver| {
                source.then(Some(resolver.fulfiller()), Some(resolver.rejecter()));
                Ok(())
            }),
            value => PanFuture::new(|resolver| {
                resolver.resolve(value);
                Ok(())
            }),
        }
    }

    /// A future rejected with `reason`. The reason is never unwrapped, not even a future.
    pub fn reject(reason: Value) -> PanFuture {
        PanFuture::new(|resolver| {
            resolver.reject(reason);
            Ok(())
        })
    }

    /// Wait for all `values` and fulfill with an array of their results in input order.
    ///
    /// Values that are not futures count as already fulfilled. Rejects with the first rejection,
    /// everything that settles afterwards is ignored.
    pub fn all<I>(values: I) -> PanFuture
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();

        PanFuture::new(move |resolver| {
            if values.is_empty() {
                resolver.resolve(Value::array(Vec::new()));
                return Ok(());
            }

            // The pan array is only built once complete, the pending slots stay out of the gc heap.
            let results = Rc::new(RefCell::new(vec![Value::Nil; values.len()]));

            let remaining = Rc::new(Cell::new(values.len()));
            for (index, value) in values.into_iter().enumerate() {
                let results = results.clone();
                let remaining = remaining.clone();
                let done = resolver.clone();

                let on_fulfilled = Fun::unary(move |result| {
                    results.borrow_mut()[index] = result;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        done.resolve(Value::array(results.borrow().clone()));
                    }
                    Ok(Value::Nil)
                });

                PanFuture::resolve(value).then(Some(on_fulfilled), Some(resolver.rejecter()));
            }

            Ok(())
        })
    }

    /// Settle like whichever of `values` settles first. An empty race never settles.
    pub fn race<I>(values: I) -> PanFuture
    where
        I: IntoIterator<Item = Value>,
    {
        PanFuture::new(move |resolver| {
            for value in values {
                PanFuture::resolve(value).then(Some(resolver.fulfiller()), Some(resolver.rejecter()));
            }
            Ok(())
        })
    }
}
