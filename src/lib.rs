//! Deferred values for the pan runtime.
//!
//! A [`PanFuture`] holds a value that becomes available later (or a reason why it never will).
//! Handlers registered with [`PanFuture::then`] run as jobs on the thread's [`event_loop`], never
//! synchronously, and in the order they were registered. A handler that returns another future
//! makes the derived future adopt that future's outcome.
//!
//! ```
//! use pan_futures::{event_loop, Fun, PanFuture, Value};
//!
//! let doubled = PanFuture::resolve(Value::Int(21)).then(
//!     Some(Fun::unary(|value| match value {
//!         Value::Int(n) => Ok(Value::Int(n * 2)),
//!         other => Err(other),
//!     })),
//!     None,
//! );
//!
//! assert_eq!(event_loop::run_until_settled(&doubled).unwrap(), Ok(Value::Int(42)));
//! ```

pub mod config;
pub mod error;
pub mod event_loop;
pub mod types;
pub mod value;

pub use crate::config::Config;
pub use crate::error::{ConfigError, LoopError};
pub use crate::types::futures::{FutureState, PanFuture, Resolver};
pub use crate::value::{Fun, Value};
