pub mod futures;

mod combinators;
mod interop;
