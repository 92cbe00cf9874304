#![warn(missing_docs)]

//! Light weight helpers shared across the other crates in this workspace.
//! Everything in here is deliberately free of heavyweight dependencies.

mod sync;
pub use sync::*;

mod r#async;
pub use r#async::*;
