//! Subprocess harness (spec §4.A): spawn a child, stream stdout+stderr into
//! a shared buffer, match regex expectations against it, and deliver
//! signals.

mod error;
mod expect;
mod process;
mod signal;

pub use error::HarnessError;
pub use process::{Harness, NotStarted, Started};
pub use signal::HarnessSignal;
