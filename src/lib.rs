//! Named critical sections over pluggable cross-process lock drivers.
//!
//! Application code talks to [`CriticalSection`], which tracks the labels
//! this process holds and forwards the real locking to a [`LockDriver`].
//! Drivers exist for advisory file locks, System-V semaphores, PostgreSQL and
//! MySQL named locks, and any key-value store offering sets, lists, blocking
//! pop and atomic batches (Redis out of the box).
//!
//! ```no_run
//! use critsec::CriticalSection;
//! use critsec::driver::FileDriver;
//!
//! # fn main() -> critsec::error::Result<()> {
//! let mut section = CriticalSection::new(FileDriver::new("/tmp/critsec")?);
//! if section.enter("nightly-report")? {
//!     // ... guarded work ...
//!     section.leave("nightly-report")?;
//! }
//! section.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod section;
pub mod store;

#[cfg(test)]
mod test_support;

pub use driver::LockDriver;
pub use error::{CriticalSectionError, Result};
pub use section::CriticalSection;
