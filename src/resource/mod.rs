//! Memory monitoring and the per-crawl resource guard

mod guard;
mod monitor;

pub use guard::ResourceGuard;
pub use monitor::{MemoryError, MemoryMonitor, ProcessMemoryMonitor};
