use thiserror::Error;

/// Memory sampling failures
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory sampling is not supported on this platform")]
    Unsupported,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: &'static str,
        source: std::io::Error,
    },

    #[error("Unexpected format in {0}")]
    Format(&'static str),
}

/// Samples process and system memory
pub trait MemoryMonitor: Send + Sync {
    /// Returns the memory currently used by this process, in MB
    fn current_usage_mb(&self) -> Result<u64, MemoryError>;

    /// Returns the memory still available to the process, in MB
    fn available_mb(&self) -> Result<u64, MemoryError> {
        Err(MemoryError::Unsupported)
    }
}

const STATM: &str = "/proc/self/statm";
const MEMINFO: &str = "/proc/meminfo";

// statm reports pages; 4 KiB pages are assumed.
const PAGE_SIZE_BYTES: u64 = 4096;

/// Reads memory figures from procfs
#[derive(Debug, Clone, Default)]
pub struct ProcessMemoryMonitor;

impl ProcessMemoryMonitor {
    pub fn new() -> Self {
        Self
    }
}

/// Parses the resident set size, in MB, from `/proc/self/statm` content
fn parse_statm_mb(content: &str) -> Result<u64, MemoryError> {
    let resident_pages: u64 = content
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .ok_or(MemoryError::Format(STATM))?;
    Ok(resident_pages * PAGE_SIZE_BYTES / (1024 * 1024))
}

/// Parses `MemAvailable`, in MB, from `/proc/meminfo` content
fn parse_meminfo_available_mb(content: &str) -> Result<u64, MemoryError> {
    content
        .lines()
        .find_map(|line| {
            let rest = line.strip_prefix("MemAvailable:")?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
        .map(|kb| kb / 1024)
        .ok_or(MemoryError::Format(MEMINFO))
}

fn read_proc(path: &'static str) -> Result<String, MemoryError> {
    if !cfg!(target_os = "linux") {
        return Err(MemoryError::Unsupported);
    }
    std::fs::read_to_string(path).map_err(|source| MemoryError::Io { path, source })
}

impl MemoryMonitor for ProcessMemoryMonitor {
    fn current_usage_mb(&self) -> Result<u64, MemoryError> {
        parse_statm_mb(&read_proc(STATM)?)
    }

    fn available_mb(&self) -> Result<u64, MemoryError> {
        parse_meminfo_available_mb(&read_proc(MEMINFO)?)
    }
}
