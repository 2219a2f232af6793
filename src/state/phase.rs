/// Crawl lifecycle phases
///
/// A crawl moves forward through these phases and never back. Stop phases
/// are ranked so a harder stop always supersedes a softer one.
use std::fmt;

/// Represents the phase a single `crawl()` invocation is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Engine constructed, crawl not started
    Idle,

    /// Main loop dispatching work
    Running,

    /// Frontier drained, dispatched work allowed to finish
    SoftStopping,

    /// Frontier drained, dispatched work cancelled, hooks silenced
    HardStopping,

    /// Hard stop caused by the host's cancellation handle
    Cancelled,

    /// Crawl finished
    Done,
}

impl CrawlPhase {
    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::SoftStopping => 2,
            Self::HardStopping => 3,
            Self::Cancelled => 4,
            Self::Done => 5,
        }
    }

    /// Returns true if a crawl in this phase can move to `next`
    pub fn can_advance_to(self, next: CrawlPhase) -> bool {
        next.rank() > self.rank()
    }

    /// Moves to `next` if that is a forward transition
    ///
    /// # Returns
    ///
    /// * `true` - The phase changed
    /// * `false` - `next` is not ahead of the current phase
    pub fn advance(&mut self, next: CrawlPhase) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    /// Returns true if this phase stops new pages from being dispatched
    pub fn is_stopping(self) -> bool {
        matches!(self, Self::SoftStopping | Self::HardStopping | Self::Cancelled)
    }

    /// Returns true if lifecycle hooks must no longer fire
    pub fn hooks_silenced(self) -> bool {
        matches!(self, Self::HardStopping | Self::Cancelled)
    }

    /// Returns the string representation of this phase
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::SoftStopping => "soft_stopping",
            Self::HardStopping => "hard_stopping",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
