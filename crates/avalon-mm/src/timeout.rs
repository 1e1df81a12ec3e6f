//! Cycle-budget bookkeeping for acceptance stalls and outstanding responses.

/// Handshake phase a timeout fired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TimeoutPhase {
    /// Request held by `waitrequest`.
    Acceptance,
    /// Accepted beat never saw its valid strobe.
    Response,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Acceptance => "acceptance",
            Self::Response => "response",
        })
    }
}

/// Per-session cycle budget.
///
/// A budget of zero behaves like one: a beat always gets at least the edge
/// after it was driven or accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutMonitor {
    budget: Option<u32>,
}

impl TimeoutMonitor {
    /// Monitor with `budget` edges per phase, `None` to wait forever.
    #[must_use]
    pub const fn new(budget: Option<u32>) -> Self {
        let budget = match budget {
            Some(0) => Some(1),
            other => other,
        };
        Self { budget }
    }

    /// Effective budget in edges.
    #[must_use]
    pub const fn budget(&self) -> Option<u32> {
        self.budget
    }

    /// Counter loaded into a beat when it is accepted.
    #[must_use]
    pub const fn arm(&self) -> Option<u32> {
        self.budget
    }

    /// Consumes one edge from an outstanding beat's counter.
    ///
    /// Returns true when the counter reached zero.
    pub fn tick(remaining: &mut Option<u32>) -> bool {
        match remaining {
            Some(left) => {
                *left = left.saturating_sub(1);
                *left == 0
            }
            None => false,
        }
    }

    /// True once a request has been held for `stalled` edges.
    ///
    /// The first edge that finds `waitrequest` high is not counted against
    /// the budget.
    #[must_use]
    pub const fn stall_expired(&self, stalled: u32) -> bool {
        match self.budget {
            Some(budget) => stalled > budget,
            None => false,
        }
    }
}
