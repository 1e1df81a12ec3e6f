//! Session configuration.

use crate::IssuePolicy;

/// Default cycle budget for acceptance and response waits.
pub const DEFAULT_TIMEOUT_CYCLES: u32 = 1000;

/// Construction-time settings of an [`crate::AvalonMaster`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MasterConfig {
    /// Instance name, used as the log target suffix.
    pub name: String,
    /// Edges to wait for acceptance or a response, `None` to wait forever.
    pub timeout_cycles: Option<u32>,
    /// Initial value of the session's `exception_enabled` flag.
    pub exception_enabled: bool,
    /// When pending beats may be driven.
    pub issue_policy: IssuePolicy,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            name: String::from("master"),
            timeout_cycles: Some(DEFAULT_TIMEOUT_CYCLES),
            exception_enabled: true,
            issue_policy: IssuePolicy::Gapped,
        }
    }
}

impl MasterConfig {
    /// Default configuration under another instance name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the timeout budget; any negative value disables it.
    #[must_use]
    pub fn with_timeout_cycles(mut self, cycles: i64) -> Self {
        self.timeout_cycles = if cycles < 0 {
            None
        } else {
            Some(u32::try_from(cycles).unwrap_or(u32::MAX))
        };
        self
    }

    /// Sets the initial exception policy.
    #[must_use]
    pub const fn with_exception_enabled(mut self, enabled: bool) -> Self {
        self.exception_enabled = enabled;
        self
    }

    /// Sets the issue policy.
    #[must_use]
    pub const fn with_issue_policy(mut self, policy: IssuePolicy) -> Self {
        self.issue_policy = policy;
        self
    }

    /// Log target for this instance.
    #[must_use]
    pub fn log_target(&self) -> String {
        format!("avalon_mm::{}", self.name)
    }
}
