use std::time::Duration;

/// Number of passes over the seed list before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Pause between two consecutive passes.
pub const DEFAULT_ATTEMPT_INTERVAL: Duration = Duration::from_secs(5);
/// Budget shared by every connection, RPC and redirect of one join.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
/// Leader hops followed from a single seed before the seed is abandoned.
pub const DEFAULT_MAX_REDIRECTS: usize = 32;

/// Configuration for joining an existing cluster.
///
/// `join_addrs` are the seed nodes, tried in the order given on every round.
/// Any of them may be a follower; the joiner follows leader hints from there.
#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub join_addrs: Vec<String>, // host:port format, supports both IP and hostnames
    pub attempts: u32,
    pub attempt_interval: Duration,
    /// Total time budget, fixed once when the join starts. It is not
    /// refreshed between rounds and does not bound `attempt_interval`.
    pub deadline: Duration,
    pub max_redirects: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            join_addrs: Vec::new(),
            attempts: DEFAULT_ATTEMPTS,
            attempt_interval: DEFAULT_ATTEMPT_INTERVAL,
            deadline: DEFAULT_DEADLINE,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl JoinConfig {
    pub fn new<I, S>(join_addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            join_addrs: join_addrs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_join_addr(mut self, addr: impl Into<String>) -> Self {
        self.join_addrs.push(addr.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_attempt_interval(mut self, interval: Duration) -> Self {
        self.attempt_interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}
