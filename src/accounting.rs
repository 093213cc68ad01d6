//! Token accounting against a fixed budget.

use std::fmt;

/// Budget used when none is configured: the gpt-3.5-turbo context window,
/// which covers input and output tokens together.
pub const DEFAULT_BUDGET: u64 = 4096;

/// Running totals of tokens consumed against a fixed budget.
///
/// The accountant never rejects a turn and never clamps: once `used` passes
/// `budget`, `remaining` goes negative and stays representable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenAccountant {
    budget: u64,
    used: u64,
    turns: u64,
}

/// Point-in-time view of a [`TokenAccountant`], for display.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenSnapshot {
    /// Number of turns recorded.
    pub turns: u64,
    /// Tokens consumed so far.
    pub used: u64,
    /// `budget - used`; negative once the budget is exceeded.
    pub remaining: i64,
    /// `used / budget * 100`.
    pub percent_used: f64,
}

impl TokenAccountant {
    /// Creates an accountant for the given budget.
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            used: 0,
            turns: 0,
        }
    }

    /// Adds `delta` tokens and counts one more turn.
    pub fn record_turn(&mut self, delta: u64) {
        self.used = self.used.saturating_add(delta);
        self.turns = self.turns.saturating_add(1);
    }

    /// Returns the budget.
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Returns the tokens consumed so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Returns the number of turns recorded.
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Returns `budget - used`, which may be negative.
    pub fn remaining(&self) -> i64 {
        let budget = i128::from(self.budget);
        let used = i128::from(self.used);
        (budget - used).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Returns a snapshot of the totals.  Does not modify the accountant.
    pub fn snapshot(&self) -> TokenSnapshot {
        let percent_used = if self.budget == 0 {
            0.0
        } else {
            self.used as f64 / self.budget as f64 * 100.0
        };
        TokenSnapshot {
            turns: self.turns,
            used: self.used,
            remaining: self.remaining(),
            percent_used,
        }
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::new(DEFAULT_BUDGET)
    }
}

impl fmt::Display for TokenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Session Stats ===")?;
        writeln!(f, "Turns: {}", self.turns)?;
        writeln!(f, "Tokens Used: {}", self.used)?;
        writeln!(f, "Tokens Remaining: {}", self.remaining)?;
        writeln!(f, "Context Usage: {:.1}%", self.percent_used)?;
        write!(f, "=====================")
    }
}
