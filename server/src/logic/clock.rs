/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running(u64),
    Expired,
}

/// Seconds counter driven by the host's one-second timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Classic mode: elapsed seconds, the score of a won round.
    CountUp { elapsed: u64 },
    /// Challenge mode: seconds left in the round's budget.
    Countdown { remaining: u64 },
}

impl Clock {
    pub fn count_up() -> Self {
        Clock::CountUp { elapsed: 0 }
    }

    pub fn countdown(budget: u64) -> Self {
        Clock::Countdown { remaining: budget }
    }

    pub fn reading(&self) -> u64 {
        match self {
            Clock::CountUp { elapsed } => *elapsed,
            Clock::Countdown { remaining } => *remaining,
        }
    }

    /// Advance by one second. A countdown expires on the tick that reaches
    /// zero.
    pub fn tick(&mut self) -> Tick {
        match self {
            Clock::CountUp { elapsed } => {
                *elapsed = elapsed.saturating_add(1);
                Tick::Running(*elapsed)
            }
            Clock::Countdown { remaining } => {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    Tick::Expired
                } else {
                    Tick::Running(*remaining)
                }
            }
        }
    }
}
