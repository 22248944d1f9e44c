use anp_core::{HistoryEntry, ReplyKey};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_ticks: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_ticks: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Armed,
    Satisfied,
    TimedOut,
}

/// Identifies one arm of the poller. Tick results that carry an older
/// generation belong to a superseded or finished poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollGeneration(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Result for a poll that is no longer armed. Nothing to do.
    Stale,
    Pending { ticks: u32 },
    Satisfied { replies: Vec<HistoryEntry> },
    TimedOut { ticks: u32 },
}

/// Waits for asynchronous agent replies by re-reading chat history.
///
/// The poller does no I/O. Its owner fetches history on every interval and
/// hands the result to [`ReplyPoller::on_tick`], or hands a history it got
/// another way to [`ReplyPoller::offer`]. Whichever delivers a fresh agent
/// reply first finishes the poll; later deliveries for that generation are
/// [`PollOutcome::Stale`].
#[derive(Debug)]
pub struct ReplyPoller {
    settings: PollSettings,
    state: PollState,
    generation: u64,
    ticks: u32,
    baseline: usize,
    seen: HashSet<ReplyKey>,
}

impl ReplyPoller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            state: PollState::Idle,
            generation: 0,
            ticks: 0,
            baseline: 0,
            seen: HashSet::new(),
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == PollState::Armed
    }

    pub fn generation(&self) -> PollGeneration {
        PollGeneration(self.generation)
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// History length recorded when the current poll was armed.
    pub fn baseline(&self) -> usize {
        self.baseline
    }

    pub fn has_seen(&self, entry: &HistoryEntry) -> bool {
        self.seen.contains(&entry.timestamp)
    }

    /// Start a new poll. Any poll still armed is superseded.
    pub fn arm(&mut self, baseline: usize) -> PollGeneration {
        if self.is_armed() {
            debug!(
                event = "poller_superseded",
                generation = self.generation,
                ticks = self.ticks
            );
        }
        self.generation += 1;
        self.state = PollState::Armed;
        self.ticks = 0;
        self.baseline = baseline;
        PollGeneration(self.generation)
    }

    pub fn on_tick(&mut self, generation: PollGeneration, history: &[HistoryEntry]) -> PollOutcome {
        if !self.accepts(generation) {
            return PollOutcome::Stale;
        }
        let replies = self.take_fresh(history);
        if !replies.is_empty() {
            self.state = PollState::Satisfied;
            return PollOutcome::Satisfied { replies };
        }
        self.count_miss()
    }

    /// A tick whose history fetch failed. Counts toward the timeout.
    pub fn on_tick_failed(&mut self, generation: PollGeneration) -> PollOutcome {
        if !self.accepts(generation) {
            return PollOutcome::Stale;
        }
        self.count_miss()
    }

    /// History delivered outside the tick loop, e.g. an explicit reload.
    /// Always records what it contains as seen; satisfies an armed poll when
    /// it carries a fresh agent reply.
    pub fn offer(&mut self, history: &[HistoryEntry]) -> PollOutcome {
        let replies = self.take_fresh(history);
        if !self.is_armed() || replies.is_empty() {
            return PollOutcome::Stale;
        }
        self.state = PollState::Satisfied;
        PollOutcome::Satisfied { replies }
    }

    fn accepts(&self, generation: PollGeneration) -> bool {
        self.is_armed() && generation.0 == self.generation
    }

    fn count_miss(&mut self) -> PollOutcome {
        self.ticks += 1;
        if self.ticks >= self.settings.max_ticks {
            self.state = PollState::TimedOut;
            return PollOutcome::TimedOut { ticks: self.ticks };
        }
        PollOutcome::Pending { ticks: self.ticks }
    }

    fn take_fresh(&mut self, history: &[HistoryEntry]) -> Vec<HistoryEntry> {
        let mut fresh = Vec::new();
        for entry in history.iter().filter(|entry| entry.is_agent_reply()) {
            if self.seen.insert(entry.timestamp.clone()) {
                fresh.push(entry.clone());
            }
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anp_core::ChatRole;

    fn entry(role: ChatRole, message: &str, from_agent: bool, stamp: &str) -> HistoryEntry {
        HistoryEntry {
            role,
            message: message.to_string(),
            from_agent,
            timestamp: ReplyKey::from(stamp),
        }
    }

    fn base_history() -> Vec<HistoryEntry> {
        vec![
            entry(ChatRole::User, "@weather today?", false, "1.0"),
            entry(ChatRole::Assistant, "sent to weather", false, "1.1"),
        ]
    }

    #[test]
    fn reply_on_third_tick_satisfies_and_never_times_out() {
        let mut poller = ReplyPoller::new(PollSettings::default());
        let generation = poller.arm(2);
        let history = base_history();
        assert_eq!(poller.on_tick(generation, &history), PollOutcome::Pending { ticks: 1 });
        assert_eq!(poller.on_tick(generation, &history), PollOutcome::Pending { ticks: 2 });

        let mut answered = history.clone();
        answered.push(entry(ChatRole::Assistant, "sunny", true, "2.0"));
        let PollOutcome::Satisfied { replies } = poller.on_tick(generation, &answered) else {
            panic!("expected satisfied")
        };
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message, "sunny");
        assert_eq!(poller.state(), PollState::Satisfied);

        for _ in 0..20 {
            assert_eq!(poller.on_tick(generation, &history), PollOutcome::Stale);
        }
        assert_eq!(poller.state(), PollState::Satisfied);
    }

    #[test]
    fn no_reply_times_out_exactly_once() {
        let mut poller = ReplyPoller::new(PollSettings::default());
        let generation = poller.arm(2);
        let history = base_history();
        let mut timeouts = 0;
        for _ in 0..15 {
            if let PollOutcome::TimedOut { ticks } = poller.on_tick(generation, &history) {
                assert_eq!(ticks, 15);
                timeouts += 1;
            }
        }
        assert_eq!(timeouts, 1);
        assert_eq!(poller.on_tick(generation, &history), PollOutcome::Stale);
        assert_eq!(poller.state(), PollState::TimedOut);
    }

    #[test]
    fn failed_fetches_count_as_ticks() {
        let mut poller = ReplyPoller::new(PollSettings {
            interval: Duration::from_millis(10),
            max_ticks: 2,
        });
        let generation = poller.arm(0);
        assert_eq!(poller.on_tick_failed(generation), PollOutcome::Pending { ticks: 1 });
        assert_eq!(poller.on_tick_failed(generation), PollOutcome::TimedOut { ticks: 2 });
    }

    #[test]
    fn rearming_supersedes_the_previous_generation() {
        let mut poller = ReplyPoller::new(PollSettings::default());
        let first = poller.arm(2);
        let second = poller.arm(4);
        assert_ne!(first, second);
        let mut answered = base_history();
        answered.push(entry(ChatRole::Assistant, "late", true, "3.0"));
        assert_eq!(poller.on_tick(first, &answered), PollOutcome::Stale);
        assert!(matches!(
            poller.on_tick(second, &answered),
            PollOutcome::Satisfied { .. }
        ));
        assert_eq!(poller.baseline(), 4);
    }

    #[test]
    fn seeded_replies_are_not_fresh() {
        let mut poller = ReplyPoller::new(PollSettings::default());
        let mut history = base_history();
        history.push(entry(ChatRole::Assistant, "old answer", true, "0.5"));
        assert_eq!(poller.offer(&history), PollOutcome::Stale);
        let generation = poller.arm(history.len());
        assert_eq!(poller.on_tick(generation, &history), PollOutcome::Pending { ticks: 1 });
    }

    #[test]
    fn push_delivery_wins_race_and_retires_the_tick_path() {
        let mut poller = ReplyPoller::new(PollSettings::default());
        let generation = poller.arm(2);
        let mut answered = base_history();
        answered.push(entry(ChatRole::Assistant, "pushed", true, "5.0"));

        assert!(matches!(
            poller.offer(&answered),
            PollOutcome::Satisfied { .. }
        ));
        assert_eq!(poller.on_tick(generation, &answered), PollOutcome::Stale);
    }

    #[test]
    fn offer_while_idle_only_records_seen() {
        let mut poller = ReplyPoller::new(PollSettings::default());
        let reply = entry(ChatRole::Assistant, "unsolicited", true, "9.0");
        assert_eq!(poller.offer(std::slice::from_ref(&reply)), PollOutcome::Stale);
        assert!(poller.has_seen(&reply));
    }
}
