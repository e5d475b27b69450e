use strum::{AsRefStr, EnumIter, EnumString};

/// Star-count breakpoints. A repository with fewer stars than `STAR_TIERS[i]`
/// falls into tier `i`; anything at or above the last breakpoint is in the
/// open-ended top tier.
pub const STAR_TIERS: [u64; 11] = [5, 10, 30, 50, 100, 300, 500, 1000, 3000, 5000, 10000];

pub const TOP_TIER: u32 = STAR_TIERS.len() as u32;

// Experience needed for level `n + 1` is `LEVEL_STEP * n^2`.
pub const LEVEL_STEP: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum EventKind {
    #[strum(serialize = "pushevent")]
    Push,
    #[strum(serialize = "createevent")]
    Create,
    #[strum(serialize = "deleteevent")]
    Delete,
    #[strum(serialize = "issuesevent")]
    Issues,
    #[strum(serialize = "issuecommentevent")]
    IssueComment,
    #[strum(serialize = "watchevent")]
    Watch,
    #[strum(serialize = "forkevent")]
    Fork,
    #[strum(serialize = "pullrequestevent")]
    PullRequest,
    #[strum(serialize = "pullrequestreviewcommentevent")]
    PullRequestReviewComment,
}

/// How an event kind converts popularity into experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Award {
    Flat(u32),
    Tiered { base: u32 },
}

/// Which per-language counter an event kind bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Pushes,
    Creates,
    Deletes,
    Issues,
    Comments,
    Stars,
    Forks,
    PullRequests,
}

impl EventKind {
    /// Parses the archive's `type` field. Unrecognized kinds return `None`.
    pub fn from_type(kind: &str) -> Option<Self> {
        kind.parse().ok()
    }

    pub const fn award(self) -> Award {
        match self {
            Self::Push => Award::Tiered { base: 2 },
            Self::Issues => Award::Tiered { base: 3 },
            Self::PullRequest => Award::Tiered { base: 5 },
            Self::Create
            | Self::Delete
            | Self::IssueComment
            | Self::Watch
            | Self::Fork
            | Self::PullRequestReviewComment => Award::Flat(1),
        }
    }

    pub const fn counter(self) -> Counter {
        match self {
            Self::Push => Counter::Pushes,
            Self::Create => Counter::Creates,
            Self::Delete => Counter::Deletes,
            Self::Issues => Counter::Issues,
            Self::IssueComment | Self::PullRequestReviewComment => Counter::Comments,
            Self::Watch => Counter::Stars,
            Self::Fork => Counter::Forks,
            Self::PullRequest => Counter::PullRequests,
        }
    }
}

/// Index of the first breakpoint strictly greater than `stars`.
pub fn tier(stars: u64) -> u32 {
    STAR_TIERS
        .iter()
        .position(|breakpoint| stars < *breakpoint)
        .map_or(TOP_TIER, |index| index as u32)
}

pub fn score(kind: Option<EventKind>, stars: u64) -> u32 {
    match kind.map(EventKind::award) {
        Some(Award::Flat(xp)) => xp,
        Some(Award::Tiered { base }) => base + tier(stars),
        None => 0,
    }
}

pub fn level_for(experience: u64) -> u32 {
    // isqrt(u64::MAX / 10) fits in a u32.
    (experience / LEVEL_STEP).isqrt() as u32 + 1
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn tier_uses_strict_comparison() {
        assert_eq!(tier(0), 0);
        assert_eq!(tier(4), 0);
        assert_eq!(tier(5), 1);
        assert_eq!(tier(9), 1);
        assert_eq!(tier(10), 2);
        assert_eq!(tier(9999), 10);
        assert_eq!(tier(10000), TOP_TIER);
        assert_eq!(tier(u64::MAX), TOP_TIER);
    }

    #[test]
    fn push_on_breakpoint_moves_to_next_tier() {
        assert_eq!(score(Some(EventKind::Push), 10), 4);
        assert_eq!(score(Some(EventKind::Push), 7), 3);
    }

    #[test]
    fn tiered_kinds_have_their_own_base() {
        assert_eq!(score(Some(EventKind::Push), 0), 2);
        assert_eq!(score(Some(EventKind::Issues), 0), 3);
        assert_eq!(score(Some(EventKind::PullRequest), 0), 5);
        assert_eq!(score(Some(EventKind::PullRequest), 20000), 16);
    }

    #[test]
    fn tiered_score_strictly_increases_with_tier() {
        let probes = [0, 5, 10, 30, 50, 100, 300, 500, 1000, 3000, 5000, 10000];
        for kind in [EventKind::Push, EventKind::Issues, EventKind::PullRequest] {
            let scores: Vec<_> = probes.iter().map(|s| score(Some(kind), *s)).collect();
            assert!(scores.windows(2).all(|w| w[0] < w[1]), "{kind:?}: {scores:?}");
        }
    }

    #[test]
    fn flat_kinds_ignore_popularity() {
        for kind in EventKind::iter().filter(|k| matches!(k.award(), Award::Flat(_))) {
            assert_eq!(score(Some(kind), 0), 1);
            assert_eq!(score(Some(kind), 1_000_000), 1);
        }
    }

    #[test]
    fn unknown_kind_scores_nothing() {
        assert_eq!(EventKind::from_type("GollumEvent"), None);
        assert_eq!(score(None, 100), 0);
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!(EventKind::from_type("WatchEvent"), Some(EventKind::Watch));
        assert_eq!(EventKind::from_type("pushevent"), Some(EventKind::Push));
        assert_eq!(EventKind::Watch.as_ref(), "watchevent");
    }

    #[test]
    fn comment_kinds_share_a_counter() {
        assert_eq!(EventKind::IssueComment.counter(), Counter::Comments);
        assert_eq!(
            EventKind::PullRequestReviewComment.counter(),
            Counter::Comments
        );
    }

    #[test]
    fn level_steps_on_squares() {
        assert_eq!(level_for(89), 3);
        assert_eq!(level_for(90), 4);
        assert_eq!(level_for(1000), 11);
        assert_eq!(level_for(u64::MAX), 1_358_187_914);
    }

    #[test]
    fn level_never_decreases() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(9), 1);
        assert_eq!(level_for(10), 2);
        assert_eq!(level_for(40), 3);
        let mut previous = 0;
        for xp in 0..5000 {
            let level = level_for(xp);
            assert!(level >= previous);
            previous = level;
        }
    }
}
