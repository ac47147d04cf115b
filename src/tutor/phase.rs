//! Phases and difficulty levels of the tutoring cycle.

use std::fmt;

/// Position in the pedagogical cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Intro,
    Teach,
    Check,
    Challenge,
    Grade,
    Adapt,
    Spaced,
}

impl Phase {
    /// Phases the engine can rest in and resume from after an aborted
    /// step. Grade and Adapt are bookkeeping stops, never resumed into.
    pub fn is_stable(self) -> bool {
        matches!(
            self,
            Phase::Idle | Phase::Intro | Phase::Teach | Phase::Check | Phase::Challenge
        )
    }

    /// Check and Challenge wait for an answer before the cycle moves on.
    pub fn awaits_answer(self) -> bool {
        matches!(self, Phase::Check | Phase::Challenge)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Intro => "intro",
            Phase::Teach => "teach",
            Phase::Check => "check",
            Phase::Challenge => "challenge",
            Phase::Grade => "grade",
            Phase::Adapt => "adapt",
            Phase::Spaced => "spaced",
        };
        f.write_str(name)
    }
}

/// Question difficulty, adapted one notch at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Standard,
    Hard,
}

impl Difficulty {
    pub fn escalate(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Standard,
            Difficulty::Standard | Difficulty::Hard => Difficulty::Hard,
        }
    }

    /// Simplification drops straight to easy rather than one notch: a
    /// score under 50 means the level was badly misjudged.
    pub fn simplify(self) -> Self {
        Difficulty::Easy
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Standard => "standard",
            Difficulty::Hard => "hard",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_saturates_at_hard() {
        assert_eq!(Difficulty::Easy.escalate(), Difficulty::Standard);
        assert_eq!(Difficulty::Standard.escalate(), Difficulty::Hard);
        assert_eq!(Difficulty::Hard.escalate(), Difficulty::Hard);
    }

    #[test]
    fn simplify_always_lands_on_easy() {
        assert_eq!(Difficulty::Hard.simplify(), Difficulty::Easy);
        assert_eq!(Difficulty::Standard.simplify(), Difficulty::Easy);
        assert_eq!(Difficulty::Easy.simplify(), Difficulty::Easy);
    }

    #[test]
    fn waiting_phases_are_the_question_phases() {
        assert!(Phase::Check.awaits_answer());
        assert!(Phase::Challenge.awaits_answer());
        assert!(!Phase::Teach.awaits_answer());
        assert!(!Phase::Grade.awaits_answer());
    }
}
