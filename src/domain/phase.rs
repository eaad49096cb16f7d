// Room lifecycle phases and the explicit (phase, trigger) -> phase table.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lobby,
    Design,
    Demo,
    Round1,
    Reveal1,
    Interstitial,
    Round2,
    FinalReveal,
    Summary,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::Design => "design",
            Phase::Demo => "demo",
            Phase::Round1 => "round1",
            Phase::Reveal1 => "reveal1",
            Phase::Interstitial => "interstitial",
            Phase::Round2 => "round2",
            Phase::FinalReveal => "finalReveal",
            Phase::Summary => "summary",
        }
    }

    pub fn is_round(self) -> bool {
        matches!(self, Phase::Round1 | Phase::Round2)
    }

    /// Phases where teammates edit freely before scored play.
    pub fn is_practice(self) -> bool {
        matches!(self, Phase::Design | Phase::Demo)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that may move the phase forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StartRound,
    SkipToReveal,
    NextReveal,
    TimerExpired,
}

/// Per-room switches for the optional phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseToggles {
    pub design: bool,
    pub demo: bool,
    /// Interstitial ends on its own timer instead of waiting for the host.
    pub timed_interstitial: bool,
}

/// Looks up the transition table. `None` means the pair is undefined and must be ignored.
pub fn next_phase(phase: Phase, trigger: Trigger, toggles: PhaseToggles) -> Option<Phase> {
    use Phase::*;
    use Trigger::*;

    let after_design = if toggles.demo { Demo } else { Round1 };
    match (phase, trigger) {
        (Lobby, StartRound) => Some(if toggles.design { Design } else { after_design }),
        (Design, StartRound | TimerExpired) => Some(after_design),
        (Demo, StartRound | TimerExpired) => Some(Round1),
        (Round1, SkipToReveal | TimerExpired) => Some(Reveal1),
        (Reveal1, NextReveal) => Some(Interstitial),
        (Interstitial, StartRound) => Some(Round2),
        (Interstitial, TimerExpired) if toggles.timed_interstitial => Some(Round2),
        (Round2, SkipToReveal | TimerExpired) => Some(FinalReveal),
        (FinalReveal, NextReveal) => Some(Summary),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 9] = [
        Phase::Lobby,
        Phase::Design,
        Phase::Demo,
        Phase::Round1,
        Phase::Reveal1,
        Phase::Interstitial,
        Phase::Round2,
        Phase::FinalReveal,
        Phase::Summary,
    ];

    const ALL_TRIGGERS: [Trigger; 4] = [
        Trigger::StartRound,
        Trigger::SkipToReveal,
        Trigger::NextReveal,
        Trigger::TimerExpired,
    ];

    fn order(phase: Phase) -> usize {
        ALL_PHASES
            .iter()
            .position(|p| *p == phase)
            .unwrap_or(usize::MAX)
    }

    #[test]
    fn lobby_skips_disabled_optional_phases() {
        let none = PhaseToggles::default();
        assert_eq!(next_phase(Phase::Lobby, Trigger::StartRound, none), Some(Phase::Round1));

        let demo = PhaseToggles {
            demo: true,
            ..none
        };
        assert_eq!(next_phase(Phase::Lobby, Trigger::StartRound, demo), Some(Phase::Demo));

        let both = PhaseToggles {
            design: true,
            demo: true,
            timed_interstitial: false,
        };
        assert_eq!(next_phase(Phase::Lobby, Trigger::StartRound, both), Some(Phase::Design));
        assert_eq!(next_phase(Phase::Design, Trigger::TimerExpired, both), Some(Phase::Demo));
    }

    #[test]
    fn transitions_only_move_forward() {
        let toggles = PhaseToggles {
            design: true,
            demo: true,
            timed_interstitial: true,
        };
        for phase in ALL_PHASES {
            for trigger in ALL_TRIGGERS {
                if let Some(next) = next_phase(phase, trigger, toggles) {
                    assert!(order(next) > order(phase), "{phase} -> {next}");
                }
            }
        }
    }

    #[test]
    fn start_round_during_a_round_is_undefined() {
        let toggles = PhaseToggles::default();
        assert_eq!(next_phase(Phase::Round1, Trigger::StartRound, toggles), None);
        assert_eq!(next_phase(Phase::Round2, Trigger::StartRound, toggles), None);
        assert_eq!(next_phase(Phase::Lobby, Trigger::TimerExpired, toggles), None);
        assert_eq!(next_phase(Phase::Reveal1, Trigger::SkipToReveal, toggles), None);
    }

    #[test]
    fn summary_is_terminal() {
        let toggles = PhaseToggles::default();
        for trigger in ALL_TRIGGERS {
            assert_eq!(next_phase(Phase::Summary, trigger, toggles), None);
        }
    }

    #[test]
    fn untimed_interstitial_waits_for_host() {
        let toggles = PhaseToggles::default();
        assert_eq!(next_phase(Phase::Interstitial, Trigger::TimerExpired, toggles), None);
        assert_eq!(
            next_phase(Phase::Interstitial, Trigger::StartRound, toggles),
            Some(Phase::Round2)
        );
    }

    #[test]
    fn only_rounds_and_practice_phases_are_flagged() {
        let rounds: Vec<Phase> = ALL_PHASES.into_iter().filter(|p| p.is_round()).collect();
        assert_eq!(rounds, vec![Phase::Round1, Phase::Round2]);
        let practice: Vec<Phase> = ALL_PHASES.into_iter().filter(|p| p.is_practice()).collect();
        assert_eq!(practice, vec![Phase::Design, Phase::Demo]);
    }
}
