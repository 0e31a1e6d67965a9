use std::fmt;

/// Aiming modes selectable with the mode button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Simple,
    /// Base tracking plus the cosmetic drop compensation.
    BallisticVisual,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Simple => Mode::BallisticVisual,
            Mode::BallisticVisual => Mode::Simple,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Simple => "SIMPLE",
            Mode::BallisticVisual => "BALLISTIC (visual)",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Emitted once per press, carrying the mode that is now active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeToggle {
    pub mode: Mode,
}

/// Rising-edge detector over a polled button level.
///
/// The caller samples the button once per tick. A press shorter than one
/// tick period can be missed; at the default 10ms tick interval plus frame
/// time that is well under any human press.
#[derive(Debug, Default)]
pub struct ModeStateMachine {
    mode: Mode,
    armed: bool,
}

impl ModeStateMachine {
    pub fn new(mode: Mode) -> Self {
        Self { mode, armed: false }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Feed one sample of the (already active-high) button signal.
    pub fn update(&mut self, pressed: bool) -> Option<ModeToggle> {
        match (pressed, self.armed) {
            (true, false) => {
                self.mode = self.mode.toggled();
                self.armed = true;
                Some(ModeToggle { mode: self.mode })
            }
            // Still held from an earlier tick.
            (true, true) => None,
            (false, _) => {
                self.armed = false;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press_and_release(sm: &mut ModeStateMachine, held_ticks: usize) -> usize {
        let mut toggles = 0;
        for _ in 0..held_ticks {
            if sm.update(true).is_some() {
                toggles += 1;
            }
        }
        if sm.update(false).is_some() {
            toggles += 1;
        }
        toggles
    }

    #[test]
    fn test_starts_in_simple_mode() {
        let sm = ModeStateMachine::default();
        assert_eq!(sm.mode(), Mode::Simple);
    }

    #[test]
    fn test_one_toggle_per_press_for_any_hold_length() {
        for held in 1..50 {
            let mut sm = ModeStateMachine::default();
            assert_eq!(press_and_release(&mut sm, held), 1, "held {held} ticks");
            assert_eq!(sm.mode(), Mode::BallisticVisual);
        }
    }

    #[test]
    fn test_holding_does_not_toggle_again() {
        let mut sm = ModeStateMachine::default();
        assert_eq!(
            sm.update(true),
            Some(ModeToggle {
                mode: Mode::BallisticVisual
            })
        );
        for _ in 0..1_000 {
            assert_eq!(sm.update(true), None);
        }
        assert_eq!(sm.mode(), Mode::BallisticVisual);
    }

    #[test]
    fn test_release_and_repress_toggles_once_more() {
        let mut sm = ModeStateMachine::default();
        sm.update(true);
        sm.update(true);
        sm.update(false);
        let toggle = sm.update(true);
        assert_eq!(toggle, Some(ModeToggle { mode: Mode::Simple }));
        assert_eq!(sm.mode(), Mode::Simple);
    }

    #[test]
    fn test_idle_signal_never_toggles() {
        let mut sm = ModeStateMachine::new(Mode::BallisticVisual);
        for _ in 0..100 {
            assert_eq!(sm.update(false), None);
        }
        assert_eq!(sm.mode(), Mode::BallisticVisual);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(Mode::Simple.to_string(), "SIMPLE");
        assert_eq!(Mode::BallisticVisual.to_string(), "BALLISTIC (visual)");
        assert_eq!(Mode::Simple.toggled().toggled(), Mode::Simple);
    }
}
