//! Per-subscription alert state machine.
//!
//! Decides when a new imbalance reading warrants a notification. The naive
//! policies both fail in practice: firing whenever the reading is above
//! threshold floods the subscriber every poll, and firing only on the upward
//! crossing stays silent while sustained pressure keeps drifting. The policy
//! here re-arms on any drop to or below threshold and, while above it, only
//! re-fires once the reading has moved at least `band` away from the value
//! that last fired.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertState {
    /// No baseline recorded; the next reading above threshold fires.
    NoAlert,
    /// Last reading that fired or confirmed firing.
    Alerted(f64),
}

impl AlertState {
    /// Advance the state with a new reading `v` against threshold `x`.
    /// Returns whether a notification is due. The state always advances,
    /// whether or not the notification is ultimately delivered.
    pub fn apply(&mut self, v: f64, x: f64, band: f64) -> bool {
        if v > x {
            let fired = match *self {
                AlertState::NoAlert => true,
                AlertState::Alerted(prev) => (v - prev).abs() >= band,
            };
            *self = AlertState::Alerted(v);
            fired
        } else {
            *self = AlertState::NoAlert;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAND: f64 = 0.02;

    #[test]
    fn first_crossing_fires() {
        let mut st = AlertState::NoAlert;
        assert!(st.apply(0.5, 0.3, BAND));
        assert_eq!(st, AlertState::Alerted(0.5));
    }

    #[test]
    fn below_threshold_never_fires() {
        let mut st = AlertState::NoAlert;
        assert!(!st.apply(0.1, 0.3, BAND));
        assert_eq!(st, AlertState::NoAlert);
    }

    #[test]
    fn small_drift_above_threshold_is_damped() {
        let mut st = AlertState::Alerted(0.5);
        assert!(!st.apply(0.51, 0.3, BAND));
        // baseline still advances to the latest reading
        assert_eq!(st, AlertState::Alerted(0.51));
    }

    #[test]
    fn meaningful_move_refires() {
        let mut st = AlertState::Alerted(0.5);
        assert!(st.apply(0.55, 0.3, BAND));
        assert_eq!(st, AlertState::Alerted(0.55));
    }

    #[test]
    fn band_boundary_is_inclusive() {
        let mut st = AlertState::Alerted(0.50);
        assert!(st.apply(0.52, 0.3, BAND));
    }

    #[test]
    fn downward_move_while_above_threshold_can_refire() {
        let mut st = AlertState::Alerted(0.55);
        assert!(st.apply(0.40, 0.3, BAND));
        assert_eq!(st, AlertState::Alerted(0.40));
    }

    #[test]
    fn drop_to_threshold_rearms() {
        let mut st = AlertState::Alerted(0.5);
        assert!(!st.apply(0.3, 0.3, BAND));
        assert_eq!(st, AlertState::NoAlert);
    }

    #[test]
    fn full_alert_lifecycle() {
        let x = 0.3;
        let mut st = AlertState::NoAlert;

        assert!(st.apply(0.5, x, BAND), "initial crossing fires");
        assert!(!st.apply(0.51, x, BAND), "0.01 drift damped");
        assert!(st.apply(0.55, x, BAND), "0.05 move re-fires");
        assert!(!st.apply(0.2, x, BAND), "drop below threshold is silent");
        assert_eq!(st, AlertState::NoAlert);
        assert!(st.apply(0.31, x, BAND), "re-armed crossing fires again");
    }
}
