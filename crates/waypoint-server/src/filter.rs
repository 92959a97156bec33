//! Significant-change filter for player state updates.

use crate::protocol::PlayerState;

/// Decides whether a state update differs enough from the last stored state
/// to be worth sending to other players.
#[derive(Clone, Copy, Debug)]
pub struct ChangeFilter {
    position_epsilon: f64,
    rotation_epsilon: f64,
}

impl ChangeFilter {
    /// Threshold used when none is configured.
    pub const DEFAULT_EPSILON: f64 = 0.001;

    /// Create a filter with explicit thresholds.
    pub fn new(position_epsilon: f64, rotation_epsilon: f64) -> Self {
        Self {
            position_epsilon,
            rotation_epsilon,
        }
    }

    /// `true` when `new` should be broadcast.
    ///
    /// A missing `old` state always counts as significant. Otherwise any
    /// position axis or the rotation moving by more than its epsilon, or
    /// either discrete flag flipping, is significant. Velocity and
    /// timestamps are ignored.
    pub fn significant(&self, old: Option<&PlayerState>, new: &PlayerState) -> bool {
        let Some(old) = old else {
            return true;
        };

        let (a, b) = (&old.position, &new.position);
        let moved = (a.x - b.x).abs() > self.position_epsilon
            || (a.y - b.y).abs() > self.position_epsilon
            || (a.z - b.z).abs() > self.position_epsilon;
        let turned = (old.rotation_y - new.rotation_y).abs() > self.rotation_epsilon;

        moved
            || turned
            || old.is_moving != new.is_moving
            || old.is_grounded != new.is_grounded
    }
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EPSILON, Self::DEFAULT_EPSILON)
    }
}
