// Logical joint -> physical PWM channel mapping
//
// Each leg owns exactly one hip channel and one knee channel. The mapping
// and per-channel inversion are fixed at construction and never change.

/// The four legs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    /// Left front
    LF,
    /// Right front
    RF,
    /// Left rear
    LR,
    /// Right rear
    RR,
}

impl Leg {
    pub const ALL: [Leg; 4] = [Leg::LF, Leg::RF, Leg::LR, Leg::RR];

    /// Which diagonal pair this leg belongs to
    pub fn pair(self) -> DiagPair {
        match self {
            Leg::LF | Leg::RR => DiagPair::A,
            Leg::RF | Leg::LR => DiagPair::B,
        }
    }

    /// True for the right-hand side of the body
    pub fn is_right(self) -> bool {
        matches!(self, Leg::RF | Leg::RR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    Hip,
    Knee,
}

/// The two diagonal pairs. A = {LF, RR}, B = {RF, LR}; together they
/// partition the four legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagPair {
    A,
    B,
}

impl DiagPair {
    pub fn legs(self) -> [Leg; 2] {
        match self {
            DiagPair::A => [Leg::LF, Leg::RR],
            DiagPair::B => [Leg::RF, Leg::LR],
        }
    }

    pub fn opposite(self) -> DiagPair {
        match self {
            DiagPair::A => DiagPair::B,
            DiagPair::B => DiagPair::A,
        }
    }
}

/// One physical PWM output driving a single servo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoChannel {
    pub index: u8,
    pub leg: Leg,
    pub joint: Joint,
    /// Mirrored mounting: effective angle is 180 - raw
    pub invert: bool,
}

/// Construction-time mapping faults
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("channel index {index} used more than once")]
    DuplicateIndex { index: u8 },

    #[error("channel index {index} out of range (0-15)")]
    IndexOutOfRange { index: u8 },

    #[error("leg {leg:?} does not have exactly one {joint:?} channel")]
    BadLegJoint { leg: Leg, joint: Joint },
}

/// Validated channel table for the whole robot
#[derive(Debug, Clone)]
pub struct ChannelMap {
    channels: Vec<ServoChannel>,
}

impl ChannelMap {
    /// Build a map, rejecting wirings that violate the one-hip-one-knee
    /// per leg rule. Invalid maps are fatal at startup, never at runtime.
    pub fn new(channels: Vec<ServoChannel>) -> Result<Self, MapError> {
        let mut seen = [false; 16];
        for ch in &channels {
            if ch.index > 15 {
                return Err(MapError::IndexOutOfRange { index: ch.index });
            }
            if seen[ch.index as usize] {
                return Err(MapError::DuplicateIndex { index: ch.index });
            }
            seen[ch.index as usize] = true;
        }
        for leg in Leg::ALL {
            for joint in [Joint::Hip, Joint::Knee] {
                let count = channels
                    .iter()
                    .filter(|c| c.leg == leg && c.joint == joint)
                    .count();
                if count != 1 {
                    return Err(MapError::BadLegJoint { leg, joint });
                }
            }
        }
        Ok(Self { channels })
    }

    /// Stock wiring of the rig: left side on channels 0-3, right side on
    /// 8-11, right-side servos mirrored.
    pub fn stock() -> Self {
        let entries = [
            (0, Leg::LF, Joint::Hip),
            (1, Leg::LF, Joint::Knee),
            (8, Leg::RF, Joint::Hip),
            (9, Leg::RF, Joint::Knee),
            (2, Leg::LR, Joint::Hip),
            (3, Leg::LR, Joint::Knee),
            (10, Leg::RR, Joint::Hip),
            (11, Leg::RR, Joint::Knee),
        ];
        let channels = entries
            .into_iter()
            .map(|(index, leg, joint)| ServoChannel {
                index,
                leg,
                joint,
                invert: leg.is_right(),
            })
            .collect();
        // Stock table satisfies the invariants by construction
        Self::new(channels).expect("stock channel map is valid")
    }

    pub fn get(&self, leg: Leg, joint: Joint) -> ServoChannel {
        // ChannelMap::new guarantees exactly one match
        *self
            .channels
            .iter()
            .find(|c| c.leg == leg && c.joint == joint)
            .expect("validated map has every leg/joint")
    }

    pub fn hip(&self, leg: Leg) -> ServoChannel {
        self.get(leg, Joint::Hip)
    }

    pub fn knee(&self, leg: Leg) -> ServoChannel {
        self.get(leg, Joint::Knee)
    }

    pub fn hips(&self) -> [ServoChannel; 4] {
        Leg::ALL.map(|leg| self.hip(leg))
    }

    pub fn knees(&self) -> [ServoChannel; 4] {
        Leg::ALL.map(|leg| self.knee(leg))
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::stock()
    }
}
