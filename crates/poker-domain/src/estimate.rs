//! Estimate card values and the fixed deck.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire stand-in for the infinity card.
///
/// JSON cannot carry IEEE infinity, so serde maps the card to this sentinel
/// and back. The binary replication codec carries raw IEEE bits instead and
/// never sees it.
const INFINITY_SENTINEL: f64 = -1_111_100.0;

/// A single estimation card value.
///
/// `None` is the "no estimate" card, positive infinity the "too big to
/// estimate" card. Instances are immutable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Estimate {
    value: Option<f64>,
}

impl Estimate {
    /// The "too big to estimate" card.
    pub const POSITIVE_INFINITY: Estimate = Estimate {
        value: Some(f64::INFINITY),
    };

    /// The "no estimate" card.
    pub const NO_ESTIMATE: Estimate = Estimate { value: None };

    /// Creates an estimate with the given numeric value.
    pub const fn new(value: f64) -> Self {
        Estimate { value: Some(value) }
    }

    /// Returns the card value, if any.
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Returns true if this is the positive-infinity card.
    pub fn is_infinite(&self) -> bool {
        matches!(self.value, Some(v) if v == f64::INFINITY)
    }

    /// Returns true if this estimate is one of the cards in [`DECK`].
    pub fn is_in_deck(&self) -> bool {
        DECK.iter().any(|card| card == self)
    }
}

impl PartialEq for Estimate {
    fn eq(&self, other: &Self) -> bool {
        match (self.value, other.value) {
            (None, None) => true,
            // IEEE semantics: NaN compares unequal to everything,
            // infinity equals infinity.
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value {
            None => write!(f, "?"),
            Some(v) if v == f64::INFINITY => write!(f, "infinity"),
            Some(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Estimate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self.value {
            Some(v) if v == f64::INFINITY => Some(INFINITY_SENTINEL),
            other => other,
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Estimate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Option::<f64>::deserialize(deserializer)?;
        let value = match wire {
            Some(v) if v == INFINITY_SENTINEL => Some(f64::INFINITY),
            other => other,
        };
        Ok(Estimate { value })
    }
}

/// The fixed deck every team estimates with.
///
/// Constant for the life of a team; a submitted estimate must equal one of
/// these cards.
pub const DECK: [Estimate; 13] = [
    Estimate::new(0.0),
    Estimate::new(0.5),
    Estimate::new(1.0),
    Estimate::new(2.0),
    Estimate::new(3.0),
    Estimate::new(5.0),
    Estimate::new(8.0),
    Estimate::new(13.0),
    Estimate::new(20.0),
    Estimate::new(40.0),
    Estimate::new(100.0),
    Estimate::POSITIVE_INFINITY,
    Estimate::NO_ESTIMATE,
];
