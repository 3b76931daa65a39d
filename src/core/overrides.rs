/// Holds the most recent acceptable value of a user-entered override.
///
/// Offers that are non-finite or not strictly positive are ignored and the
/// previous value stays in effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastGood {
    value: f64,
}

impl LastGood {
    pub fn new(initial: f64) -> Self {
        Self { value: initial }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns `true` when `candidate` replaced the held value.
    pub fn offer(&mut self, candidate: f64) -> bool {
        if candidate.is_finite() && candidate > 0.0 {
            self.value = candidate;
            true
        } else {
            false
        }
    }
}
