use crate::power_window::PowerWindow;

/// A scored region competing for the final result.
#[derive(Debug, Clone)]
pub struct ScoreCandidate<T> {
    pub region_index: usize,
    pub power: f64,
    pub window: PowerWindow,
    pub payload: T,
}

/// Keeps the highest-power candidate whose window ends above the gate.
///
/// Ties go to the candidate offered first.
#[derive(Debug)]
pub struct Arbiter<T> {
    end_gate: usize,
    best: Option<ScoreCandidate<T>>,
}

impl<T> Arbiter<T> {
    pub fn new(end_gate: usize) -> Self {
        Self {
            end_gate,
            best: None,
        }
    }

    pub fn is_eligible(&self, window: &PowerWindow) -> bool {
        window.end > self.end_gate
    }

    /// Offer a candidate; returns whether it became the current best.
    pub fn offer(&mut self, candidate: ScoreCandidate<T>) -> bool {
        if !self.is_eligible(&candidate.window) {
            return false;
        }
        let better = match &self.best {
            Some(best) => candidate.power > best.power,
            None => true,
        };
        if better {
            self.best = Some(candidate);
        }
        better
    }

    pub fn into_winner(self) -> Option<ScoreCandidate<T>> {
        self.best
    }
}
