//! Patience-based early stopping on validation accuracy.

use serde::{Deserialize, Serialize};

/// Outcome of one validation observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Strictly better than every earlier observation; patience was reset
    Improved,
    NotImproved { patience_remaining: usize },
    /// Patience hit zero; training must stop now
    Exhausted,
}

/// Tracks the best accuracy seen and how many non-improving evaluations
/// remain before training stops.
///
/// Patience drops by one on every evaluation that does not strictly beat the
/// best accuracy, resets to `max_patience` on one that does, and stopping is
/// signalled as soon as it reaches zero.
#[derive(Debug, Clone, PartialEq)]
pub struct EarlyStopping {
    max_patience: usize,
    patience: usize,
    best_accuracy: f64,
}

impl EarlyStopping {
    pub fn new(max_patience: usize) -> Self {
        Self {
            max_patience,
            patience: max_patience,
            best_accuracy: 0.0,
        }
    }

    pub fn observe(&mut self, accuracy: f64) -> Verdict {
        if accuracy > self.best_accuracy {
            self.best_accuracy = accuracy;
            self.patience = self.max_patience;
            return Verdict::Improved;
        }

        self.patience = self.patience.saturating_sub(1);
        if self.patience == 0 {
            Verdict::Exhausted
        } else {
            Verdict::NotImproved {
                patience_remaining: self.patience,
            }
        }
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn patience_remaining(&self) -> usize {
        self.patience
    }

    pub fn max_patience(&self) -> usize {
        self.max_patience
    }

    pub fn is_exhausted(&self) -> bool {
        self.patience == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_sequence() {
        let mut stopper = EarlyStopping::new(2);
        let script = [0.1, 0.1, 0.2, 0.15, 0.15, 0.15];

        let mut trace = Vec::new();
        let mut consumed = 0;
        for accuracy in script {
            let verdict = stopper.observe(accuracy);
            consumed += 1;
            trace.push(stopper.patience_remaining());
            if verdict == Verdict::Exhausted {
                break;
            }
        }

        assert_eq!(trace, vec![2, 1, 2, 1, 0]);
        assert_eq!(consumed, 5);
        assert_eq!(stopper.best_accuracy(), 0.2);
        assert!(stopper.is_exhausted());
    }

    #[test]
    fn test_verdicts() {
        let mut stopper = EarlyStopping::new(3);
        assert_eq!(stopper.observe(0.5), Verdict::Improved);
        assert_eq!(stopper.observe(0.5), Verdict::NotImproved { patience_remaining: 2 });
        assert_eq!(stopper.observe(0.4), Verdict::NotImproved { patience_remaining: 1 });
        assert_eq!(stopper.observe(0.6), Verdict::Improved);
        assert_eq!(stopper.patience_remaining(), 3);
    }

    #[test]
    fn test_zero_accuracy_never_improves() {
        // Best starts at 0 and the comparison is strict
        let mut stopper = EarlyStopping::new(1);
        assert_eq!(stopper.observe(0.0), Verdict::Exhausted);
    }

    #[test]
    fn test_single_patience_stops_on_first_plateau() {
        let mut stopper = EarlyStopping::new(1);
        assert_eq!(stopper.observe(0.3), Verdict::Improved);
        assert_eq!(stopper.observe(0.3), Verdict::Exhausted);
        assert_eq!(stopper.max_patience(), 1);
    }
}
