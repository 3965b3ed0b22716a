use vehicle::{Control, State};

use crate::error::MpcError;

/// States, controls, interval durations and load transfers over one horizon.
///
/// `states` has N + 1 entries, the other sequences N. Index order is time order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HorizonTrajectory {
    pub states: Vec<State>,
    pub controls: Vec<Control>,
    /// Interval durations in s
    pub step_times: Vec<f64>,
    /// Lateral load transfer per interval in N
    pub load_transfer: Vec<f64>,
}

impl HorizonTrajectory {
    /// Number of intervals.
    pub fn horizon(&self) -> usize {
        self.controls.len()
    }

    pub fn total_time(&self) -> f64 {
        self.step_times.iter().sum()
    }

    pub fn first_control(&self) -> Option<&Control> {
        self.controls.first()
    }

    pub fn validate(&self, horizon: usize) -> Result<(), MpcError> {
        let lengths = [
            ("warm start states", self.states.len(), horizon + 1),
            ("warm start controls", self.controls.len(), horizon),
            ("warm start step times", self.step_times.len(), horizon),
            ("warm start load transfer", self.load_transfer.len(), horizon),
        ];
        for (what, got, expected) in lengths {
            if got != expected {
                return Err(MpcError::HorizonMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }
        let finite = self.states.iter().all(|x| x.iter().all(|v| v.is_finite()))
            && self.controls.iter().all(|u| u.iter().all(|v| v.is_finite()))
            && self.step_times.iter().chain(&self.load_transfer).all(|v| v.is_finite());
        if !finite {
            return Err(MpcError::InvalidInput(
                "warm start contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Drop the first interval and repeat the last one, keeping the length.
    pub fn shifted(&self) -> HorizonTrajectory {
        fn shift<T: Clone>(values: &[T]) -> Vec<T> {
            match values.last() {
                Some(last) => values[1..].iter().cloned().chain([last.clone()]).collect(),
                None => Vec::new(),
            }
        }
        HorizonTrajectory {
            states: shift(&self.states),
            controls: shift(&self.controls),
            step_times: shift(&self.step_times),
            load_transfer: shift(&self.load_transfer),
        }
    }
}
