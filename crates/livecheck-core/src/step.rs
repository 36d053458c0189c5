use serde::{Deserialize, Serialize};

/// One item of the liveness checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    FacePresence,
    Blink,
    Smile,
}

impl Step {
    /// Checklist order.
    pub const ALL: [Step; 3] = [Step::FacePresence, Step::Blink, Step::Smile];

    pub fn label(self) -> &'static str {
        match self {
            Step::FacePresence => "Single face detected",
            Step::Blink => "Blinks counted",
            Step::Smile => "Smile detected",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Step::FacePresence => 1 << 0,
            Step::Blink => 1 << 1,
            Step::Smile => 1 << 2,
        }
    }
}

/// Set of completed steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSet(u8);

impl StepSet {
    pub fn contains(self, step: Step) -> bool {
        self.0 & step.bit() != 0
    }

    pub fn insert(&mut self, step: Step) {
        self.0 |= step.bit();
    }

    pub fn remove(&mut self, step: Step) {
        self.0 &= !step.bit();
    }

    /// Insert when `complete`, remove otherwise.
    pub fn set(&mut self, step: Step, complete: bool) {
        if complete {
            self.insert(step);
        } else {
            self.remove(step);
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_full(self) -> bool {
        Step::ALL.iter().all(|s| self.contains(*s))
    }

    /// Completed steps in checklist order.
    pub fn iter(self) -> impl Iterator<Item = Step> {
        Step::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Step> for StepSet {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        let mut set = StepSet::default();
        for step in iter {
            set.insert(step);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut set = StepSet::default();
        assert!(set.is_empty());
        set.insert(Step::Smile);
        set.insert(Step::Smile);
        assert!(set.contains(Step::Smile));
        assert!(!set.contains(Step::Blink));
        set.remove(Step::Smile);
        assert!(set.is_empty());
    }

    #[test]
    fn test_iter_follows_checklist_order() {
        let set: StepSet = [Step::Smile, Step::FacePresence].into_iter().collect();
        let steps: Vec<_> = set.iter().collect();
        assert_eq!(steps, vec![Step::FacePresence, Step::Smile]);
    }

    #[test]
    fn test_is_full() {
        let mut set: StepSet = Step::ALL.into_iter().collect();
        assert!(set.is_full());
        set.set(Step::Blink, false);
        assert!(!set.is_full());
    }
}
