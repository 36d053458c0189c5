use std::fmt;

use serde::Serialize;

use crate::step::Step;
use crate::tracker::Snapshot;

/// One rendered line of the checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistRow {
    pub step: Step,
    pub label: &'static str,
    /// Blink count on the blink row, `None` elsewhere.
    pub suffix: Option<u32>,
    pub complete: bool,
}

/// Project a snapshot onto the three checklist rows, in display order.
pub fn checklist(snapshot: &Snapshot) -> [ChecklistRow; 3] {
    Step::ALL.map(|step| ChecklistRow {
        step,
        label: step.label(),
        suffix: (step == Step::Blink).then_some(snapshot.blink_count),
        complete: snapshot.is_complete(step),
    })
}

impl fmt::Display for ChecklistRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.complete { 'x' } else { ' ' };
        write!(f, "[{mark}] {}", self.label)?;
        if let Some(n) = self.suffix {
            write!(f, " {n}")?;
        }
        Ok(())
    }
}
