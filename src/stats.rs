use core::fmt::{self, Display};

use crate::instructions::StaticInstruction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsTracker {
    pub branch_predictions: u64,
    pub branch_mispredictions: u64,
    pub cycles: u64,
    pub instructions_issued: u64,
    pub instructions_commited: u64,
    pub flushes: u64,
    pub issue_stalls: u64,
}
impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

impl Display for StatsTracker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Program stats:")?;
        writeln!(f, " - Cycles: {}", self.cycles)?;
        writeln!(
            f,
            " - Issued/Cycle: {:.2}",
            rate(self.instructions_issued, self.cycles) / 100.0
        )?;
        writeln!(f, " - Instructions Issued: {}", self.instructions_issued)?;
        writeln!(
            f,
            " - Instructions Commited: {}",
            self.instructions_commited
        )?;
        writeln!(
            f,
            " - Instructions Completed rate: {:.2}",
            rate(self.instructions_commited, self.instructions_issued)
        )?;
        writeln!(f, " - Issue Stalls: {}", self.issue_stalls)?;
        writeln!(f, " - Branch Predictions: {}", self.branch_predictions)?;
        writeln!(
            f,
            " - Branch Mispredictions: {}",
            self.branch_mispredictions
        )?;
        writeln!(f, " - Flushes: {}", self.flushes)?;
        writeln!(
            f,
            " - Branch Misprediction rate: {:.2}",
            rate(self.branch_mispredictions, self.branch_predictions)
        )
    }
}

/// Cycle stamps of one dynamic instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRecord {
    pub uid: u64,
    pub instruction: StaticInstruction,
    pub issued: u64,
    pub executed: Option<u64>,
    pub written: Option<u64>,
    pub committed: Option<u64>,
    pub flushed: bool,
}

/// Per instruction history, indexed by uid.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    records: Vec<TimelineRecord>,
}
impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TimelineRecord] {
        &self.records
    }

    pub fn get(&self, uid: u64) -> Option<&TimelineRecord> {
        self.records.get(uid as usize)
    }

    /// Uids are handed out sequentially from zero so they double as indexes.
    pub fn issued(&mut self, uid: u64, instruction: StaticInstruction, clock: u64) {
        debug_assert_eq!(uid as usize, self.records.len());
        self.records.push(TimelineRecord {
            uid,
            instruction,
            issued: clock,
            executed: None,
            written: None,
            committed: None,
            flushed: false,
        });
    }

    pub fn executed(&mut self, uid: u64, clock: u64) {
        if let Some(record) = self.records.get_mut(uid as usize) {
            record.executed = Some(clock);
        }
    }

    pub fn written(&mut self, uid: u64, clock: u64) {
        if let Some(record) = self.records.get_mut(uid as usize) {
            record.written = Some(clock);
        }
    }

    pub fn committed(&mut self, uid: u64, clock: u64) {
        if let Some(record) = self.records.get_mut(uid as usize) {
            record.committed = Some(clock);
        }
    }

    pub fn flushed(&mut self, uid: u64) {
        if let Some(record) = self.records.get_mut(uid as usize) {
            record.flushed = true;
        }
    }
}
