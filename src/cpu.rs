use std::collections::HashMap;

use crate::branch_prediction::{self, BranchPredictor};
use crate::cache::{Cache, NoCache, SetAssociativeCache};
use crate::commiter::{CommitOutcome, Commiter};
use crate::common_data_bus::CommonDataBus;
use crate::config::{CacheConfig, CpuConfig};
use crate::dispatcher::{Dispatcher, IssueOutcome};
use crate::error::{ConfigError, SimError};
use crate::execution_units::{FunctionalUnit, Timing};
use crate::instructions::{Program, StaticInstruction};
use crate::memory::{Memory, MemoryManager};
use crate::registers::{Flags, RegisterFile};
use crate::reorder_buffer::ReorderBuffer;
use crate::stats::{StatsTracker, Timeline};

/// The whole machine, advanced one clock cycle per [`Cpu::step`].
#[derive(Debug)]
pub struct Cpu {
    program: Program,
    clock: u64,
    pc: usize,
    registers: RegisterFile,
    flags: Flags,
    /// Uid of the arithmetic result the flags came from, register-direct only.
    flags_uid: Option<u64>,
    units: Vec<FunctionalUnit>,
    rob: Option<ReorderBuffer>,
    memory: MemoryManager,
    branch_predictor: Box<dyn BranchPredictor>,
    cdb: CommonDataBus,
    dispatcher: Dispatcher,
    commiter: Commiter,
    stats_tracker: StatsTracker,
    timeline: Timeline,
    max_cycles: u64,
}
impl Cpu {
    pub fn new(config: CpuConfig, program: Program) -> Result<Self, ConfigError> {
        config.validate()?;

        let registers = RegisterFile::new(config.registers.ints, config.registers.floats);
        for instr in program.iter() {
            if let Some(register) = instr.registers().find(|reg| !registers.contains(*reg)) {
                return Err(ConfigError::UnknownRegister {
                    register,
                    row: instr.row,
                });
            }
            if let Some(kind) = instr.op.needs_fu_kind() {
                if !config.has_unit(kind) {
                    return Err(ConfigError::MissingUnit {
                        kind,
                        row: instr.row,
                    });
                }
            }
        }

        let timing = Timing {
            issue_delay: config.issue_delay,
            writeback_delay: config.writeback_delay,
        };
        let mut per_kind = HashMap::new();
        let mut units = Vec::new();
        for unit in config.units.iter() {
            for _ in 0..unit.count {
                let index = per_kind.entry(unit.kind).or_insert(0);
                let name = format!("{}{}", unit.kind.name_prefix(), index);
                *index += 1;
                units.push(FunctionalUnit::new(unit.kind, name, unit.latency, timing));
            }
        }

        let backing = Memory::new(
            config.memory.size,
            config.memory.read_latency,
            config.memory.write_latency,
        );
        let cache: Box<dyn Cache> = match config.cache {
            CacheConfig::None => Box::new(NoCache::new(backing)),
            CacheConfig::SetAssociative {
                ways,
                capacity,
                read_latency,
                write_latency,
                write_back,
            } => Box::new(SetAssociativeCache::new(
                backing,
                ways,
                capacity,
                read_latency,
                write_latency,
                write_back,
                config.seed,
            )),
        };

        let rob = config.rob_enabled().then(|| ReorderBuffer::new(config.rob_size));

        log::info!(
            "cpu: {} rows, {} units, rob {}, {:?}",
            program.len(),
            units.len(),
            config.rob_size,
            config.predictor
        );

        Ok(Cpu {
            program,
            clock: 0,
            pc: 0,
            registers,
            flags: Flags::default(),
            flags_uid: None,
            units,
            memory: MemoryManager::new(cache, rob.is_some()),
            rob,
            branch_predictor: branch_prediction::build(&config.predictor),
            cdb: CommonDataBus::new(),
            dispatcher: Dispatcher::new(),
            commiter: Commiter::new(),
            stats_tracker: StatsTracker::new(),
            timeline: Timeline::new(),
            max_cycles: config.max_cycles,
        })
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn program(&self) -> &[StaticInstruction] {
        &self.program
    }

    pub fn units(&self) -> &[FunctionalUnit] {
        &self.units
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn rob(&self) -> Option<&ReorderBuffer> {
        self.rob.as_ref()
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Messages published during the last cycle.
    pub fn bus(&self) -> &CommonDataBus {
        &self.cdb
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats_tracker
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn is_finished(&self) -> bool {
        self.pc >= self.program.len()
            && self.units.iter().all(|unit| !unit.is_busy())
            && self.rob.as_ref().map_or(true, |rob| rob.is_empty())
    }

    /// Runs until the program drains.
    pub fn run(&mut self) -> Result<StatsTracker, SimError> {
        while self.step() {
            if self.clock >= self.max_cycles {
                return Err(SimError::CycleLimit(self.clock));
            }
        }

        Ok(self.stats_tracker)
    }

    /// Advances one cycle. Returns whether there is anything left to do.
    pub fn step(&mut self) -> bool {
        self.clock += 1;
        self.stats_tracker.cycles += 1;
        self.cdb.clear();
        let clock = self.clock;

        self.issue(clock);

        for unit in self.units.iter_mut() {
            if let Some(uid) = unit.execute(clock, &mut self.memory, self.rob.as_ref()) {
                self.timeline.executed(uid, clock);
            }
        }

        for unit in self.units.iter_mut() {
            if let Some(uid) = unit.write_result(clock, &mut self.cdb) {
                self.timeline.written(uid, clock);
            }
        }

        self.snoop(clock);
        self.commit(clock);

        !self.is_finished()
    }

    fn issue(&mut self, clock: u64) {
        let outcome = self.dispatcher.dispatch(
            clock,
            self.pc,
            &self.program,
            &mut self.registers,
            self.rob.as_mut(),
            &mut self.units,
            self.branch_predictor.as_mut(),
            self.flags,
        );

        match outcome {
            IssueOutcome::Issued { uid, next_pc } => {
                let instr = self.program[self.pc].clone();
                let is_branch = instr.op.is_branch();
                self.timeline.issued(uid, instr, clock);
                self.stats_tracker.instructions_issued += 1;

                if is_branch {
                    if self.branch_predictor.is_speculative() {
                        self.stats_tracker.branch_predictions += 1;
                    }
                    // no reorder buffer means the branch is already resolved
                    if self.rob.is_none() {
                        self.retire(uid, clock);
                    }
                }

                self.pc = next_pc;
            }
            IssueOutcome::Stalled(reason) => {
                log::trace!("{}: issue stalled on {:?}", clock, reason);
                self.stats_tracker.issue_stalls += 1;
            }
            IssueOutcome::Exhausted => (),
        }
    }

    fn snoop(&mut self, clock: u64) {
        for unit in self.units.iter_mut() {
            unit.read_cdb(&self.cdb);
        }

        if let Some(rob) = self.rob.as_mut() {
            rob.read_cdb(clock, &self.cdb);
            return;
        }

        self.registers.read_cdb(&self.cdb);

        // publication is retirement without a reorder buffer
        let published: Vec<_> = self
            .cdb
            .messages()
            .iter()
            .map(|msg| (msg.uid, msg.op, msg.value))
            .collect();
        for (uid, op, value) in published {
            if op.is_arithmetic() && self.flags_uid.map_or(true, |last| uid > last) {
                self.flags = Flags::from_result(value);
                self.flags_uid = Some(uid);
            }
            self.retire(uid, clock);
        }
    }

    fn commit(&mut self, clock: u64) {
        let Some(rob) = self.rob.as_mut() else {
            return;
        };

        let outcome = self.commiter.commit_head(
            clock,
            rob,
            &mut self.registers,
            &mut self.flags,
            self.branch_predictor.as_mut(),
            &mut self.memory,
        );

        match outcome {
            CommitOutcome::Retired(uid) => self.retire(uid, clock),
            CommitOutcome::Mispredicted { uid, target } => {
                self.retire(uid, clock);
                self.stats_tracker.branch_mispredictions += 1;
                self.flush(target);
            }
            CommitOutcome::Idle | CommitOutcome::Writing => (),
        }
    }

    fn retire(&mut self, uid: u64, clock: u64) {
        self.timeline.committed(uid, clock);
        self.stats_tracker.instructions_commited += 1;
    }

    /// Drops everything younger than the retired branch and restarts
    /// fetching at `target`.
    fn flush(&mut self, target: usize) {
        log::info!("{}: misprediction, flushing to row {}", self.clock, target);

        if let Some(rob) = self.rob.as_mut() {
            for uid in rob.flush() {
                self.timeline.flushed(uid);
            }
        }
        self.units.iter_mut().for_each(|unit| unit.flush());
        self.memory.flush();
        self.registers.clear_producers();

        self.pc = target;
        self.stats_tracker.flushes += 1;
    }
}
