use std::fmt;

use crate::instructions::Value;
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub read_hits: u64,
    pub read_misses: u64,
    pub write_hits: u64,
    pub write_misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheLine {
    pub occupied: bool,
    pub address: usize,
    pub value: Value,
    pub dirty: bool,
}

/// Latency modelled cache in front of the backing memory.
///
/// `read` and `write` are polled once per cycle by the memory manager with
/// the same arguments until they report completion.
pub trait Cache: fmt::Debug {
    fn read(&mut self, clock: u64, addr: usize) -> Option<Value>;

    fn write(&mut self, clock: u64, addr: usize, value: Value) -> bool;

    fn is_busy(&self) -> bool;

    /// Drops the in-flight transaction. Cached contents stay.
    fn flush(&mut self);

    fn memory(&self) -> &Memory;

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn sets(&self) -> &[Vec<CacheLine>] {
        &[]
    }

    /// Current value of `addr` as a program would see it, without timing.
    fn peek(&self, addr: usize) -> Value {
        self.memory().load(addr)
    }
}

/// Passes every request straight to memory.
#[derive(Debug)]
pub struct NoCache {
    memory: Memory,
}
impl NoCache {
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }
}
impl Cache for NoCache {
    fn read(&mut self, clock: u64, addr: usize) -> Option<Value> {
        self.memory.read(clock, addr)
    }

    fn write(&mut self, clock: u64, addr: usize, value: Value) -> bool {
        self.memory.write(clock, addr, value)
    }

    fn is_busy(&self) -> bool {
        self.memory.is_busy()
    }

    fn flush(&mut self) {
        self.memory.flush();
    }

    fn memory(&self) -> &Memory {
        &self.memory
    }
}

/// Xorshift generator for uniform victim selection, reproducible per seed.
#[derive(Debug, Clone)]
struct VictimPicker {
    state: u64,
}
impl VictimPicker {
    fn new(seed: u64) -> Self {
        // xorshift never leaves zero
        let state = if seed == 0 { 123456789 } else { seed };
        Self { state }
    }

    fn pick(&mut self, ways: usize) -> usize {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x as usize) % ways
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transaction {
    Lookup { complete: u64 },
    Fill,
    Update { complete: u64 },
    WriteThrough { addr: usize, value: Value },
}

#[derive(Debug)]
pub struct SetAssociativeCache {
    memory: Memory,
    sets: Vec<Vec<CacheLine>>,
    write_back: bool,
    read_latency: u64,
    write_latency: u64,
    transaction: Option<Transaction>,
    stats: CacheStats,
    victims: VictimPicker,
}
impl SetAssociativeCache {
    /// `capacity` is in lines and must already be a multiple of `ways`.
    pub fn new(
        memory: Memory,
        ways: usize,
        capacity: usize,
        read_latency: u64,
        write_latency: u64,
        write_back: bool,
        seed: u64,
    ) -> Self {
        let sets = (0..capacity / ways)
            .map(|_| vec![CacheLine::default(); ways])
            .collect();

        Self {
            memory,
            sets,
            write_back,
            read_latency,
            write_latency,
            transaction: None,
            stats: CacheStats::default(),
            victims: VictimPicker::new(seed),
        }
    }

    fn set_index(&self, addr: usize) -> usize {
        addr % self.sets.len()
    }

    fn find(&self, addr: usize) -> Option<&CacheLine> {
        self.sets[self.set_index(addr)]
            .iter()
            .find(|line| line.occupied && line.address == addr)
    }

    /// Places `addr` in its set: an existing line first, then a free way,
    /// then a random victim. Dirty victims go back to memory right away.
    fn install(&mut self, addr: usize, value: Value, dirty: bool) {
        let set_index = self.set_index(addr);
        let fresh = CacheLine {
            occupied: true,
            address: addr,
            value,
            dirty,
        };

        let set = &mut self.sets[set_index];
        if let Some(line) = set.iter_mut().find(|l| l.occupied && l.address == addr) {
            *line = fresh;
            return;
        }
        if let Some(line) = set.iter_mut().find(|l| !l.occupied) {
            *line = fresh;
            return;
        }

        let way = self.victims.pick(set.len());
        let victim = std::mem::replace(&mut set[way], fresh);
        self.stats.evictions += 1;

        log::trace!(
            "cache: evicting {} from set {} way {} (dirty: {})",
            victim.address,
            set_index,
            way,
            victim.dirty
        );
        if victim.dirty {
            self.memory.store(victim.address, victim.value);
        }
    }
}
impl Cache for SetAssociativeCache {
    fn read(&mut self, clock: u64, addr: usize) -> Option<Value> {
        let transaction = *self.transaction.get_or_insert(Transaction::Lookup {
            complete: clock + self.read_latency,
        });

        if let Transaction::Lookup { complete } = transaction {
            if clock < complete {
                return None;
            }

            if let Some(line) = self.find(addr) {
                let value = line.value;
                self.stats.read_hits += 1;
                self.transaction = None;
                return Some(value);
            }

            self.stats.read_misses += 1;
            self.transaction = Some(Transaction::Fill);
        }

        if self.transaction == Some(Transaction::Fill) {
            let value = self.memory.read(clock, addr)?;
            self.install(addr, value, false);
            self.transaction = None;
            return Some(value);
        }

        None
    }

    fn write(&mut self, clock: u64, addr: usize, value: Value) -> bool {
        let transaction = *self.transaction.get_or_insert(Transaction::Update {
            complete: clock + self.write_latency,
        });

        if let Transaction::Update { complete } = transaction {
            if clock < complete {
                return false;
            }

            if self.find(addr).is_some() {
                self.stats.write_hits += 1;
            } else {
                self.stats.write_misses += 1;
            }
            self.install(addr, value, self.write_back);

            if self.write_back {
                self.transaction = None;
                return true;
            }
            self.transaction = Some(Transaction::WriteThrough { addr, value });
        }

        if let Some(Transaction::WriteThrough { addr, value }) = self.transaction {
            if self.memory.write(clock, addr, value) {
                self.transaction = None;
                return true;
            }
        }

        false
    }

    fn is_busy(&self) -> bool {
        self.transaction.is_some() || self.memory.is_busy()
    }

    fn flush(&mut self) {
        self.transaction = None;
        self.memory.flush();
    }

    fn memory(&self) -> &Memory {
        &self.memory
    }

    fn stats(&self) -> CacheStats {
        self.stats
    }

    fn sets(&self) -> &[Vec<CacheLine>] {
        &self.sets
    }

    fn peek(&self, addr: usize) -> Value {
        self.find(addr)
            .map_or_else(|| self.memory.load(addr), |line| line.value)
    }
}
