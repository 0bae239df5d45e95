use bytes::{Buf, BufMut, BytesMut};

use crate::cache::Cache;
use crate::instructions::Value;
use crate::reorder_buffer::{Forward, ReorderBuffer};

const WORD_BYTES: usize = 8;

/// Word addressed backing store with a single outstanding operation.
///
/// Every word powers on holding its own address.
#[derive(Debug, Clone)]
pub struct Memory {
    words: BytesMut,
    size: usize,
    read_latency: u64,
    write_latency: u64,
    current_op_complete: Option<u64>,
}
impl Memory {
    pub fn new(size: usize, read_latency: u64, write_latency: u64) -> Self {
        let mut words = BytesMut::with_capacity(size * WORD_BYTES);
        for addr in 0..size {
            words.put_i64(addr as Value);
        }

        Self {
            words,
            size,
            read_latency,
            write_latency,
            current_op_complete: None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Maps any computed address onto a word of this memory.
    pub fn wrap(&self, addr: Value) -> usize {
        addr.rem_euclid(self.size as Value) as usize
    }

    /// Untimed read.
    pub fn load(&self, addr: usize) -> Value {
        let start = (addr % self.size) * WORD_BYTES;
        (&self.words[start..start + WORD_BYTES]).get_i64()
    }

    /// Untimed write.
    pub fn store(&mut self, addr: usize, value: Value) {
        let start = (addr % self.size) * WORD_BYTES;
        (&mut self.words[start..start + WORD_BYTES]).put_i64(value);
    }

    pub fn is_busy(&self) -> bool {
        self.current_op_complete.is_some()
    }

    pub fn flush(&mut self) {
        self.current_op_complete = None;
    }

    /// Starts a read on first call, returns the value once the latency elapsed.
    pub fn read(&mut self, clock: u64, addr: usize) -> Option<Value> {
        let complete = *self
            .current_op_complete
            .get_or_insert(clock + self.read_latency);

        if clock >= complete {
            self.current_op_complete = None;
            return Some(self.load(addr));
        }

        None
    }

    /// Returns whether the write has completed.
    pub fn write(&mut self, clock: u64, addr: usize, value: Value) -> bool {
        let complete = *self
            .current_op_complete
            .get_or_insert(clock + self.write_latency);

        if clock >= complete {
            self.current_op_complete = None;
            self.store(addr, value);
            return true;
        }

        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortState {
    Free,
    Read,
    Write,
}

/// Requester name used by the commit stage when it drains stores.
pub const COMMIT_PORT: &str = "ROB";

/// Single ported front door to the cache and memory. One requester at a
/// time owns the port until its operation completes.
#[derive(Debug)]
pub struct MemoryManager {
    cache: Box<dyn Cache>,
    state: PortState,
    owner: Option<String>,
    rob_enabled: bool,
}
impl MemoryManager {
    pub fn new(cache: Box<dyn Cache>, rob_enabled: bool) -> Self {
        Self {
            cache,
            state: PortState::Free,
            owner: None,
            rob_enabled,
        }
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.state != PortState::Free
    }

    pub fn wrap(&self, addr: Value) -> usize {
        self.cache.memory().wrap(addr)
    }

    /// Coherent untimed view of one word.
    pub fn peek(&self, addr: Value) -> Value {
        self.cache.peek(self.wrap(addr))
    }

    fn held_by_other(&self, requester: &str) -> bool {
        self.state != PortState::Free && self.owner.as_deref() != Some(requester)
    }

    fn claim(&mut self, state: PortState, requester: &str) {
        if self.state == PortState::Free && !self.cache.is_busy() {
            self.state = state;
            self.owner = Some(requester.to_string());
        }
    }

    fn release(&mut self) {
        self.state = PortState::Free;
        self.owner = None;
    }

    /// Polled every cycle by a load. Pending stores older than the load
    /// (`uid`) are searched first and forwarded without touching the port.
    pub fn read(
        &mut self,
        requester: &str,
        clock: u64,
        addr: usize,
        rob: Option<&ReorderBuffer>,
        uid: u64,
    ) -> Option<Value> {
        if self.held_by_other(requester) {
            return None;
        }

        if let Some(rob) = rob {
            match rob.forward(addr, uid) {
                Forward::Value(value) => {
                    log::trace!("memory: forwarding {} for {} to {}", value, addr, requester);
                    return Some(value);
                }
                Forward::Blocked => return None,
                Forward::Miss => (),
            }
        }

        self.claim(PortState::Read, requester);

        if self.state == PortState::Read && self.owner.as_deref() == Some(requester) {
            let value = self.cache.read(clock, addr);
            if value.is_some() {
                self.release();
            }
            return value;
        }

        None
    }

    /// Returns whether the write completed. With a reorder buffer only the
    /// commit stage (`commit == true`) reaches memory; units get an
    /// immediate yes.
    pub fn write(
        &mut self,
        requester: &str,
        clock: u64,
        addr: usize,
        value: Value,
        commit: bool,
    ) -> bool {
        if self.held_by_other(requester) {
            return false;
        }

        if self.rob_enabled && !commit {
            return true;
        }

        self.claim(PortState::Write, requester);

        if self.state == PortState::Write && self.owner.as_deref() == Some(requester) {
            if self.cache.write(clock, addr, value) {
                self.release();
                return true;
            }
        }

        false
    }

    pub fn flush(&mut self) {
        self.release();
        self.cache.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;

    fn manager(rob_enabled: bool) -> MemoryManager {
        MemoryManager::new(Box::new(NoCache::new(Memory::new(32, 1, 1))), rob_enabled)
    }

    #[test]
    fn memory_words_start_as_their_address() {
        let mut memory = Memory::new(8, 0, 0);
        assert_eq!(memory.load(5), 5);
        memory.store(5, -1);
        assert_eq!(memory.load(5), -1);
        assert_eq!(memory.wrap(-1), 7);
        assert_eq!(memory.wrap(9), 1);
    }

    #[test]
    fn zero_latency_completes_immediately() {
        let mut memory = Memory::new(8, 0, 0);
        assert_eq!(memory.read(1, 3), Some(3));
        assert!(memory.write(1, 3, 4));
        assert!(!memory.is_busy());
    }

    #[test]
    fn port_is_exclusive_until_done() {
        let mut mgm = manager(false);

        assert_eq!(mgm.read("LSU0", 1, 4, None, 0), None);
        assert_eq!(mgm.owner(), Some("LSU0"));
        assert_eq!(mgm.read("LSU1", 2, 6, None, 1), None);
        assert!(!mgm.write("LSU1", 2, 6, 0, false));

        assert_eq!(mgm.read("LSU0", 2, 4, None, 0), Some(4));
        assert!(!mgm.is_busy());

        assert!(!mgm.write("LSU1", 3, 6, 60, false));
        assert!(mgm.write("LSU1", 4, 6, 60, false));
        assert_eq!(mgm.peek(6), 60);
    }

    #[test]
    fn units_do_not_write_when_rob_is_enabled() {
        let mut mgm = manager(true);
        assert!(mgm.write("LSU0", 1, 3, 9, false));
        assert!(!mgm.is_busy());
        assert_eq!(mgm.peek(3), 3);

        assert!(!mgm.write(COMMIT_PORT, 2, 3, 9, true));
        assert!(mgm.write(COMMIT_PORT, 3, 3, 9, true));
        assert_eq!(mgm.peek(3), 9);
    }

    #[test]
    fn flush_frees_the_port() {
        let mut mgm = manager(false);
        assert_eq!(mgm.read("LSU0", 1, 4, None, 0), None);
        mgm.flush();
        assert!(!mgm.is_busy());
        assert!(!mgm.cache().is_busy());
        assert_eq!(mgm.read("LSU1", 5, 4, None, 1), None);
        assert_eq!(mgm.read("LSU1", 6, 4, None, 1), Some(4));
    }
}
