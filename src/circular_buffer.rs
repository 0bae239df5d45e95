/// Fixed capacity ring buffer addressed by absolute slot index.
///
/// `head` is the oldest element, `tail` the slot the next push lands in.
/// Slot indexes stay stable for the lifetime of an element, which is what
/// lets the reorder buffer hand them out as rename tags.
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    buffer: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
}
impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.buffer.len()
    }

    /// Slot index the next successful push will occupy.
    pub fn next_tag(&self) -> usize {
        self.tail
    }

    /// Returns the slot index written, or `None` if full.
    pub fn push(&mut self, data: T) -> Option<usize> {
        if self.is_full() {
            return None;
        }

        let index = self.tail;
        self.buffer[index] = Some(data);
        self.tail = (self.tail + 1) % self.buffer.len();
        self.count += 1;

        Some(index)
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let data = self.buffer[self.head].take();
        self.head = (self.head + 1) % self.buffer.len();
        self.count -= 1;

        data
    }

    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            self.buffer[self.head].as_ref()
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.buffer.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.buffer.get_mut(index).and_then(|slot| slot.as_mut())
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Oldest to newest, yielding `(slot index, element)`.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &T)> + '_ {
        let capacity = self.buffer.len();
        (0..self.count).filter_map(move |offset| {
            let index = (self.head + offset) % capacity;
            self.buffer[index].as_ref().map(|data| (index, data))
        })
    }

    /// Newest to oldest.
    pub fn iter_rev(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.iter().rev()
    }
}
