use std::collections::VecDeque;
use std::fmt;

use crate::value::Value;

/// Index of a queue in a [`ChannelArena`]. Copies of an id observe the same queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(usize);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan#{}", self.0)
    }
}

#[derive(Debug, Default)]
/// The `ChannelArena` owns every FIFO queue of a run and hands out indices into it.
/// Allocation is done with [`ChannelArena::alloc`]; queues are never freed while
/// the arena lives, so an id stays valid for the whole run.
pub struct ChannelArena {
    queues: Vec<VecDeque<Value>>,
}

impl ChannelArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self) -> ChannelId {
        let id = ChannelId(self.queues.len());
        self.queues.push(VecDeque::new());
        id
    }

    pub fn push(&mut self, id: ChannelId, value: Value) {
        self.queues[id.0].push_back(value);
    }

    pub fn pop(&mut self, id: ChannelId) -> Option<Value> {
        self.queues[id.0].pop_front()
    }

    pub fn depth(&self, id: ChannelId) -> usize {
        self.queues[id.0].len()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        id.0 < self.queues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queues_are_fifo_and_independent() {
        let mut arena = ChannelArena::new();
        let a = arena.alloc();
        let b = arena.alloc();
        arena.push(a, Value::ubits(8, 1));
        arena.push(a, Value::ubits(8, 2));
        arena.push(b, Value::ubits(8, 9));
        assert_eq!(arena.depth(a), 2);
        assert_eq!(arena.pop(a), Some(Value::ubits(8, 1)));
        assert_eq!(arena.depth(a), 1);
        assert_eq!(arena.pop(b), Some(Value::ubits(8, 9)));
        assert_eq!(arena.pop(b), None);
    }

    #[test]
    fn copied_handles_share_a_queue() {
        let mut arena = ChannelArena::new();
        let handle = Value::Channel(arena.alloc());
        let alias = handle.clone();
        arena.push(handle.as_channel().unwrap(), Value::bool(true));
        assert_eq!(arena.pop(alias.as_channel().unwrap()), Some(Value::bool(true)));
    }
}
