// tactical_bot_core/bot/src/systems/ai/planning/node_pool.rs
//! Fixed-capacity arena of planner nodes.
//!
//! Slots are linked into a free list and a used list through `i16` indices
//! stored next to each node, so `alloc`/`free` are O(1) and `clear` walks
//! the used nodes only. Handles carry the slot generation; a handle to a
//! freed slot is rejected instead of aliasing its next occupant.

use crate::core::error::{BotError, BotResult};
use crate::systems::ai::planning::record::ActionRecord;
use crate::systems::ai::planning::world_state::WorldState;

const FREE_LIST: usize = 0;
const USED_LIST: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: u16,
    generation: u32,
}

impl NodeHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone)]
pub struct PlannerNode {
    pub world_state: WorldState,
    pub world_state_hash: u32,
    pub transition_cost: f32,
    pub cost_so_far: f32,
    pub heap_cost: f32,
    /// Position in the open nodes heap while the node is there.
    pub heap_index: Option<usize>,
    pub parent: Option<NodeHandle>,
    /// The record of the action that produced this node from its parent. The start node has none.
    pub action_record: Option<ActionRecord>,
    pub(crate) prev_in_bin: Option<NodeHandle>,
    pub(crate) next_in_bin: Option<NodeHandle>,
}

impl PlannerNode {
    fn empty() -> Self {
        PlannerNode {
            world_state: WorldState::new(),
            world_state_hash: 0,
            transition_cost: 0.0,
            cost_so_far: 0.0,
            heap_cost: 0.0,
            heap_index: None,
            parent: None,
            action_record: None,
            prev_in_bin: None,
            next_in_bin: None,
        }
    }
}

#[derive(Debug)]
struct Slot {
    node: PlannerNode,
    generation: u32,
    in_use: bool,
    prev: i16,
    next: i16,
}

#[derive(Debug)]
pub struct PlannerNodePool {
    slots: Vec<Slot>,
    list_first: [i16; 2],
    num_used: usize,
}

impl PlannerNodePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, i16::MAX as usize);
        let slots = (0..capacity)
            .map(|i| Slot {
                node: PlannerNode::empty(),
                generation: 0,
                in_use: false,
                prev: i as i16 - 1,
                next: if i + 1 < capacity { i as i16 + 1 } else { -1 },
            })
            .collect();
        PlannerNodePool { slots, list_first: [0, -1], num_used: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn num_used(&self) -> usize {
        self.num_used
    }

    fn link(&mut self, index: i16, list: usize) {
        let head = self.list_first[list];
        if head >= 0 {
            self.slots[head as usize].prev = index;
        }
        let slot = &mut self.slots[index as usize];
        slot.next = head;
        slot.prev = -1;
        self.list_first[list] = index;
    }

    fn unlink(&mut self, index: i16, list: usize) -> BotResult<()> {
        let (prev, next) = {
            let slot = &self.slots[index as usize];
            (slot.prev, slot.next)
        };
        if prev >= 0 {
            self.slots[prev as usize].next = next;
        } else {
            if self.list_first[list] != index {
                return Err(BotError::InvariantViolation(format!(
                    "Pool slot {} is expected to be a list head but it isn't",
                    index
                )));
            }
            self.list_first[list] = next;
        }
        if next >= 0 {
            self.slots[next as usize].prev = prev;
        }
        Ok(())
    }

    /// Takes a free slot and initializes its node with the world state.
    pub fn alloc(&mut self, world_state: WorldState) -> BotResult<NodeHandle> {
        let index = self.list_first[FREE_LIST];
        if index < 0 {
            return Err(BotError::CapacityExceeded { what: "planner nodes", capacity: self.capacity() });
        }
        self.unlink(index, FREE_LIST)?;
        self.link(index, USED_LIST);
        self.num_used += 1;

        let slot = &mut self.slots[index as usize];
        slot.in_use = true;
        let world_state_hash = world_state.hash_value();
        slot.node = PlannerNode { world_state, world_state_hash, ..PlannerNode::empty() };
        Ok(NodeHandle { index: index as u16, generation: slot.generation })
    }

    fn check_handle(&self, handle: NodeHandle) -> BotResult<()> {
        match self.slots.get(handle.index()) {
            Some(slot) if slot.in_use && slot.generation == handle.generation => Ok(()),
            _ => Err(BotError::StaleHandle(format!("planner node {:?}", handle))),
        }
    }

    pub fn free(&mut self, handle: NodeHandle) -> BotResult<()> {
        self.check_handle(handle)?;
        let index = handle.index as i16;
        self.unlink(index, USED_LIST)?;
        self.link(index, FREE_LIST);
        self.num_used -= 1;

        let slot = &mut self.slots[handle.index()];
        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.node.action_record = None;
        Ok(())
    }

    /// Frees every used node.
    pub fn clear(&mut self) {
        let mut index = self.list_first[USED_LIST];
        while index >= 0 {
            let slot = &mut self.slots[index as usize];
            let next = slot.next;
            slot.in_use = false;
            slot.generation = slot.generation.wrapping_add(1);
            slot.node.action_record = None;
            index = next;
        }
        // Every slot is free now, relink them all in index order
        let capacity = self.slots.len();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.prev = i as i16 - 1;
            slot.next = if i + 1 < capacity { i as i16 + 1 } else { -1 };
        }
        self.list_first = [0, -1];
        self.num_used = 0;
    }

    pub fn get(&self, handle: NodeHandle) -> BotResult<&PlannerNode> {
        self.check_handle(handle)?;
        Ok(&self.slots[handle.index()].node)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> BotResult<&mut PlannerNode> {
        self.check_handle(handle)?;
        Ok(&mut self.slots[handle.index()].node)
    }

    /// Moves the record out of the node so it outlives the pool clearing.
    pub fn take_action_record(&mut self, handle: NodeHandle) -> BotResult<Option<ActionRecord>> {
        Ok(self.get_mut(handle)?.action_record.take())
    }
}
