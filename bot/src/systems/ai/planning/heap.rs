// tactical_bot_core/bot/src/systems/ai/planning/heap.rs
use crate::core::error::{BotError, BotResult};
use crate::systems::ai::planning::node_pool::{NodeHandle, PlannerNodePool};

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    cost: f32,
    handle: NodeHandle,
}

/// A binary min-heap of open nodes that supports removal of an arbitrary node.
///
/// Each node stores its current array slot in `heap_index`, updated on every swap.
#[derive(Debug)]
pub struct PlannerNodesHeap {
    array: Vec<HeapEntry>,
    capacity: usize,
}

impl PlannerNodesHeap {
    pub fn new(capacity: usize) -> Self {
        PlannerNodesHeap { array: Vec::with_capacity(capacity), capacity }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn clear(&mut self) {
        self.array.clear();
    }

    fn set_index(&mut self, pool: &mut PlannerNodePool, i: usize) -> BotResult<()> {
        pool.get_mut(self.array[i].handle)?.heap_index = Some(i);
        Ok(())
    }

    fn swap(&mut self, pool: &mut PlannerNodePool, i: usize, j: usize) -> BotResult<()> {
        self.array.swap(i, j);
        self.set_index(pool, i)?;
        self.set_index(pool, j)
    }

    fn bubble_up(&mut self, pool: &mut PlannerNodePool, mut child: usize) -> BotResult<()> {
        while child > 0 {
            let parent = (child - 1) / 2;
            if self.array[child].cost < self.array[parent].cost {
                self.swap(pool, child, parent)?;
                child = parent;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn bubble_down(&mut self, pool: &mut PlannerNodePool, mut hole: usize) -> BotResult<()> {
        while 2 * hole + 1 < self.array.len() {
            let mut child = 2 * hole + 1;
            if child + 1 < self.array.len() && self.array[child + 1].cost < self.array[child].cost {
                child += 1;
            }
            if self.array[hole].cost > self.array[child].cost {
                self.swap(pool, hole, child)?;
                hole = child;
            } else {
                break;
            }
        }
        Ok(())
    }

    pub fn push(&mut self, pool: &mut PlannerNodePool, handle: NodeHandle) -> BotResult<()> {
        if self.array.len() == self.capacity {
            return Err(BotError::CapacityExceeded { what: "open nodes heap", capacity: self.capacity });
        }
        let cost = pool.get(handle)?.heap_cost;
        self.array.push(HeapEntry { cost, handle });
        let child = self.array.len() - 1;
        self.set_index(pool, child)?;
        self.bubble_up(pool, child)?;
        self.check_indices(pool)
    }

    pub fn pop(&mut self, pool: &mut PlannerNodePool) -> BotResult<Option<NodeHandle>> {
        if self.array.is_empty() {
            return Ok(None);
        }
        let result = self.array.swap_remove(0);
        if !self.array.is_empty() {
            self.set_index(pool, 0)?;
            self.bubble_down(pool, 0)?;
        }
        pool.get_mut(result.handle)?.heap_index = None;
        self.check_indices(pool)?;
        Ok(Some(result.handle))
    }

    /// Removes the node at the array index. The last node takes its place and
    /// moves up or down, whichever restores the heap property.
    pub fn remove(&mut self, pool: &mut PlannerNodePool, index: usize) -> BotResult<NodeHandle> {
        if index >= self.array.len() {
            return Err(BotError::InvariantViolation(format!(
                "Attempt to remove a node by index {} from a heap of size {}",
                index,
                self.array.len()
            )));
        }
        let removed = self.array.swap_remove(index);
        if index < self.array.len() {
            self.set_index(pool, index)?;
            if index > 0 && self.array[index].cost < self.array[(index - 1) / 2].cost {
                self.bubble_up(pool, index)?;
            } else {
                self.bubble_down(pool, index)?;
            }
        }
        pool.get_mut(removed.handle)?.heap_index = None;
        self.check_indices(pool)?;
        Ok(removed.handle)
    }

    #[cfg(debug_assertions)]
    fn check_indices(&self, pool: &PlannerNodePool) -> BotResult<()> {
        for (i, entry) in self.array.iter().enumerate() {
            let node_index = pool.get(entry.handle)?.heap_index;
            if node_index != Some(i) {
                return Err(BotError::InvariantViolation(format!(
                    "A heap node at index {} has heap index {:?}",
                    i, node_index
                )));
            }
        }
        Ok(())
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    fn check_indices(&self, _pool: &PlannerNodePool) -> BotResult<()> {
        Ok(())
    }

    #[cfg(test)]
    fn is_valid_heap(&self) -> bool {
        (1..self.array.len()).all(|i| self.array[(i - 1) / 2].cost <= self.array[i].cost)
    }
}
