// tactical_bot_core/bot/src/systems/ai/planning/hash_set.rs
use crate::core::error::{BotError, BotResult};
use crate::systems::ai::planning::node_pool::{NodeHandle, PlannerNodePool};
use crate::systems::ai::planning::world_state::WorldState;

/// Planner nodes bucketed by `world_state_hash % N` with chains linked through the nodes.
///
/// A node is a member of at most one set at a time, so a single pair of bin
/// links per node serves both the OPEN and the CLOSED sets.
#[derive(Debug)]
pub struct PlannerNodesHashSet<const N: usize> {
    bins: [Option<NodeHandle>; N],
    len: usize,
}

impl<const N: usize> Default for PlannerNodesHashSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PlannerNodesHashSet<N> {
    pub fn new() -> Self {
        PlannerNodesHashSet { bins: [None; N], len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.bins = [None; N];
        self.len = 0;
    }

    #[inline]
    fn bin_index(hash: u32) -> usize {
        hash as usize % N
    }

    /// Hash collisions are expected, a full equality test decides.
    pub fn same_world_state_node(
        &self,
        pool: &PlannerNodePool,
        world_state: &WorldState,
        hash: u32,
    ) -> BotResult<Option<NodeHandle>> {
        let mut cursor = self.bins[Self::bin_index(hash)];
        while let Some(handle) = cursor {
            let node = pool.get(handle)?;
            if node.world_state_hash == hash && node.world_state == *world_state {
                return Ok(Some(handle));
            }
            cursor = node.next_in_bin;
        }
        Ok(None)
    }

    pub fn add(&mut self, pool: &mut PlannerNodePool, handle: NodeHandle) -> BotResult<()> {
        let (hash, world_state) = {
            let node = pool.get(handle)?;
            (node.world_state_hash, &node.world_state)
        };
        if let Some(same) = self.same_world_state_node(pool, world_state, hash)? {
            let diff = pool.get(same)?.world_state.diff(world_state);
            return Err(BotError::InvariantViolation(format!(
                "A node that contains the same world state is already present (diff: {:?})",
                diff
            )));
        }

        let bin_index = Self::bin_index(hash);
        let head = self.bins[bin_index];
        if let Some(head) = head {
            pool.get_mut(head)?.prev_in_bin = Some(handle);
        }
        let node = pool.get_mut(handle)?;
        node.prev_in_bin = None;
        node.next_in_bin = head;
        self.bins[bin_index] = Some(handle);
        self.len += 1;
        Ok(())
    }

    /// Unlinks a member node. The node stays allocated.
    pub fn remove_node(&mut self, pool: &mut PlannerNodePool, handle: NodeHandle) -> BotResult<()> {
        let (hash, prev, next) = {
            let node = pool.get(handle)?;
            (node.world_state_hash, node.prev_in_bin, node.next_in_bin)
        };
        match prev {
            Some(prev) => pool.get_mut(prev)?.next_in_bin = next,
            None => {
                let bin_index = Self::bin_index(hash);
                if self.bins[bin_index] != Some(handle) {
                    return Err(BotError::InvariantViolation(
                        "A node is expected to be a bin head but it isn't".to_string(),
                    ));
                }
                self.bins[bin_index] = next;
            }
        }
        if let Some(next) = next {
            pool.get_mut(next)?.prev_in_bin = prev;
        }
        let node = pool.get_mut(handle)?;
        node.prev_in_bin = None;
        node.next_in_bin = None;
        self.len -= 1;
        Ok(())
    }

    /// Unlinks the node equal to the world state and returns it with its heap index.
    pub fn remove_by_same_world_state(
        &mut self,
        pool: &mut PlannerNodePool,
        world_state: &WorldState,
        hash: u32,
    ) -> BotResult<(NodeHandle, Option<usize>)> {
        let Some(handle) = self.same_world_state_node(pool, world_state, hash)? else {
            return Err(BotError::InvariantViolation(format!(
                "Can't find a node that has the same world state {}",
                world_state
            )));
        };
        self.remove_node(pool, handle)?;
        Ok((handle, pool.get(handle)?.heap_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;
    use crate::systems::ai::planning::world_state::{BoolVarName, OriginVarName};

    fn state(x: f32) -> WorldState {
        let mut ws = WorldState::new();
        ws.set_origin(OriginVarName::BotOrigin, Vec3::new(x, 0.0, 0.0));
        ws
    }

    #[test]
    fn collisions_are_resolved_by_equality() {
        // A single bin puts every node in one chain
        let mut set: PlannerNodesHashSet<1> = PlannerNodesHashSet::new();
        let mut pool = PlannerNodePool::new(8);
        let handles: Vec<_> = (0..4).map(|i| pool.alloc(state(i as f32 * 16.0)).unwrap()).collect();
        for &h in &handles {
            set.add(&mut pool, h).unwrap();
        }
        let probe = state(32.0);
        let found = set.same_world_state_node(&pool, &probe, probe.hash_value()).unwrap();
        assert_eq!(found, Some(handles[2]));

        // Remove from the middle of the chain, the rest stays reachable
        set.remove_node(&mut pool, handles[2]).unwrap();
        assert_eq!(set.same_world_state_node(&pool, &probe, probe.hash_value()).unwrap(), None);
        for &i in &[0usize, 1, 3] {
            let ws = state(i as f32 * 16.0);
            assert_eq!(set.same_world_state_node(&pool, &ws, ws.hash_value()).unwrap(), Some(handles[i]));
        }
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn duplicate_state_is_an_invariant_violation() {
        let mut set: PlannerNodesHashSet<71> = PlannerNodesHashSet::new();
        let mut pool = PlannerNodePool::new(4);
        let a = pool.alloc(state(0.0)).unwrap();
        let b = pool.alloc(state(0.0)).unwrap();
        set.add(&mut pool, a).unwrap();
        assert!(matches!(set.add(&mut pool, b), Err(BotError::InvariantViolation(_))));
    }

    #[test]
    fn remove_by_same_state_reports_heap_index() {
        let mut set: PlannerNodesHashSet<71> = PlannerNodesHashSet::new();
        let mut pool = PlannerNodePool::new(4);
        let mut ws = state(0.0);
        ws.set_bool(BoolVarName::HasRunAway, true);
        let a = pool.alloc(ws.clone()).unwrap();
        pool.get_mut(a).unwrap().heap_index = Some(3);
        set.add(&mut pool, a).unwrap();

        let (removed, heap_index) = set.remove_by_same_world_state(&mut pool, &ws, ws.hash_value()).unwrap();
        assert_eq!(removed, a);
        assert_eq!(heap_index, Some(3));
        assert!(set.is_empty());
        assert!(matches!(
            set.remove_by_same_world_state(&mut pool, &ws, ws.hash_value()),
            Err(BotError::InvariantViolation(_))
        ));
    }
}
