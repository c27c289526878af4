// tactical_bot_core/bot/src/systems/ai/planning/planner.rs
use crate::core::constants::{CLOSED_SET_BINS, MAX_PLANNER_GOALS, MAX_PLANNER_NODES, OPEN_SET_BINS};
use crate::core::error::{BotError, BotResult};
use crate::core::types::LevelTime;
use crate::systems::ai::planning::action::PlanningContext;
use crate::systems::ai::planning::goal::{Goal, GoalKind};
use crate::systems::ai::planning::hash_set::PlannerNodesHashSet;
use crate::systems::ai::planning::heap::PlannerNodesHeap;
use crate::systems::ai::planning::node_pool::{NodeHandle, PlannerNodePool};
use crate::systems::ai::planning::record::{ActionRecord, ExecutionState, RecordStatus};
use crate::systems::ai::planning::world_state::WorldState;
use metrics::{counter, histogram};
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// What to do with a newly found transition given the same-state nodes already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaxation {
    /// The state is new.
    Insert,
    /// An open node has a costlier path: drop it and insert the new one.
    ReplaceOpen,
    /// A closed node has a costlier path: unlink it from CLOSED and insert the new one.
    /// The old node stays allocated since its children refer to it as a parent.
    ReopenClosed,
    /// The known path is not worse.
    Discard,
}

/// Costs of same-state nodes in OPEN and CLOSED versus the new path cost.
pub fn relaxation_decision(open_cost: Option<f32>, closed_cost: Option<f32>, new_cost: f32) -> BotResult<Relaxation> {
    match (open_cost, closed_cost) {
        (Some(_), Some(_)) => Err(BotError::InvariantViolation(
            "A world state was in OPEN and CLOSED sets simultaneously".to_string(),
        )),
        (Some(old_cost), None) if new_cost < old_cost => Ok(Relaxation::ReplaceOpen),
        (None, Some(old_cost)) if new_cost < old_cost => Ok(Relaxation::ReopenClosed),
        (None, None) => Ok(Relaxation::Insert),
        _ => Ok(Relaxation::Discard),
    }
}

/// An ordered chain of records that satisfies a goal, with the cost of every step.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub records: VecDeque<ActionRecord>,
    pub transition_costs: SmallVec<[f32; 8]>,
    pub cost: f32,
}

pub struct GoalOrientedPlanner {
    name: String,
    goals: SmallVec<[Goal; MAX_PLANNER_GOALS]>,
    active_goal: Option<usize>,
    plan: VecDeque<ActionRecord>,
    next_active_goal_update_at: LevelTime,
    pool: PlannerNodePool,
    heap: PlannerNodesHeap,
    open_set: Box<PlannerNodesHashSet<OPEN_SET_BINS>>,
    closed_set: Box<PlannerNodesHashSet<CLOSED_SET_BINS>>,
    last_nodes_expanded: usize,
}

impl GoalOrientedPlanner {
    pub fn new(name: impl Into<String>, goal_kinds: &[GoalKind]) -> BotResult<Self> {
        Self::with_node_capacity(name, goal_kinds, MAX_PLANNER_NODES)
    }

    pub fn with_node_capacity(name: impl Into<String>, goal_kinds: &[GoalKind], capacity: usize) -> BotResult<Self> {
        if goal_kinds.len() > MAX_PLANNER_GOALS {
            return Err(BotError::CapacityExceeded { what: "planner goals", capacity: MAX_PLANNER_GOALS });
        }
        Ok(GoalOrientedPlanner {
            name: name.into(),
            goals: goal_kinds.iter().map(|&kind| Goal::new(kind)).collect(),
            active_goal: None,
            plan: VecDeque::new(),
            next_active_goal_update_at: 0,
            pool: PlannerNodePool::new(capacity),
            heap: PlannerNodesHeap::new(capacity),
            open_set: Box::default(),
            closed_set: Box::default(),
            last_nodes_expanded: 0,
        })
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn active_goal(&self) -> Option<GoalKind> {
        self.active_goal.map(|i| self.goals[i].kind)
    }

    pub fn plan(&self) -> &VecDeque<ActionRecord> {
        &self.plan
    }

    pub fn plan_head(&self) -> Option<&ActionRecord> {
        self.plan.front()
    }

    pub fn next_active_goal_update_at(&self) -> LevelTime {
        self.next_active_goal_update_at
    }

    pub fn last_nodes_expanded(&self) -> usize {
        self.last_nodes_expanded
    }

    pub fn num_used_nodes(&self) -> usize {
        self.pool.num_used()
    }

    /// Runs the plan state machine for one think frame.
    pub fn think(&mut self, ctx: &PlanningContext, curr: &WorldState, exec: &mut ExecutionState) -> BotResult<()> {
        let now = ctx.facts.level_time;

        // The plan has been completed in a previous frame or has never been assigned
        if self.plan.is_empty() {
            self.active_goal = None;
            if self.find_new_goal_and_plan(ctx, curr, exec)? {
                self.schedule_goal_update(ctx, now);
            }
            return Ok(());
        }

        let status = match self.plan.front() {
            Some(head) => head.check_status(curr, ctx.facts, exec),
            None => RecordStatus::Invalid,
        };
        match status {
            RecordStatus::Invalid => {
                debug!("[Bot {}] Plan head {} status is INVALID", self.name, self.plan_head_name());
                self.clear_goal_and_plan(exec);
                if self.find_new_goal_and_plan(ctx, curr, exec)? {
                    self.schedule_goal_update(ctx, now);
                }
                return Ok(());
            }
            RecordStatus::Completed => {
                debug!("[Bot {}] Plan head {} status is COMPLETED", self.name, self.plan_head_name());
                if let Some(old_head) = self.plan.pop_front() {
                    old_head.deactivate(exec);
                }
                if let Some(new_head) = self.plan.front() {
                    new_head.activate(exec);
                }
                // The goal update is deferred to the next think frame
                return Ok(());
            }
            RecordStatus::Valid => {}
        }

        if self.next_active_goal_update_at <= now && self.update_goal_and_plan(ctx, curr, exec)? {
            self.schedule_goal_update(ctx, now);
        }
        Ok(())
    }

    fn plan_head_name(&self) -> &'static str {
        self.plan.front().map_or("<none>", ActionRecord::name)
    }

    fn schedule_goal_update(&mut self, ctx: &PlanningContext, now: LevelTime) {
        if let Some(goal_index) = self.active_goal {
            self.next_active_goal_update_at = now + self.goals[goal_index].kind.update_period_millis(ctx.config);
        }
    }

    fn update_goal_weights(&mut self, ctx: &PlanningContext, curr: &WorldState) {
        for goal in self.goals.iter_mut() {
            goal.update_weight(curr, ctx.facts, ctx.config);
        }
    }

    /// Indices of relevant goals, the heaviest first.
    fn sorted_relevant_goals(&self) -> SmallVec<[usize; MAX_PLANNER_GOALS]> {
        let mut relevant: SmallVec<[usize; MAX_PLANNER_GOALS]> =
            (0..self.goals.len()).filter(|&i| self.goals[i].is_relevant()).collect();
        relevant.sort_by(|&a, &b| self.goals[b].weight.total_cmp(&self.goals[a].weight));
        relevant
    }

    pub fn find_new_goal_and_plan(
        &mut self,
        ctx: &PlanningContext,
        curr: &WorldState,
        exec: &mut ExecutionState,
    ) -> BotResult<bool> {
        if !self.plan.is_empty() {
            return Err(BotError::InvariantViolation("find_new_goal_and_plan(): an active plan is present".into()));
        }
        if self.active_goal.is_some() {
            return Err(BotError::InvariantViolation("find_new_goal_and_plan(): an active goal is present".into()));
        }

        self.update_goal_weights(ctx, curr);
        let relevant_goals = self.sorted_relevant_goals();
        if relevant_goals.is_empty() {
            debug!("[Bot {}] There are no relevant goals", self.name);
            return Ok(false);
        }

        for goal_index in relevant_goals {
            if let Some(plan) = self.build_plan(goal_index, ctx, curr)? {
                debug!("[Bot {}] About to set new goal {} as an active one", self.name, self.goals[goal_index].kind.name());
                self.set_goal_and_plan(goal_index, plan, exec)?;
                return Ok(true);
            }
            debug!(
                "[Bot {}] Can't find a plan that satisfies a relevant goal {}",
                self.name,
                self.goals[goal_index].kind.name()
            );
        }

        debug!("[Bot {}] Can't find any goal that has a satisfying it plan", self.name);
        Ok(false)
    }

    pub fn update_goal_and_plan(
        &mut self,
        ctx: &PlanningContext,
        curr: &WorldState,
        exec: &mut ExecutionState,
    ) -> BotResult<bool> {
        let Some(active_goal) = self.active_goal else {
            return Err(BotError::InvariantViolation("update_goal_and_plan(): there is no active goal".into()));
        };
        if self.plan.is_empty() {
            return Err(BotError::InvariantViolation("update_goal_and_plan(): there is no active plan".into()));
        }

        self.update_goal_weights(ctx, curr);
        let relevant_goals = self.sorted_relevant_goals();
        if relevant_goals.is_empty() {
            debug!("[Bot {}] There are no relevant goals", self.name);
            return Ok(false);
        }

        if !relevant_goals.contains(&active_goal) {
            debug!("[Bot {}] Old goal {} is not relevant anymore", self.name, self.goals[active_goal].kind.name());
            self.clear_goal_and_plan(exec);
            return self.set_first_plannable_goal(&relevant_goals, None, ctx, curr, exec);
        }

        let Some(new_active_goal_plan) = self.build_plan(active_goal, ctx, curr)? else {
            debug!(
                "[Bot {}] There is no plan that satisfies current goal {} anymore",
                self.name,
                self.goals[active_goal].kind.name()
            );
            self.clear_goal_and_plan(exec);
            return self.set_first_plannable_goal(&relevant_goals, Some(active_goal), ctx, curr, exec);
        };

        let threshold = ctx.config.keep_curr_goal_weight_threshold;
        let active_weight = self.goals[active_goal].weight;
        for &goal_index in &relevant_goals {
            if self.goals[goal_index].weight < active_weight + threshold {
                break;
            }
            if let Some(plan) = self.build_plan(goal_index, ctx, curr)? {
                // The rebuilt plan of the current goal is dropped
                debug!(
                    "[Bot {}] About to set goal {} instead of current one {} that is less relevant at the moment",
                    self.name,
                    self.goals[goal_index].kind.name(),
                    self.goals[active_goal].kind.name()
                );
                self.clear_goal_and_plan(exec);
                self.set_goal_and_plan(goal_index, plan, exec)?;
                return Ok(true);
            }
        }

        debug!("[Bot {}] About to update a plan for the kept current goal {}", self.name, self.goals[active_goal].kind.name());
        self.clear_goal_and_plan(exec);
        self.set_goal_and_plan(active_goal, new_active_goal_plan, exec)?;
        Ok(true)
    }

    fn set_first_plannable_goal(
        &mut self,
        relevant_goals: &[usize],
        skip_goal: Option<usize>,
        ctx: &PlanningContext,
        curr: &WorldState,
        exec: &mut ExecutionState,
    ) -> BotResult<bool> {
        for &goal_index in relevant_goals {
            if Some(goal_index) == skip_goal {
                continue;
            }
            if let Some(plan) = self.build_plan(goal_index, ctx, curr)? {
                debug!("[Bot {}] About to set goal {} as an active one", self.name, self.goals[goal_index].kind.name());
                self.set_goal_and_plan(goal_index, plan, exec)?;
                return Ok(true);
            }
        }
        debug!("[Bot {}] Can't find any goal that has a satisfying it plan", self.name);
        Ok(false)
    }

    fn set_goal_and_plan(&mut self, goal_index: usize, plan: Plan, exec: &mut ExecutionState) -> BotResult<()> {
        if !self.plan.is_empty() {
            return Err(BotError::InvariantViolation("set_goal_and_plan(): current plan is still present".into()));
        }
        if self.active_goal.is_some() {
            return Err(BotError::InvariantViolation("set_goal_and_plan(): active goal is still present".into()));
        }
        if plan.records.is_empty() {
            return Err(BotError::InvariantViolation("set_goal_and_plan(): attempt to set an empty plan".into()));
        }
        self.active_goal = Some(goal_index);
        self.plan = plan.records;
        if let Some(head) = self.plan.front() {
            head.activate(exec);
        }
        Ok(())
    }

    pub fn clear_goal_and_plan(&mut self, exec: &mut ExecutionState) {
        if let Some(head) = self.plan.front() {
            head.deactivate(exec);
        }
        self.plan.clear();
        self.active_goal = None;
    }

    /// Runs A* for the goal. Nodes never outlive the call.
    pub fn build_plan(&mut self, goal_index: usize, ctx: &PlanningContext, curr: &WorldState) -> BotResult<Option<Plan>> {
        let goal = self.goals[goal_index];
        let Some(desired) = goal.desired_world_state(curr, ctx.config) else {
            trace!("[Bot {}] {} has no desired world state", self.name, goal.kind.name());
            return Ok(None);
        };

        let result = self.search(goal.kind, &desired, ctx, curr);

        self.pool.clear();
        self.heap.clear();
        self.open_set.clear();
        self.closed_set.clear();

        histogram!("ai_planner_nodes_expanded").record(self.last_nodes_expanded as f64);
        match &result {
            Ok(Some(plan)) => {
                counter!("ai_plans_built_total").increment(1);
                debug!(
                    "[Bot {}] Built plan for {}: {} (cost {})",
                    self.name,
                    goal.kind.name(),
                    plan.records.iter().map(ActionRecord::name).collect::<Vec<_>>().join(" -> "),
                    plan.cost
                );
            }
            Ok(None) => counter!("ai_plans_failed_total").increment(1),
            Err(_) => {}
        }
        result
    }

    fn search(&mut self, goal_kind: GoalKind, desired: &WorldState, ctx: &PlanningContext, curr: &WorldState) -> BotResult<Option<Plan>> {
        let Self { pool, heap, open_set, closed_set, last_nodes_expanded, .. } = self;
        *last_nodes_expanded = 0;

        let start = pool.alloc(curr.clone())?;
        open_set.add(pool, start)?;
        heap.push(pool, start)?;

        while let Some(curr_handle) = heap.pop(pool)? {
            open_set.remove_node(pool, curr_handle)?;
            *last_nodes_expanded += 1;

            let (node_world_state, cost_so_far) = {
                let node = pool.get(curr_handle)?;
                if desired.is_satisfied_by(&node.world_state) {
                    return Self::reconstruct_plan(pool, curr_handle);
                }
                (node.world_state.clone(), node.cost_so_far)
            };
            closed_set.add(pool, curr_handle)?;

            for &action in goal_kind.actions() {
                let Some(transition) = action.try_apply(ctx, &node_world_state) else { continue };
                let cost = cost_so_far + transition.cost;
                let hash = transition.world_state.hash_value();

                let open_node = open_set.same_world_state_node(pool, &transition.world_state, hash)?;
                let closed_node = closed_set.same_world_state_node(pool, &transition.world_state, hash)?;
                let open_cost = open_node.map(|h| pool.get(h).map(|n| n.cost_so_far)).transpose()?;
                let closed_cost = closed_node.map(|h| pool.get(h).map(|n| n.cost_so_far)).transpose()?;

                match relaxation_decision(open_cost, closed_cost, cost)? {
                    Relaxation::Discard => continue,
                    Relaxation::Insert => {}
                    Relaxation::ReplaceOpen => {
                        let (old, heap_index) = open_set.remove_by_same_world_state(pool, &transition.world_state, hash)?;
                        if let Some(heap_index) = heap_index {
                            heap.remove(pool, heap_index)?;
                        }
                        pool.free(old)?;
                    }
                    Relaxation::ReopenClosed => {
                        closed_set.remove_by_same_world_state(pool, &transition.world_state, hash)?;
                    }
                }

                let handle = pool.alloc(transition.world_state)?;
                {
                    let node = pool.get_mut(handle)?;
                    node.transition_cost = transition.cost;
                    node.cost_so_far = cost;
                    node.heap_cost = cost;
                    node.parent = Some(curr_handle);
                    node.action_record = Some(transition.record);
                }
                open_set.add(pool, handle)?;
                heap.push(pool, handle)?;
            }
        }
        Ok(None)
    }

    /// Walks parent links from the goal node; the start node has no record.
    fn reconstruct_plan(pool: &mut PlannerNodePool, last: NodeHandle) -> BotResult<Option<Plan>> {
        let cost = pool.get(last)?.cost_so_far;
        let mut records: Vec<(ActionRecord, f32)> = Vec::new();
        let mut cursor = Some(last);
        while let Some(handle) = cursor {
            let (parent, transition_cost) = {
                let node = pool.get(handle)?;
                (node.parent, node.transition_cost)
            };
            if parent.is_none() {
                break;
            }
            let Some(record) = pool.take_action_record(handle)? else {
                return Err(BotError::InvariantViolation("A non-start planner node has no action record".into()));
            };
            records.push((record, transition_cost));
            cursor = parent;
        }

        if records.is_empty() {
            warn!("The goal world state is already satisfied by the current one, can't find a plan");
            return Ok(None);
        }

        records.reverse();
        let transition_costs = records.iter().map(|(_, c)| *c).collect();
        Ok(Some(Plan { records: records.into_iter().map(|(r, _)| r).collect(), transition_costs, cost }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxation_decision_table() {
        use Relaxation::*;
        assert_eq!(relaxation_decision(None, None, 10.0).unwrap(), Insert);
        assert_eq!(relaxation_decision(Some(20.0), None, 10.0).unwrap(), ReplaceOpen);
        assert_eq!(relaxation_decision(Some(10.0), None, 10.0).unwrap(), Discard);
        assert_eq!(relaxation_decision(Some(5.0), None, 10.0).unwrap(), Discard);
        assert_eq!(relaxation_decision(None, Some(20.0), 10.0).unwrap(), ReopenClosed);
        assert_eq!(relaxation_decision(None, Some(10.0), 10.0).unwrap(), Discard);
        assert_eq!(relaxation_decision(None, Some(5.0), 10.0).unwrap(), Discard);
        assert!(matches!(
            relaxation_decision(Some(1.0), Some(1.0), 0.5),
            Err(BotError::InvariantViolation(_))
        ));
    }

    #[test]
    fn too_many_goals_are_rejected() {
        let kinds = [GoalKind::Roam; MAX_PLANNER_GOALS + 1];
        assert!(matches!(
            GoalOrientedPlanner::new("test", &kinds),
            Err(BotError::CapacityExceeded { .. })
        ));
    }
}
