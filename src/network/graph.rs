//! Graph traversal over processor connections.
//!
//! Everything here is a pure function of the arena's adjacency. The evaluator
//! uses `schedule` to compute the ordered set of processors a pass must visit;
//! the rest are query utilities exposed through the network.

use crate::network::arena::ProcessorArena;
use crate::network::id::ProcessorId;
use std::collections::VecDeque;

/// Ordered processors an evaluation pass visits.
#[derive(Debug, Clone, Default)]
pub struct EvaluationPlan {
    /// Producers before consumers.
    pub order: Vec<ProcessorId>,
    pub stats: PlanStats,
}

impl EvaluationPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Statistics about a scheduled pass
#[derive(Debug, Clone, Default)]
pub struct PlanStats {
    /// Live processors in the network
    pub total_processors: usize,

    /// Processors with a stored level above `Valid`
    pub invalid_processors: usize,

    /// Processors reachable downstream from an invalid one
    pub scheduled_processors: usize,

    /// Scheduling time in microseconds
    pub schedule_time_us: u64,
}

/// Dense forward and backward adjacency, indexed by processor index.
fn build_adjacency(arena: &ProcessorArena) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let n = arena.capacity();
    let mut fwd_adj = vec![Vec::new(); n];
    let mut bwd_adj = vec![Vec::new(); n];

    for slot in arena.iter() {
        let from = slot.id().index();
        for successor in arena.direct_successors(slot.id()) {
            let to = successor.index();
            if to >= n {
                continue;
            }
            fwd_adj[from].push(to);
            bwd_adj[to].push(from);
        }
    }

    (fwd_adj, bwd_adj)
}

/// Mark everything reachable from `seeds` along `adj` using DFS.
fn reachability(seeds: &[usize], adj: &[Vec<usize>], n: usize) -> Vec<bool> {
    let mut reachable = vec![false; n];
    let mut stack = Vec::new();

    for &seed in seeds {
        if seed < n && !reachable[seed] {
            reachable[seed] = true;
            stack.push(seed);
        }
    }

    while let Some(node) = stack.pop() {
        for &neighbor in &adj[node] {
            if !reachable[neighbor] {
                reachable[neighbor] = true;
                stack.push(neighbor);
            }
        }
    }

    reachable
}

/// Kahn's algorithm restricted to `active`. Ties resolve by processor index.
fn topological_sort_active(fwd_adj: &[Vec<usize>], active: &[bool]) -> Vec<usize> {
    let n = active.len();
    let mut in_degree = vec![0usize; n];

    for from in 0..n {
        if !active[from] {
            continue;
        }
        for &to in &fwd_adj[from] {
            if active[to] {
                in_degree[to] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| active[i] && in_degree[i] == 0).collect();
    let mut result = Vec::new();

    while let Some(node) = queue.pop_front() {
        result.push(node);

        for &neighbor in &fwd_adj[node] {
            if !active[neighbor] {
                continue;
            }
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                queue.push_back(neighbor);
            }
        }
    }

    result
}

fn to_ids(indices: impl IntoIterator<Item = usize>) -> Vec<ProcessorId> {
    indices.into_iter().map(|i| ProcessorId(i as u32)).collect()
}

/// Schedule a pass: every processor downstream of an invalid one, in
/// dependency order.
pub fn schedule(arena: &ProcessorArena) -> EvaluationPlan {
    let start_time = std::time::Instant::now();
    let n = arena.capacity();

    let seeds: Vec<usize> = arena
        .invalid_processors()
        .into_iter()
        .map(ProcessorId::index)
        .collect();
    if seeds.is_empty() {
        return EvaluationPlan {
            order: Vec::new(),
            stats: PlanStats {
                total_processors: arena.len(),
                ..PlanStats::default()
            },
        };
    }

    let (fwd_adj, _) = build_adjacency(arena);
    let active = reachability(&seeds, &fwd_adj, n);
    let order = to_ids(topological_sort_active(&fwd_adj, &active));

    let stats = PlanStats {
        total_processors: arena.len(),
        invalid_processors: seeds.len(),
        scheduled_processors: order.len(),
        schedule_time_us: start_time.elapsed().as_micros() as u64,
    };

    EvaluationPlan { order, stats }
}

/// Every processor upstream of `id`, excluding `id`.
pub fn transitive_predecessors(arena: &ProcessorArena, id: ProcessorId) -> Vec<ProcessorId> {
    let (_, bwd_adj) = build_adjacency(arena);
    let mut reachable = reachability(&[id.index()], &bwd_adj, arena.capacity());
    if let Some(own) = reachable.get_mut(id.index()) {
        *own = false;
    }
    to_ids((0..reachable.len()).filter(|&i| reachable[i]))
}

/// Every processor downstream of `id`, excluding `id`.
pub fn transitive_successors(arena: &ProcessorArena, id: ProcessorId) -> Vec<ProcessorId> {
    let (fwd_adj, _) = build_adjacency(arena);
    let mut reachable = reachability(&[id.index()], &fwd_adj, arena.capacity());
    if let Some(own) = reachable.get_mut(id.index()) {
        *own = false;
    }
    to_ids((0..reachable.len()).filter(|&i| reachable[i]))
}

/// Whether a connection `from → to` would close a cycle, i.e. `from` is
/// already reachable from `to`.
pub fn would_create_cycle(arena: &ProcessorArena, from: ProcessorId, to: ProcessorId) -> bool {
    if from == to {
        return true;
    }
    let (fwd_adj, _) = build_adjacency(arena);
    let reachable = reachability(&[to.index()], &fwd_adj, arena.capacity());
    reachable.get(from.index()).copied().unwrap_or(false)
}

/// Topological order of the whole network. Each sink is walked upward in
/// post-order, so every producer precedes its consumers; sinks are visited in
/// id order.
pub fn topological_sort(arena: &ProcessorArena) -> Vec<ProcessorId> {
    let n = arena.capacity();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(arena.len());

    let sinks: Vec<ProcessorId> = arena
        .iter()
        .filter(|slot| arena.direct_successors(slot.id()).is_empty())
        .map(|slot| slot.id())
        .collect();

    for sink in sinks {
        // Iterative post-order DFS over predecessors.
        let mut stack: Vec<(ProcessorId, bool)> = vec![(sink, false)];
        while let Some((id, expanded)) = stack.pop() {
            let index = id.index();
            if expanded {
                order.push(id);
                continue;
            }
            if index >= n || visited[index] {
                continue;
            }
            visited[index] = true;
            stack.push((id, true));
            for pred in arena.direct_predecessors(id).into_iter().rev() {
                if pred.index() < n && !visited[pred.index()] {
                    stack.push((pred, false));
                }
            }
        }
    }

    order
}
