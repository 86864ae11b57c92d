//! Executable plans: a captured graph bound to queues and commands.
//!
//! Instantiation freezes a private clone of the source graph, allocates the
//! queues its schedule demands, lowers every node into commands, and wires
//! all cross-chain ordering once. Replaying the plan is then nothing but
//! re-submitting the same commands in chain order; no per-run allocation or
//! scheduling happens.

use std::collections::HashMap;

use lattice_core::error::{Result, RuntimeError};
use lattice_core::types::NodeId;
use lattice_core::{log_debug, log_info};
use lattice_device::{Command, Device, Event, Payload, Queue, Stream};
use lattice_graph::{build_run_list, queue_demand, Graph, NodeOp};

use crate::bind::make_payload;

/// Event bookkeeping performed when the node's command is submitted.
enum EventBinding {
    /// The event tracks this command's completion once submitted.
    Record(Event),
    /// The command waits on whichever record the event holds at submission.
    Wait(Event),
}

/// One node's executable state inside a plan.
struct Binding {
    /// The node's device commands; empty for child graph nodes.
    commands: Vec<Command>,
    /// Present on event record and wait nodes.
    event: Option<EventBinding>,
    /// Present on child graph nodes: the nested body.
    sub: Option<Box<Body>>,
}

impl Binding {
    /// The command incoming waits attach to.
    fn first_command(&self) -> Option<&Command> {
        self.commands
            .first()
            .or_else(|| self.sub.as_deref().map(|sub| &sub.enter))
    }

    /// The completion downstream consumers wait on.
    fn last_signal(&self) -> Option<lattice_device::Signal> {
        if let Some(sub) = &self.sub {
            Some(sub.exit.signal())
        } else {
            self.commands.last().map(Command::signal)
        }
    }
}

/// The wired schedule of one graph (or nested graph).
struct Body {
    chains: Vec<Vec<NodeId>>,
    /// Queue per chain; `None` means the chain inherits the queue the body
    /// is launched on. Index 0 is always `None`.
    chain_queues: Vec<Option<Queue>>,
    bindings: HashMap<NodeId, Binding>,
    /// Marker submitted before any chain; chain heads wait on it.
    enter: Command,
    /// Marker submitted after all chains; waits on every chain tail.
    exit: Command,
}

/// Hands out plan-owned queues during body construction.
struct QueueCursor<'a> {
    queues: &'a [Queue],
    next: usize,
}

impl QueueCursor<'_> {
    fn take(&mut self) -> Result<Queue> {
        let queue = self
            .queues
            .get(self.next)
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidState("plan queue pool exhausted".to_string()))?;
        self.next += 1;
        Ok(queue)
    }
}

fn build_body(graph: &Graph, device: &Device, cursor: &mut QueueCursor<'_>) -> Result<Body> {
    let list = build_run_list(graph);

    let mut chain_queues = Vec::with_capacity(list.chains.len());
    for index in 0..list.chains.len() {
        if index == 0 {
            chain_queues.push(None);
        } else {
            chain_queues.push(Some(cursor.take()?));
        }
    }

    let mut bindings = HashMap::with_capacity(graph.node_count());
    for chain in &list.chains {
        for &id in chain {
            let op = graph.node(id)?.op();
            let binding = match op {
                NodeOp::ChildGraph(sub_graph) => Binding {
                    commands: Vec::new(),
                    event: None,
                    sub: Some(Box::new(build_body(sub_graph, device, cursor)?)),
                },
                _ => {
                    let payload = make_payload(op, device)?.ok_or_else(|| {
                        RuntimeError::InvalidState("node lowered to no payload".to_string())
                    })?;
                    let event = match op {
                        NodeOp::EventRecord(p) => Some(EventBinding::Record(p.event.clone())),
                        NodeOp::EventWait(p) => Some(EventBinding::Wait(p.event.clone())),
                        _ => None,
                    };
                    Binding {
                        commands: vec![Command::new(payload)],
                        event,
                        sub: None,
                    }
                }
            };
            bindings.insert(id, binding);
        }
    }

    let enter = Command::new(Payload::Marker);
    let exit = Command::new(Payload::Marker);

    // Chains on their own queues start after the enter marker; chain 0 is
    // ordered behind it by queue order alone. The exit marker joins every
    // chain tail.
    for (index, chain) in list.chains.iter().enumerate() {
        let (Some(&head), Some(&tail)) = (chain.first(), chain.last()) else {
            continue;
        };
        if index > 0 {
            if let Some(command) = bindings[&head].first_command() {
                command.add_wait(enter.signal());
            }
        }
        if let Some(signal) = bindings[&tail].last_signal() {
            exit.add_wait(signal);
        }
    }

    // Cross-chain dependencies: a chain head waits on each of its producers.
    for (head, producers) in &list.waits {
        for producer in producers {
            if let (Some(command), Some(signal)) = (
                bindings[head].first_command(),
                bindings[producer].last_signal(),
            ) {
                command.add_wait(signal);
            }
        }
    }

    Ok(Body {
        chains: list.chains,
        chain_queues,
        bindings,
        enter,
        exit,
    })
}

/// Submit a body's commands, chain-major, to its queues.
///
/// Producers always live in earlier chains than their consumers, so by the
/// time a command with a wait-list is submitted every signal it waits on has
/// already been reset by its producer's submission.
fn run_body(body: &Body, inherited: &Queue) {
    body.enter.enqueue(inherited);
    for (index, chain) in body.chains.iter().enumerate() {
        let queue = body.chain_queues[index].as_ref().unwrap_or(inherited);
        for id in chain {
            let binding = &body.bindings[id];
            // A wait targets whichever record the event holds right now; an
            // event never recorded degenerates to a no-op. Resolving here
            // instead of on the worker keeps a wait submitted ahead of its
            // record from stalling the queue. Only an outstanding record is
            // captured: it was necessarily submitted before this wait, while
            // a completed one needs no ordering and may be about to be reset
            // by a record later in this very submission.
            if let Some(EventBinding::Wait(event)) = &binding.event {
                if let (Some(command), Some(signal)) =
                    (binding.commands.first(), event.record_signal())
                {
                    if !signal.is_complete() {
                        command.add_transient_wait(signal);
                    }
                }
            }
            for command in &binding.commands {
                command.enqueue(queue);
            }
            // Bind after enqueue, once the signal is outstanding.
            if let Some(EventBinding::Record(event)) = &binding.event {
                if let Some(command) = binding.commands.first() {
                    event.bind_record(command.signal());
                }
            }
            if let Some(sub) = &binding.sub {
                run_body(sub, queue);
            }
        }
    }
    body.exit.enqueue(inherited);
}

/// First failure reported by any command of the body, in chain order.
fn first_failure(body: &Body) -> Option<String> {
    for chain in &body.chains {
        for id in chain {
            let binding = &body.bindings[id];
            for command in &binding.commands {
                if let Some(message) = command.failure() {
                    return Some(message);
                }
            }
            if let Some(sub) = &binding.sub {
                if let Some(message) = first_failure(sub) {
                    return Some(message);
                }
            }
        }
    }
    None
}

/// Refresh command payloads after the plan's graph took new parameters.
fn refresh_body(body: &mut Body, graph: &Graph, device: &Device) -> Result<()> {
    let ids: Vec<NodeId> = body.chains.iter().flatten().copied().collect();
    for id in ids {
        let op = graph.node(id)?.op();
        let binding = body
            .bindings
            .get_mut(&id)
            .ok_or(RuntimeError::NodeNotFound(id))?;
        match op {
            NodeOp::ChildGraph(sub_graph) => {
                if let Some(sub) = binding.sub.as_deref_mut() {
                    refresh_body(sub, sub_graph, device)?;
                }
            }
            _ => {
                if let Some(payload) = make_payload(op, device)? {
                    if let Some(command) = binding.commands.first() {
                        command.set_payload(payload);
                    }
                }
                match op {
                    NodeOp::EventRecord(p) => {
                        binding.event = Some(EventBinding::Record(p.event.clone()));
                    }
                    NodeOp::EventWait(p) => {
                        binding.event = Some(EventBinding::Wait(p.event.clone()));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Require that two graphs have the same shape: node count, kind at every
/// insertion-order position, identical edge sets, and matching nested graphs.
fn structural_match(mine: &Graph, other: &Graph) -> Result<()> {
    if mine.node_count() != other.node_count() {
        return Err(RuntimeError::TopologyMismatch(format!(
            "plan graph has {} nodes, replacement has {}",
            mine.node_count(),
            other.node_count()
        )));
    }
    for (position, (&m, &o)) in mine
        .node_ids()
        .iter()
        .zip(other.node_ids())
        .enumerate()
    {
        let mine_node = mine.node(m)?;
        let other_node = other.node(o)?;
        if mine_node.kind() != other_node.kind() {
            return Err(RuntimeError::TopologyMismatch(format!(
                "node {position} is {} in the plan but {} in the replacement",
                mine_node.kind(),
                other_node.kind()
            )));
        }
        if let (NodeOp::ChildGraph(a), NodeOp::ChildGraph(b)) =
            (mine_node.op(), other_node.op())
        {
            structural_match(a, b)?;
        }
    }

    let index_of = |graph: &Graph| -> HashMap<NodeId, usize> {
        graph
            .node_ids()
            .iter()
            .enumerate()
            .map(|(index, &id)| (id, index))
            .collect()
    };
    let mine_index = index_of(mine);
    let other_index = index_of(other);
    let mut mine_edges: Vec<(usize, usize)> = mine
        .edges()
        .into_iter()
        .map(|(p, c)| (mine_index[&p], mine_index[&c]))
        .collect();
    let mut other_edges: Vec<(usize, usize)> = other
        .edges()
        .into_iter()
        .map(|(p, c)| (other_index[&p], other_index[&c]))
        .collect();
    mine_edges.sort_unstable();
    other_edges.sort_unstable();
    if mine_edges != other_edges {
        return Err(RuntimeError::TopologyMismatch(
            "edge sets differ".to_string(),
        ));
    }
    Ok(())
}

/// An instantiated graph, ready for repeated replay.
pub struct ExecPlan {
    device: Device,
    graph: Graph,
    body: Body,
    queues: Vec<Queue>,
    updates: u64,
}

impl ExecPlan {
    /// Validate and freeze `source` into an executable plan.
    ///
    /// The plan owns a private clone of the graph; later edits to `source`
    /// do not affect it. Fails without side effects if any node's
    /// parameters are invalid.
    pub fn instantiate(source: &Graph, device: &Device) -> Result<ExecPlan> {
        source.validate(device)?;
        let (graph, _) = source.clone_with_map();
        let demand = queue_demand(&graph);
        let queues: Vec<Queue> = (0..demand)
            .map(|_| device.acquire_queue())
            .collect::<Result<_>>()?;
        let mut cursor = QueueCursor {
            queues: &queues,
            next: 0,
        };
        let body = build_body(&graph, device, &mut cursor)?;
        log_info!(
            "runtime::plan",
            nodes = graph.node_count(),
            queues = queues.len(),
            "Instantiated plan"
        );
        Ok(ExecPlan {
            device: device.clone(),
            graph,
            body,
            queues,
            updates: 0,
        })
    }

    /// Replay the plan on `stream`.
    ///
    /// Submission returns as soon as every command is queued; completion is
    /// observed with [`ExecPlan::synchronize`] or by synchronizing the
    /// stream. Back-to-back replays are serialized: a launch first joins the
    /// previous replay of this plan.
    pub fn run(&self, stream: &Stream) {
        self.body.exit.await_completion();
        log_debug!("runtime::plan", "Replaying plan");
        run_body(&self.body, stream.queue());
    }

    /// Block until the most recent replay finishes; surfaces the first
    /// command failure, in chain order, as [`RuntimeError::Device`].
    pub fn synchronize(&self) -> Result<()> {
        self.body.exit.await_completion();
        match first_failure(&self.body) {
            Some(message) => Err(RuntimeError::Device(message)),
            None => Ok(()),
        }
    }

    /// Swap in new node parameters from a structurally identical graph.
    ///
    /// Everything is checked before anything is applied: if the topology
    /// differs or any new parameter fails validation, the plan is left
    /// exactly as it was.
    pub fn update(&mut self, source: &Graph) -> Result<()> {
        structural_match(&self.graph, source)?;
        source.validate(&self.device)?;
        // Join any in-flight replay before touching live payloads.
        self.body.exit.await_completion();
        self.graph.copy_params_from(source)?;
        refresh_body(&mut self.body, &self.graph, &self.device)?;
        self.updates += 1;
        log_info!("runtime::plan", updates = self.updates, "Updated plan");
        Ok(())
    }

    /// How many times the plan took new parameters.
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Queues owned by the plan, beyond the launch queue it borrows.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }
}
