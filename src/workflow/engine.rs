//! Generic graph executor with durable checkpoints and human-in-the-loop
//! suspension.
//!
//! A [`Graph`] is a set of named [`Node`]s joined by [`Edge`]s. A
//! [`Workflow`] runs a graph for one thread at a time: each node sees the
//! current state and returns a partial update, which the state type merges
//! with its own per-field reducer. After every completed node the new state
//! and the next position are written to the [`CheckpointStore`], so a run can
//! suspend, survive a restart, and continue from `resume`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::WorkflowError;
use crate::store::CheckpointStore;
use crate::workflow::checkpoint::{Checkpoint, Interrupt, ResumeValue};

/// State carried through a workflow.
pub trait WorkflowState: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Partial update produced by a node.
    type Update: Send;

    /// Merge `update` into the state. Each field decides whether it is
    /// replaced or appended to.
    fn apply(&mut self, update: Self::Update);
}

/// Identity of a run: which thread is checkpointed and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScope {
    pub thread_id: String,
    pub user_id: String,
}

impl RunScope {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Scope for a nested workflow, checkpointed under `"{thread}/{suffix}"`.
    pub fn child(&self, suffix: &str) -> Self {
        Self {
            thread_id: format!("{}/{}", self.thread_id, suffix),
            user_id: self.user_id.clone(),
        }
    }
}

/// Where control goes after a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn node(name: impl Into<String>) -> Self {
        Self::Node(name.into())
    }
}

/// Result of running one node.
#[derive(Debug)]
pub enum NodeOutcome<U> {
    /// Apply the update and follow the node's outgoing edge.
    Continue(U),
    /// Apply the update and jump to `next`, overriding the edge.
    Goto { update: U, next: Target },
    /// Persist the current state and hand `Interrupt` to the caller. The node
    /// is re-entered from the start with the resume value.
    Suspend(Interrupt),
}

/// A named step in a workflow graph.
#[async_trait]
pub trait Node<S: WorkflowState>: Send + Sync {
    async fn run(
        &self,
        scope: &RunScope,
        state: &S,
        resume: Option<ResumeValue>,
    ) -> Result<NodeOutcome<S::Update>, WorkflowError>;
}

type Router<S> = Arc<dyn Fn(&S) -> Target + Send + Sync>;

/// Outgoing edge of a node.
pub enum Edge<S> {
    Always(Target),
    Conditional(Router<S>),
}

impl<S> Clone for Edge<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Always(target) => Self::Always(target.clone()),
            Self::Conditional(router) => Self::Conditional(Arc::clone(router)),
        }
    }
}

/// A validated workflow graph.
pub struct Graph<S: WorkflowState> {
    name: String,
    entry: String,
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
}

impl<S: WorkflowState> Graph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    fn node(&self, name: &str) -> Result<&Arc<dyn Node<S>>, WorkflowError> {
        self.nodes.get(name).ok_or_else(|| WorkflowError::UnknownNode {
            workflow: self.name.clone(),
            node: name.to_string(),
        })
    }

    fn check_target(&self, target: Target) -> Result<Target, WorkflowError> {
        if let Target::Node(ref name) = target
            && !self.nodes.contains_key(name)
        {
            return Err(WorkflowError::UnknownNode {
                workflow: self.name.clone(),
                node: name.clone(),
            });
        }
        Ok(target)
    }

    fn next_after(&self, node: &str, state: &S) -> Result<Target, WorkflowError> {
        let target = match self.edges.get(node) {
            Some(Edge::Always(target)) => target.clone(),
            Some(Edge::Conditional(router)) => router(state),
            None => Target::End,
        };
        self.check_target(target)
    }
}

/// Builder for [`Graph`].
pub struct GraphBuilder<S: WorkflowState> {
    name: String,
    entry: Option<String>,
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: HashMap<String, Edge<S>>,
    order: Vec<String>,
}

impl<S: WorkflowState> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn node(mut self, name: impl Into<String>, node: impl Node<S> + 'static) -> Self {
        let name = name.into();
        self.order.push(name.clone());
        self.nodes.insert(name, Arc::new(node));
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: Target) -> Self {
        self.edges.insert(from.into(), Edge::Always(to));
        self
    }

    pub fn conditional<F>(mut self, from: impl Into<String>, router: F) -> Self
    where
        F: Fn(&S) -> Target + Send + Sync + 'static,
    {
        self.edges.insert(from.into(), Edge::Conditional(Arc::new(router)));
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Every node needs an outgoing edge and every static edge must point at a
    /// known node. Conditional targets are checked when they are taken.
    pub fn compile(self) -> Result<Graph<S>, WorkflowError> {
        let invalid = |reason: String| WorkflowError::InvalidGraph {
            workflow: self.name.clone(),
            reason,
        };

        let entry = self
            .entry
            .clone()
            .ok_or_else(|| invalid("no entry node".to_string()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(invalid(format!("entry node '{entry}' is not defined")));
        }

        for name in &self.order {
            match self.edges.get(name) {
                None => return Err(invalid(format!("node '{name}' has no outgoing edge"))),
                Some(Edge::Always(Target::Node(to))) if !self.nodes.contains_key(to) => {
                    return Err(invalid(format!("edge '{name}' -> '{to}' targets an unknown node")));
                }
                Some(_) => {}
            }
        }
        for from in self.edges.keys() {
            if !self.nodes.contains_key(from) {
                return Err(invalid(format!("edge from unknown node '{from}'")));
            }
        }

        Ok(Graph {
            name: self.name,
            entry,
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

/// How an `invoke` or `resume` call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<S> {
    /// Reached the terminal marker; the thread is idle again.
    Completed(S),
    /// A node is waiting for a human value.
    Suspended(Interrupt),
}

/// A compiled graph bound to a checkpoint store.
pub struct Workflow<S: WorkflowState> {
    graph: Arc<Graph<S>>,
    store: Arc<dyn CheckpointStore>,
    max_steps: usize,
}

impl<S: WorkflowState> Clone for Workflow<S> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            store: Arc::clone(&self.store),
            max_steps: self.max_steps,
        }
    }
}

impl<S: WorkflowState> Workflow<S> {
    pub fn new(graph: Graph<S>, store: Arc<dyn CheckpointStore>, max_steps: usize) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            max_steps,
        }
    }

    pub fn name(&self) -> &str {
        self.graph.name()
    }

    /// Start a new run on `scope.thread_id` from the entry node with `input`
    /// as the whole initial state.
    pub async fn invoke(&self, scope: &RunScope, input: S) -> Result<RunOutcome<S>, WorkflowError> {
        let checkpoint = match self.store.load(&scope.thread_id).await? {
            Some(existing) => {
                if existing.is_suspended() {
                    warn!(
                        workflow = %self.graph.name,
                        thread = %scope.thread_id,
                        "Starting a new run over a suspended one"
                    );
                }
                existing
            }
            None => Checkpoint::new(serde_json::Value::Null),
        };

        info!(workflow = %self.graph.name, thread = %scope.thread_id, "Workflow invoked");
        let entry = self.graph.entry.clone();
        self.run_from(scope, checkpoint, input, entry, None).await
    }

    /// Continue a suspended run, injecting `value` into the suspended node.
    pub async fn resume(
        &self,
        scope: &RunScope,
        value: ResumeValue,
    ) -> Result<RunOutcome<S>, WorkflowError> {
        let checkpoint = self
            .store
            .load(&scope.thread_id)
            .await?
            .ok_or_else(|| WorkflowError::NoCheckpoint {
                thread_id: scope.thread_id.clone(),
            })?;

        let (Some(position), Some(awaiting)) =
            (checkpoint.position.clone(), checkpoint.awaiting.as_ref())
        else {
            return Err(WorkflowError::NotSuspended {
                thread_id: scope.thread_id.clone(),
            });
        };

        if awaiting.kind != value.kind() {
            return Err(WorkflowError::ResumeTypeMismatch {
                node: position,
                expected: awaiting.kind.to_string(),
                actual: value.kind().to_string(),
            });
        }

        let state = self.decode(&scope.thread_id, &checkpoint.state)?;
        info!(
            workflow = %self.graph.name,
            thread = %scope.thread_id,
            node = %position,
            "Workflow resumed"
        );
        self.run_from(scope, checkpoint, state, position, Some(value)).await
    }

    /// Re-run from the committed position of a run that stopped on a node
    /// failure. The failed node starts over without a resume value.
    pub async fn retry(&self, scope: &RunScope) -> Result<RunOutcome<S>, WorkflowError> {
        let checkpoint = self
            .store
            .load(&scope.thread_id)
            .await?
            .ok_or_else(|| WorkflowError::NoCheckpoint {
                thread_id: scope.thread_id.clone(),
            })?;

        let Some(position) = checkpoint.position.clone().filter(|_| !checkpoint.is_suspended())
        else {
            return Err(WorkflowError::NothingToRetry {
                thread_id: scope.thread_id.clone(),
            });
        };

        let state = self.decode(&scope.thread_id, &checkpoint.state)?;
        info!(
            workflow = %self.graph.name,
            thread = %scope.thread_id,
            node = %position,
            "Retrying interrupted run"
        );
        self.run_from(scope, checkpoint, state, position, None).await
    }

    /// Latest checkpointed state for a thread.
    pub async fn state(&self, thread_id: &str) -> Result<Option<S>, WorkflowError> {
        match self.store.load(thread_id).await? {
            Some(checkpoint) if !checkpoint.state.is_null() => {
                self.decode(thread_id, &checkpoint.state).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Latest raw checkpoint for a thread.
    pub async fn checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>, WorkflowError> {
        Ok(self.store.load(thread_id).await?)
    }

    fn decode(&self, thread_id: &str, value: &serde_json::Value) -> Result<S, WorkflowError> {
        serde_json::from_value(value.clone()).map_err(|e| WorkflowError::StateDecode {
            thread_id: thread_id.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(&self, thread_id: &str, state: &S) -> Result<serde_json::Value, WorkflowError> {
        serde_json::to_value(state).map_err(|e| WorkflowError::StateDecode {
            thread_id: thread_id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn commit(
        &self,
        scope: &RunScope,
        checkpoint: &mut Checkpoint,
        state: &S,
        position: Option<String>,
        awaiting: Option<Interrupt>,
    ) -> Result<(), WorkflowError> {
        checkpoint.advance(self.encode(&scope.thread_id, state)?, position, awaiting);
        self.store.save(&scope.thread_id, checkpoint).await?;
        debug!(
            workflow = %self.graph.name,
            thread = %scope.thread_id,
            step = checkpoint.step,
            position = ?checkpoint.position,
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn run_from(
        &self,
        scope: &RunScope,
        mut checkpoint: Checkpoint,
        mut state: S,
        mut current: String,
        mut resume: Option<ResumeValue>,
    ) -> Result<RunOutcome<S>, WorkflowError> {
        let mut steps = 0usize;

        loop {
            if steps >= self.max_steps {
                warn!(
                    workflow = %self.graph.name,
                    thread = %scope.thread_id,
                    limit = self.max_steps,
                    "Step limit reached"
                );
                return Err(WorkflowError::StepLimitExceeded {
                    workflow: self.graph.name.clone(),
                    limit: self.max_steps,
                });
            }
            steps += 1;

            let node = self.graph.node(&current)?;
            debug!(workflow = %self.graph.name, thread = %scope.thread_id, node = %current, "Running node");

            let next = match node.run(scope, &state, resume.take()).await? {
                NodeOutcome::Suspend(interrupt) => {
                    info!(
                        workflow = %self.graph.name,
                        thread = %scope.thread_id,
                        node = %current,
                        awaiting = %interrupt.kind,
                        "Workflow suspended"
                    );
                    self.commit(scope, &mut checkpoint, &state, Some(current), Some(interrupt.clone()))
                        .await?;
                    return Ok(RunOutcome::Suspended(interrupt));
                }
                NodeOutcome::Continue(update) => {
                    state.apply(update);
                    self.graph.next_after(&current, &state)?
                }
                NodeOutcome::Goto { update, next } => {
                    state.apply(update);
                    self.graph.check_target(next)?
                }
            };

            match next {
                Target::End => {
                    self.commit(scope, &mut checkpoint, &state, None, None).await?;
                    info!(workflow = %self.graph.name, thread = %scope.thread_id, steps, "Workflow completed");
                    return Ok(RunOutcome::Completed(state));
                }
                Target::Node(name) => {
                    self.commit(scope, &mut checkpoint, &state, Some(name.clone()), None)
                        .await?;
                    current = name;
                }
            }
        }
    }
}
