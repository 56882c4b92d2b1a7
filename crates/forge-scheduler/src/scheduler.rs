//! Per-resource task lanes
//!
//! Every resource owns a FIFO lane driven by its own tokio task, so work on
//! one resource is strictly serialized while different resources progress
//! independently. An operation suspends itself with
//! [`TaskContext::wait_for`]; while suspended it keeps its own lane and
//! nothing else.

use crate::error::SchedulerError;
use crate::graph::WaitGraph;
use crate::state::{validate_transition, TaskState};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Resource identity a lane is keyed by
pub trait Resource: Clone + Eq + Hash + Display + Debug + Send + Sync + 'static {}

impl<T> Resource for T where T: Clone + Eq + Hash + Display + Debug + Send + Sync + 'static {}

/// Scheduler-wide task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

type Job<R> = Box<dyn FnOnce(TaskContext<R>) -> BoxFuture<'static, ()> + Send>;

struct Queued<R> {
    id: TaskId,
    job: Job<R>,
    cancel: watch::Receiver<bool>,
}

struct Lane<R> {
    queue: VecDeque<Queued<R>>,
    active: Option<TaskId>,
    busy: watch::Sender<bool>,
}

struct TaskEntry<R> {
    resource: R,
    state: watch::Sender<TaskState>,
    cancel: watch::Sender<bool>,
}

struct State<R> {
    lanes: HashMap<R, Lane<R>>,
    tasks: HashMap<TaskId, TaskEntry<R>>,
    waits: WaitGraph<R>,
    next_id: u64,
}

impl<R: Resource> State<R> {
    fn transition(&mut self, task: TaskId, to: TaskState) -> Result<(), SchedulerError> {
        let entry = self
            .tasks
            .get(&task)
            .ok_or(SchedulerError::UnknownTask(task))?;
        let from = *entry.state.borrow();
        if let Err(err) = validate_transition(from, to) {
            tracing::error!(%task, %from, %to, "illegal task transition");
            return Err(err);
        }
        entry.state.send_replace(to);
        tracing::trace!(%task, resource = %entry.resource, %from, %to, "task transition");
        Ok(())
    }
}

struct Inner<R> {
    state: Mutex<State<R>>,
    in_flight: watch::Sender<usize>,
}

impl<R: Resource> Inner<R> {
    /// Move a task to a terminal state and forget it
    fn finish(&self, task: TaskId, to: TaskState) {
        let mut st = self.state.lock();
        if st.transition(task, to).is_err() {
            return;
        }
        if let Some(entry) = st.tasks.remove(&task) {
            st.waits.clear(&entry.resource);
        }
        drop(st);
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Cooperative per-resource scheduler
///
/// Cheap to clone; clones share lanes. Must be used from within a tokio runtime.
pub struct Scheduler<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Scheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> Default for Scheduler<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> Debug for Scheduler<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl<R: Resource> Scheduler<R> {
    /// Scheduler with no lanes
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    lanes: HashMap::new(),
                    tasks: HashMap::new(),
                    waits: WaitGraph::new(),
                    next_id: 0,
                }),
                in_flight: watch::Sender::new(0),
            }),
        }
    }

    /// Queue `op` behind every earlier operation on `resource`
    pub fn enqueue<T, F, Fut>(&self, resource: R, op: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext<R>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(TaskState::Queued);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let job: Job<R> = Box::new(move |ctx: TaskContext<R>| {
            Box::pin(async move {
                let result = op(ctx.clone()).await;
                let to = if result.is_ok() {
                    TaskState::Done
                } else {
                    TaskState::Failed
                };
                if let Err(err) = &result {
                    tracing::warn!(task = %ctx.task, resource = %ctx.resource, error = %err, "task failed");
                }
                ctx.inner.finish(ctx.task, to);
                let _ = result_tx.send(result);
            }) as BoxFuture<'static, ()>
        });

        let mut st = self.inner.state.lock();
        let id = TaskId(st.next_id);
        st.next_id += 1;
        st.tasks.insert(
            id,
            TaskEntry {
                resource: resource.clone(),
                state: state_tx,
                cancel: cancel_tx,
            },
        );
        let queued = Queued {
            id,
            job,
            cancel: cancel_rx,
        };
        let spawn = match st.lanes.get_mut(&resource) {
            Some(lane) => {
                lane.queue.push_back(queued);
                false
            }
            None => {
                st.lanes.insert(
                    resource.clone(),
                    Lane {
                        queue: VecDeque::from([queued]),
                        active: None,
                        busy: watch::Sender::new(true),
                    },
                );
                true
            }
        };
        drop(st);
        self.inner.in_flight.send_modify(|n| *n += 1);
        tracing::debug!(task = %id, %resource, "task queued");

        if spawn {
            tokio::spawn(drive(Arc::clone(&self.inner), resource));
        }
        TaskHandle {
            id,
            state: state_rx,
            result: result_rx,
        }
    }

    /// Abandon every queued, suspended or running operation on `resource`
    ///
    /// Queued operations are dropped without running. The active operation
    /// is dropped at its current suspension point. Returns how many tasks
    /// were cancelled.
    pub fn cancel(&self, resource: &R) -> usize {
        let mut st = self.inner.state.lock();
        let Some(lane) = st.lanes.get_mut(resource) else {
            return 0;
        };
        let dropped: Vec<Queued<R>> = lane.queue.drain(..).collect();
        let active = lane.active;

        if let Some(task) = active.and_then(|id| st.tasks.get(&id)) {
            task.cancel.send_replace(true);
        }
        drop(st);

        let count = dropped.len() + usize::from(active.is_some());
        for queued in dropped {
            self.inner.finish(queued.id, TaskState::Cancelled);
        }
        if count > 0 {
            tracing::info!(%resource, count, "cancelled tasks");
        }
        count
    }

    /// Current state of a live task; `None` once it has finished
    #[must_use]
    pub fn state(&self, task: TaskId) -> Option<TaskState> {
        self.inner
            .state
            .lock()
            .tasks
            .get(&task)
            .map(|t| *t.state.borrow())
    }

    /// Does `resource` have queued or active work?
    #[must_use]
    pub fn is_busy(&self, resource: &R) -> bool {
        self.inner.state.lock().lanes.contains_key(resource)
    }

    /// Number of unfinished tasks
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Wait until every task has finished
    pub async fn drain(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

async fn drive<R: Resource>(inner: Arc<Inner<R>>, resource: R) {
    loop {
        let next = {
            let mut st = inner.state.lock();
            let Some(lane) = st.lanes.get_mut(&resource) else {
                return;
            };
            match lane.queue.pop_front() {
                Some(queued) => {
                    lane.active = Some(queued.id);
                    Some(queued)
                }
                None => {
                    lane.active = None;
                    lane.busy.send_replace(false);
                    st.lanes.remove(&resource);
                    None
                }
            }
        };
        let Some(Queued {
            id,
            job,
            mut cancel,
        }) = next
        else {
            tracing::trace!(%resource, "lane drained");
            return;
        };

        if inner.state.lock().transition(id, TaskState::Running).is_err() {
            continue;
        }
        let ctx = TaskContext {
            inner: Arc::clone(&inner),
            task: id,
            resource: resource.clone(),
        };
        tokio::select! {
            () = job(ctx) => {}
            _ = cancel.wait_for(|c| *c) => {
                tracing::debug!(task = %id, %resource, "task dropped on cancel");
                inner.finish(id, TaskState::Cancelled);
            }
        }
        if let Some(lane) = inner.state.lock().lanes.get_mut(&resource) {
            lane.active = None;
        }
    }
}

/// Handle an operation receives from the scheduler
#[derive(Clone)]
pub struct TaskContext<R> {
    inner: Arc<Inner<R>>,
    task: TaskId,
    resource: R,
}

impl<R: Resource> Debug for TaskContext<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl<R: Resource> TaskContext<R> {
    /// This task
    #[inline]
    #[must_use]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// The resource this task is serialized on
    #[inline]
    #[must_use]
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Suspend until `dep` has no queued or active work
    ///
    /// Returns immediately if `dep` is idle. The task is `Waiting` while
    /// suspended and `Running` again afterwards.
    ///
    /// # Errors
    /// Returns [`SchedulerError::DependencyCycle`] without suspending if the
    /// wait would deadlock; the caller is expected to degrade instead.
    pub async fn wait_for(&self, dep: &R) -> Result<(), SchedulerError> {
        let mut busy = {
            let mut st = self.inner.state.lock();
            let Some(lane) = st.lanes.get(dep) else {
                return Ok(());
            };
            let busy = lane.busy.subscribe();
            if let Err(cycle) = st.waits.add(&self.resource, dep) {
                let err = cycle_error(cycle);
                tracing::warn!(task = %self.task, resource = %self.resource, %dep, %err, "refusing wait");
                return Err(err);
            }
            st.transition(self.task, TaskState::Waiting)?;
            busy
        };
        tracing::debug!(task = %self.task, resource = %self.resource, %dep, "waiting on dependency");

        let _ = busy.wait_for(|b| !*b).await;

        let mut st = self.inner.state.lock();
        st.waits.remove(&self.resource, dep);
        st.transition(self.task, TaskState::Running)
    }
}

fn cycle_error<R: Display>(cycle: Vec<R>) -> SchedulerError {
    SchedulerError::DependencyCycle {
        cycle: cycle.iter().map(ToString::to_string).collect(),
    }
}

/// Caller's view of an enqueued operation
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    state: watch::Receiver<TaskState>,
    result: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Task identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Latest known state
    #[must_use]
    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// Wait for the task to reach `state` (or any terminal state)
    pub async fn reached(&mut self, state: TaskState) -> TaskState {
        let _ = self
            .state
            .wait_for(|s| *s == state || s.is_terminal())
            .await;
        *self.state.borrow()
    }

    /// Wait for the operation's result
    ///
    /// # Errors
    /// - [`SchedulerError::TaskFailed`] if the operation returned an error
    /// - [`SchedulerError::Cancelled`] if it was cancelled
    pub async fn join(self) -> Result<T, SchedulerError> {
        match self.result.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(SchedulerError::TaskFailed(err)),
            Err(_) => Err(SchedulerError::Cancelled),
        }
    }
}
