//! End-to-end workflow scenarios on a real Tokio runtime.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

use weft_core::impls::FnEventSink;
use weft_core::{
    CancellationPolicy, Completion, Prerequisites, SubworkflowWork, Task, TaskContext, TaskError,
    TaskErrorKind, TaskId, TaskState, TaskWork, Workflow, WorkflowBuilder, WorkflowError,
    WorkflowEvent,
};

const WAIT: Duration = Duration::from_secs(5);

type Outcome = Result<Value, TaskError>;

/// Work that blocks until the test hands it an outcome, or until cancelled.
struct Gated {
    outcomes: Mutex<mpsc::UnboundedReceiver<Outcome>>,
}

#[async_trait]
impl TaskWork for Gated {
    async fn run(&self, ctx: TaskContext) -> Result<Value, TaskError> {
        let mut outcomes = self.outcomes.lock().await;
        tokio::select! {
            outcome = outcomes.recv() => outcome.unwrap_or_else(|| Err(TaskError::new("gate dropped"))),
            _ = ctx.cancelled() => Err(TaskError::cancelled()),
        }
    }
}

fn gated(name: &str) -> (Task, mpsc::UnboundedSender<Outcome>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let work = Gated {
        outcomes: Mutex::new(rx),
    };
    (Task::new(name, work), tx)
}

fn instant(name: &str, value: Value) -> Task {
    Task::from_fn(name, move |_| {
        let value = value.clone();
        async move { Ok(value) }
    })
}

async fn wait_for_state(workflow: &Workflow, task: TaskId, expected: TaskState) {
    let reached = timeout(WAIT, async {
        loop {
            if workflow.state(task).await.unwrap() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "task never reached {expected}");
}

async fn finished(workflow: &Workflow) -> Completion {
    timeout(WAIT, workflow.wait_until_finished())
        .await
        .expect("workflow did not finish")
}

/// Drain events until the workflow reports completion.
async fn events_until_finished(rx: &mut mpsc::UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("no event in time")
            .expect("event channel closed");
        let done = matches!(event, WorkflowEvent::WorkflowFinished { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

fn transitions_of(events: &[WorkflowEvent], id: TaskId) -> Vec<(TaskState, TaskState)> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::TaskStateChanged { task, old, new, .. } if *task == id => {
                Some((*old, *new))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn sibling_failure_does_not_affect_sibling() {
    let workflow = Workflow::new("diamond");
    let (a, a_gate) = gated("a");
    let (b, b_gate) = gated("b");
    let (c, c_gate) = gated("c");
    let a = workflow.add_task(a, Prerequisites::none()).await.unwrap();
    let b = workflow.add_task(b, [a]).await.unwrap();
    let c = workflow.add_task(c, [a]).await.unwrap();

    workflow.start().await;
    a_gate.send(Ok(json!("a"))).unwrap();
    wait_for_state(&workflow, b, TaskState::Executing).await;
    wait_for_state(&workflow, c, TaskState::Executing).await;

    b_gate.send(Err(TaskError::new("b broke"))).unwrap();
    wait_for_state(&workflow, b, TaskState::Failed).await;
    assert_eq!(workflow.state(c).await.unwrap(), TaskState::Executing);
    assert!(workflow.has_unfinished_tasks().await);

    c_gate.send(Ok(json!("c"))).unwrap();
    assert_eq!(
        finished(&workflow).await,
        Completion::PartiallyFailed {
            failed: 1,
            cancelled: 0
        }
    );
    assert!(workflow.has_failed_tasks().await);
    assert_eq!(
        workflow.error(b).await.unwrap().map(|e| e.message().to_string()),
        Some("b broke".to_string())
    );
}

#[tokio::test]
async fn chain_failure_cancels_downstream_without_starting_it() {
    let workflow = Workflow::new("chain");
    let mut events = workflow.subscribe();
    let (a, a_gate) = gated("a");
    let a = workflow.add_task(a, Prerequisites::none()).await.unwrap();
    let b = workflow.add_task(instant("b", json!(1)), [a]).await.unwrap();
    let c = workflow.add_task(instant("c", json!(2)), [b]).await.unwrap();

    workflow.start().await;
    a_gate.send(Err(TaskError::new("no network"))).unwrap();
    let events = events_until_finished(&mut events).await;

    assert_eq!(workflow.state(b).await.unwrap(), TaskState::Cancelled);
    assert_eq!(workflow.state(c).await.unwrap(), TaskState::Cancelled);
    assert_eq!(transitions_of(&events, b), vec![(TaskState::Pending, TaskState::Cancelled)]);
    assert_eq!(transitions_of(&events, c), vec![(TaskState::Pending, TaskState::Cancelled)]);

    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::TaskFailed { task, error, .. } => Some((*task, error.message().to_string())),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![(a, "no network".to_string())]);
}

#[tokio::test]
async fn external_condition_is_fulfilled_not_started() {
    let workflow = Workflow::new("external");
    let x = workflow
        .add_task(Task::external_condition("photo available"), Prerequisites::none())
        .await
        .unwrap();
    let d = workflow
        .add_task(
            Task::from_fn("upload", |ctx| async move {
                let photo = ctx.prerequisites().any().cloned().unwrap_or(Value::Null);
                Ok(json!({ "uploaded": photo }))
            }),
            [x],
        )
        .await
        .unwrap();

    assert_eq!(
        workflow.start_task(x).await,
        Err(WorkflowError::StartExternalCondition(x))
    );

    workflow.start().await;
    assert_eq!(workflow.state(x).await.unwrap(), TaskState::Ready);
    assert_eq!(workflow.state(d).await.unwrap(), TaskState::Pending);

    workflow.fulfill(x, Ok(json!("photo-1.jpg"))).await.unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);

    let snapshot = workflow.snapshot(x).await.unwrap();
    assert!(snapshot.fulfilled);
    assert!(snapshot.finished_at.is_some());
    assert_eq!(
        workflow.result(d).await.unwrap(),
        Some(json!({ "uploaded": "photo-1.jpg" }))
    );
    assert_eq!(
        workflow.fulfill(x, Ok(Value::Null)).await,
        Err(WorkflowError::NotReady {
            task: x,
            state: TaskState::Finished
        })
    );
}

#[tokio::test]
async fn forward_reference_is_rejected_before_mutation() {
    let workflow = Workflow::new("forward");
    let e = Task::external_condition("e");
    let e_id = e.id();

    let err = workflow.add_task(instant("d", json!(0)), [e_id]).await;

    assert!(matches!(
        err,
        Err(WorkflowError::UnknownPrerequisite { prerequisite, .. }) if prerequisite == e_id
    ));
    assert!(workflow.tasks().await.is_empty());

    // Adding e first makes the same shape valid.
    workflow.add_task(e, Prerequisites::none()).await.unwrap();
    workflow.add_task(instant("d", json!(0)), [e_id]).await.unwrap();
    assert_eq!(workflow.tasks().await.len(), 2);
}

#[tokio::test]
async fn tasks_cannot_be_added_after_start() {
    let workflow = Workflow::new("frozen");
    workflow.start().await;

    let err = workflow
        .add_task(instant("late", json!(0)), Prerequisites::none())
        .await;
    assert_eq!(err, Err(WorkflowError::AlreadyStarted));
}

#[tokio::test]
async fn transitions_are_published_in_order() {
    let workflow = Workflow::new("ordered");
    let mut events = workflow.subscribe();
    let a = workflow
        .add_task(instant("a", json!("done")), Prerequisites::none())
        .await
        .unwrap();

    workflow.start().await;
    let events = events_until_finished(&mut events).await;

    assert_eq!(
        transitions_of(&events, a),
        vec![
            (TaskState::Pending, TaskState::Ready),
            (TaskState::Ready, TaskState::Executing),
            (TaskState::Executing, TaskState::Finished),
        ]
    );
    assert!(matches!(events[1], WorkflowEvent::WorkflowStarted { .. }));
    assert_eq!(workflow.progress(a).await.unwrap(), 1.0);
}

#[tokio::test]
async fn finished_is_published_exactly_once_per_run() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let (a, a_gate) = gated("a");
    let a_id = a.id();

    let workflow = WorkflowBuilder::new("once")
        .sink(Arc::new(FnEventSink::new(move |event: &WorkflowEvent| {
            if matches!(event, WorkflowEvent::WorkflowFinished { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })))
        .task(a, Prerequisites::none())
        .task(instant("b", json!(1)), [a_id])
        .build()
        .await
        .unwrap();

    workflow.start().await;
    a_gate.send(Err(TaskError::new("first try"))).unwrap();
    assert!(!finished(&workflow).await.is_success());

    // Nothing left to run; repeated commands on terminal tasks stay quiet.
    workflow.cancel(a_id).await.unwrap();
    workflow.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // A retried run finishes once more.
    workflow.retry_all().await;
    a_gate.send(Ok(json!("second try"))).unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn retry_does_not_touch_dependents() {
    let workflow = Workflow::new("retry");
    let (a, a_gate) = gated("a");
    let a = workflow.add_task(a, Prerequisites::none()).await.unwrap();
    let b = workflow.add_task(instant("b", json!(1)), [a]).await.unwrap();

    workflow.start().await;
    a_gate.send(Err(TaskError::new("flaky"))).unwrap();
    finished(&workflow).await;

    workflow.retry(a).await.unwrap();
    assert_eq!(workflow.state(a).await.unwrap(), TaskState::Executing);
    assert_eq!(workflow.state(b).await.unwrap(), TaskState::Cancelled);

    a_gate.send(Ok(json!("ok"))).unwrap();
    wait_for_state(&workflow, a, TaskState::Finished).await;
    assert_eq!(workflow.state(b).await.unwrap(), TaskState::Cancelled);

    // Once a has finished, retrying b lets it run.
    workflow.retry(b).await.unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);
}

#[tokio::test]
async fn reset_reruns_task_and_dependents() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let workflow = Workflow::new("reset");
    let a = workflow
        .add_task(
            Task::from_fn("a", move |_| {
                let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(json!(run)) }
            }),
            Prerequisites::none(),
        )
        .await
        .unwrap();
    let (b, b_gate) = gated("b");
    let b = workflow.add_task(b, [a]).await.unwrap();

    workflow.start().await;
    b_gate.send(Ok(json!("b1"))).unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);

    workflow.reset(a).await.unwrap();
    wait_for_state(&workflow, b, TaskState::Executing).await;
    assert_eq!(workflow.result(a).await.unwrap(), Some(json!(2)));
    assert_eq!(workflow.result(b).await.unwrap(), None);

    b_gate.send(Ok(json!("b2"))).unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(workflow.result(b).await.unwrap(), Some(json!("b2")));
}

#[tokio::test]
async fn cancelling_executing_task_signals_its_work() {
    let workflow = Workflow::new("cancel");
    let observed = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&observed);
    let a = workflow
        .add_task(
            Task::from_fn("sleeper", move |ctx| {
                let flag = Arc::clone(&flag);
                async move {
                    ctx.cancelled().await;
                    flag.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("ignored"))
                }
            }),
            Prerequisites::none(),
        )
        .await
        .unwrap();
    let b = workflow.add_task(instant("after", json!(0)), [a]).await.unwrap();

    workflow.start().await;
    wait_for_state(&workflow, a, TaskState::Executing).await;
    workflow.cancel(a).await.unwrap();

    assert_eq!(workflow.state(a).await.unwrap(), TaskState::Cancelled);
    assert_eq!(workflow.state(b).await.unwrap(), TaskState::Cancelled);
    assert_eq!(
        finished(&workflow).await,
        Completion::PartiallyFailed {
            failed: 0,
            cancelled: 2
        }
    );

    // The work saw the token fire; its late result is discarded.
    timeout(WAIT, async {
        while observed.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(workflow.state(a).await.unwrap(), TaskState::Cancelled);
    assert_eq!(workflow.result(a).await.unwrap(), None);
}

#[tokio::test]
async fn panicking_work_fails_the_task() {
    let workflow = Workflow::new("panic");
    let a = workflow
        .add_task(
            Task::from_fn("explodes", |_| async { panic!("kaboom") }),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    workflow.start().await;
    finished(&workflow).await;

    let error = workflow.error(a).await.unwrap().unwrap();
    assert_eq!(error.kind(), TaskErrorKind::Panicked);
    assert!(error.message().contains("kaboom"));
}

#[tokio::test]
async fn progress_is_reported_while_executing() {
    let workflow = Workflow::new("progress");
    let mut events = workflow.subscribe();
    let (gate_tx, gate_rx) = mpsc::unbounded_channel::<()>();
    let gate = Arc::new(Mutex::new(gate_rx));
    let a = workflow
        .add_task(
            Task::from_fn("slow", move |ctx| {
                let gate = Arc::clone(&gate);
                async move {
                    ctx.report_progress(0.5).await;
                    gate.lock().await.recv().await;
                    Ok(Value::Null)
                }
            }),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    workflow.start().await;
    let progressed = timeout(WAIT, async {
        loop {
            if let Some(WorkflowEvent::TaskProgressed { task, progress, .. }) = events.recv().await {
                return (task, progress);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(progressed, (a, 0.5));
    assert_eq!(workflow.progress(a).await.unwrap(), 0.5);

    gate_tx.send(()).unwrap();
    finished(&workflow).await;
    assert_eq!(workflow.progress(a).await.unwrap(), 1.0);
}

#[tokio::test]
async fn keyed_prerequisite_results_are_available() {
    let workflow = Workflow::new("keyed");
    let project = workflow
        .add_task(instant("create project", json!({"project": 7})), Prerequisites::none())
        .await
        .unwrap();
    let photo = workflow
        .add_task(Task::external_condition("photo"), Prerequisites::none())
        .await
        .unwrap();
    let upload = workflow
        .add_task(
            Task::from_fn("upload", |ctx| async move {
                let results = ctx.prerequisites();
                Ok(json!({
                    "project": results.keyed("project").cloned(),
                    "photo": results.keyed("photo").cloned(),
                    "count": results.len(),
                }))
            })
            .with_required_keys(["project", "photo"]),
            Prerequisites::none()
                .keyed("project", project)
                .keyed("photo", photo),
        )
        .await
        .unwrap();

    assert_eq!(workflow.prerequisites(upload).await.unwrap().len(), 2);
    assert_eq!(
        workflow.keyed_prerequisites(upload).await.unwrap(),
        BTreeMap::from([("photo".to_string(), photo), ("project".to_string(), project)])
    );
    assert_eq!(workflow.dependents(project).await.unwrap(), vec![upload]);
    assert_eq!(workflow.root_tasks().await, vec![project, photo]);
    assert_eq!(workflow.leaf_tasks().await, vec![upload]);

    workflow.start().await;
    workflow.fulfill(photo, Ok(json!("cat.png"))).await.unwrap();
    finished(&workflow).await;

    assert_eq!(
        workflow.result(upload).await.unwrap(),
        Some(json!({"project": {"project": 7}, "photo": "cat.png", "count": 2}))
    );
}

#[tokio::test]
async fn exempt_policy_keeps_external_conditions_waiting() {
    let (a, a_gate) = gated("a");
    let a_id = a.id();
    let condition = Task::external_condition("approval");
    let condition_id = condition.id();

    let workflow = WorkflowBuilder::new("exempt")
        .cancellation_policy(CancellationPolicy::ExemptExternalConditions)
        .task(a, Prerequisites::none())
        .task(condition, [a_id])
        .build()
        .await
        .unwrap();

    workflow.start().await;
    a_gate.send(Err(TaskError::new("down"))).unwrap();
    wait_for_state(&workflow, a_id, TaskState::Failed).await;

    assert_eq!(
        workflow.state(condition_id).await.unwrap(),
        TaskState::Pending
    );
    assert!(workflow.has_unfinished_tasks().await);
}

#[tokio::test]
async fn subworkflow_success_finishes_parent() {
    let child = Workflow::new("child");
    let first = child
        .add_task(instant("first", json!(1)), Prerequisites::none())
        .await
        .unwrap();
    child.add_task(instant("second", json!(2)), [first]).await.unwrap();

    let parent = Workflow::new("parent");
    let sub = parent
        .add_task(
            Task::new("run child", SubworkflowWork::new(child.clone())),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    parent.start().await;
    assert_eq!(finished(&parent).await, Completion::Succeeded);

    let result = parent.result(sub).await.unwrap().unwrap();
    assert_eq!(result["workflow"], json!("child"));
    assert!(!child.has_unfinished_tasks().await);
}

#[tokio::test]
async fn subworkflow_failure_fails_parent_with_child_error() {
    let child = Workflow::new("child");
    child
        .add_task(
            Task::from_fn("broken", |_| async { Err(TaskError::new("disk full")) }),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    let parent = Workflow::new("parent");
    let sub = parent
        .add_task(
            Task::new("run child", SubworkflowWork::new(child)),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    parent.start().await;
    finished(&parent).await;

    let error = parent.error(sub).await.unwrap().unwrap();
    assert_eq!(error.kind(), TaskErrorKind::Subworkflow);
    assert!(error.message().contains("broken"));
    assert_eq!(
        std::error::Error::source(&error).map(|s| s.to_string()),
        Some("disk full".to_string())
    );
}

#[tokio::test]
async fn cancelling_subworkflow_task_cancels_child() {
    let child = Workflow::new("child");
    let (slow, _slow_gate) = gated("slow");
    let slow = child.add_task(slow, Prerequisites::none()).await.unwrap();

    let parent = Workflow::new("parent");
    let sub = parent
        .add_task(
            Task::new("run child", SubworkflowWork::new(child.clone())),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    parent.start().await;
    wait_for_state(&child, slow, TaskState::Executing).await;
    parent.cancel(sub).await.unwrap();

    wait_for_state(&child, slow, TaskState::Cancelled).await;
    assert_eq!(parent.state(sub).await.unwrap(), TaskState::Cancelled);
}

fn counting(name: &str, runs: &Arc<AtomicUsize>) -> Task {
    let runs = Arc::clone(runs);
    Task::from_fn(name, move |_| {
        let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok(json!(run)) }
    })
}

#[tokio::test]
async fn reset_all_runs_a_finished_workflow_again() {
    let a_runs = Arc::new(AtomicUsize::new(0));
    let b_runs = Arc::new(AtomicUsize::new(0));
    let workflow = Workflow::new("rerun");
    let a = workflow
        .add_task(counting("a", &a_runs), Prerequisites::none())
        .await
        .unwrap();
    let b = workflow.add_task(counting("b", &b_runs), [a]).await.unwrap();

    workflow.start().await;
    assert_eq!(finished(&workflow).await, Completion::Succeeded);

    let mut events = workflow.subscribe();
    workflow.reset_all().await;
    let events = events_until_finished(&mut events).await;

    assert_eq!(a_runs.load(Ordering::SeqCst), 2);
    assert_eq!(b_runs.load(Ordering::SeqCst), 2);
    assert_eq!(workflow.result(b).await.unwrap(), Some(json!(2)));
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::WorkflowFinished {
            completion: Completion::Succeeded,
            ..
        })
    ));
    assert_eq!(
        transitions_of(&events, a),
        vec![
            (TaskState::Finished, TaskState::Pending),
            (TaskState::Pending, TaskState::Ready),
            (TaskState::Ready, TaskState::Executing),
            (TaskState::Executing, TaskState::Finished),
        ]
    );
}

#[tokio::test]
async fn resetting_fulfilled_condition_waits_for_it_again() {
    let workflow = Workflow::new("refulfill");
    let x = workflow
        .add_task(Task::external_condition("approval"), Prerequisites::none())
        .await
        .unwrap();
    let d = workflow.add_task(instant("ship", json!("shipped")), [x]).await.unwrap();

    workflow.start().await;
    workflow.fulfill(x, Ok(json!("yes"))).await.unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);

    workflow.reset(x).await.unwrap();

    let snapshot = workflow.snapshot(x).await.unwrap();
    assert_eq!(snapshot.state, TaskState::Ready);
    assert!(!snapshot.fulfilled);
    assert_eq!(snapshot.result, None);
    assert_eq!(workflow.state(d).await.unwrap(), TaskState::Pending);
    assert!(workflow.has_unfinished_tasks().await);

    workflow.fulfill(x, Ok(json!("again"))).await.unwrap();
    assert_eq!(finished(&workflow).await, Completion::Succeeded);
    assert!(workflow.snapshot(x).await.unwrap().fulfilled);
}

#[tokio::test]
async fn retried_subworkflow_task_resets_and_reruns_child() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let child = Workflow::new("child");
    let flaky = child
        .add_task(
            Task::from_fn("flaky", move |_| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt == 1 {
                        Err(TaskError::new("first attempt fails"))
                    } else {
                        Ok(json!(attempt))
                    }
                }
            }),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    let parent = Workflow::new("parent");
    let sub = parent
        .add_task(
            Task::new("run child", SubworkflowWork::new(child.clone())),
            Prerequisites::none(),
        )
        .await
        .unwrap();

    parent.start().await;
    finished(&parent).await;
    assert_eq!(parent.state(sub).await.unwrap(), TaskState::Failed);

    parent.retry(sub).await.unwrap();
    assert_eq!(finished(&parent).await, Completion::Succeeded);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(child.state(flaky).await.unwrap(), TaskState::Finished);
    assert_eq!(child.result(flaky).await.unwrap(), Some(json!(2)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subworkflow_task_retried_right_after_cancel_succeeds() {
    for _ in 0..100 {
        let child = Workflow::new("child");
        child
            .add_task(
                Task::from_fn("sleeps", |ctx| async move {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(20)) => Ok(Value::Null),
                        _ = ctx.cancelled() => Err(TaskError::cancelled()),
                    }
                }),
                Prerequisites::none(),
            )
            .await
            .unwrap();

        let parent = Workflow::new("parent");
        let sub = parent
            .add_task(
                Task::new("run child", SubworkflowWork::new(child)),
                Prerequisites::none(),
            )
            .await
            .unwrap();

        parent.start().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        parent.cancel(sub).await.unwrap();
        parent.retry(sub).await.unwrap();

        // The abandoned run must not cancel the child under the new one.
        assert_eq!(finished(&parent).await, Completion::Succeeded);
    }
}
