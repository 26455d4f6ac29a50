//! The step executor
//!
//! The executor walks a step plan in order, running every step that is ready
//! or failed-but-retryable. A plan is driven by at most one run at a time;
//! progress is published on a watch channel after every status change.
//!
//! Transient step failures downgrade the rest of the plan to per-step manual
//! confirmation and restart the pass from the failed step. Every other
//! failure stops the plan and leaves the error on the step.

pub mod approval;
mod send;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};

use swap_executor_api::{
    gas::SelectedGasInfo,
    orders::LimitOrder,
    steps::{BatchTransferType, StepStatus, StepType},
    tx::SwapInfo,
};
use tokio::{
    sync::{watch, Mutex},
    task::{AbortHandle, JoinHandle},
};
use tracing::{error, info, instrument, warn};

use crate::{
    cli::ExecutorConfig,
    collaborators::{Collaborators, SwapNotification},
    error::{ExecutorError, ExecutorResult, FailureClass},
    gas::{cache::CacheOrigin, GasEngine},
    metrics::{
        record_fallback, record_history, record_step_failed, record_step_started,
        record_step_succeeded,
    },
    orders::cancel_order,
    plan::{plan_steps, StepPlan},
};

// ---------
// | Types |
// ---------

/// How a run of the executor ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The last step was submitted
    Completed,
    /// An approval was submitted and the plan waits for it to settle
    AwaitingSettlement {
        /// The approval step
        step_index: usize,
    },
    /// A step failed and the plan stopped
    Failed {
        /// The failed step
        step_index: usize,
        /// The error left on the step
        message: String,
    },
    /// The user cancelled a step
    Cancelled {
        /// The cancelled step
        step_index: usize,
    },
    /// The session abandoned the plan
    Abandoned,
    /// Another run is already driving the plan
    AlreadyRunning,
}

/// The result of a step that did not fail
#[derive(Debug, Clone)]
pub(crate) enum StepCompletion {
    /// An approval was sent and the plan waits for it to settle
    AwaitingSettlement {
        /// The approval transaction
        tx_id: Option<String>,
    },
    /// An intermediate step completed
    Done {
        /// The transaction the step sent
        tx_id: Option<String>,
    },
    /// The final transaction was broadcast
    Sent {
        /// The final transaction
        tx_id: String,
        /// The fee it was sent with
        gas: Option<SelectedGasInfo>,
        /// The swap details to record
        swap_info: SwapInfo,
    },
    /// The swap was placed as an order
    OrderPlaced {
        /// The order id
        order_id: String,
        /// The swap details to record
        swap_info: SwapInfo,
    },
}

/// The collaborators a step runs against
pub(crate) struct StepContext<'a> {
    /// The collaborators
    pub collaborators: &'a Collaborators,
    /// The executor config
    pub config: &'a ExecutorConfig,
    /// The gas engine, writing to the plan's cache
    pub gas: GasEngine,
}

impl<'a> StepContext<'a> {
    /// Build the context for a plan
    fn new(collaborators: &'a Collaborators, config: &'a ExecutorConfig, plan: &StepPlan) -> Self {
        let gas = GasEngine::new(
            collaborators.gas.clone(),
            plan.pre_swap_data.gas_cache.clone(),
            plan.settings.fee_tier,
            CacheOrigin::Execution,
        );
        Self { collaborators, config, gas }
    }

    /// Deliver a notification, logging failures
    pub async fn notify(&self, notification: SwapNotification) {
        if let Err(e) = self.collaborators.notifications.notify(notification).await {
            warn!(error = %e, "failed to deliver notification");
        }
    }
}

/// Clears the running flag when a run ends or is aborted
struct RunGuard<'a> {
    /// The flag to clear
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// The shared state of an executor
struct ExecutorInner {
    /// The collaborators
    collaborators: Collaborators,
    /// The executor config
    config: ExecutorConfig,
    /// The plan being driven
    plan: Mutex<StepPlan>,
    /// Publishes the plan after every change
    publisher: watch::Sender<StepPlan>,
    /// Whether a run is in flight
    running: AtomicBool,
    /// Whether the session abandoned the plan
    abandoned: AtomicBool,
    /// The task spawned by the last `start`
    task: StdMutex<Option<AbortHandle>>,
}

/// Drives a step plan against its collaborators
///
/// Clones share the same plan
#[derive(Clone)]
pub struct StepExecutor {
    /// The shared state
    inner: Arc<ExecutorInner>,
}

impl StepExecutor {
    /// Constructor
    pub fn new(plan: StepPlan, collaborators: Collaborators, config: ExecutorConfig) -> Self {
        let (publisher, _) = watch::channel(plan.clone());
        let inner = ExecutorInner {
            collaborators,
            config,
            plan: Mutex::new(plan),
            publisher,
            running: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            task: StdMutex::new(None),
        };

        Self { inner: Arc::new(inner) }
    }

    /// Subscribe to plan updates
    pub fn subscribe(&self) -> watch::Receiver<StepPlan> {
        self.inner.publisher.subscribe()
    }

    /// The latest published plan
    pub fn snapshot(&self) -> StepPlan {
        self.inner.publisher.borrow().clone()
    }

    /// Publish the plan to subscribers
    fn publish(&self, plan: &StepPlan) {
        self.inner.publisher.send_replace(plan.clone());
    }

    // -------------
    // | Lifecycle |
    // -------------

    /// Start driving the plan in the background
    ///
    /// Progress is observed through [`StepExecutor::subscribe`]
    pub fn start(&self) -> JoinHandle<RunOutcome> {
        let executor = self.clone();
        let handle = tokio::spawn(async move { executor.run().await });

        let mut task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        *task = Some(handle.abort_handle());
        handle
    }

    /// Drive the plan until it completes, waits, or stops on a failure
    ///
    /// A second call while a run is in flight does nothing
    pub async fn run(&self) -> RunOutcome {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            info!("plan is already running");
            return RunOutcome::AlreadyRunning;
        }
        let _guard = RunGuard { running: &self.inner.running };

        let mut plan = self.inner.plan.lock().await;
        let outcome = self.drive(&mut plan).await;
        info!(plan_id = %plan.plan_id, ?outcome, "run finished");
        outcome
    }

    /// Mark a submitted approval as settled so the next run continues past it
    pub async fn on_approval_settled(&self, tx_id: &str) -> ExecutorResult<()> {
        let mut plan = self.inner.plan.lock().await;
        let step = plan
            .steps
            .iter_mut()
            .find(|s| {
                s.step_type.is_approve()
                    && s.status == StepStatus::Pending
                    && s.tx_hash.as_deref() == Some(tx_id)
            })
            .ok_or_else(|| {
                ExecutorError::invalid_plan(format!("no approval awaiting settlement: {tx_id}"))
            })?;

        step.status = StepStatus::Success;
        record_step_succeeded(step.step_type);
        self.publish(&plan);
        Ok(())
    }

    /// Abandon the plan
    ///
    /// The in-flight run is aborted and any step it left loading is reset to
    /// ready; the plan never runs again
    pub async fn abandon(&self) {
        self.inner.abandoned.store(true, Ordering::SeqCst);
        let task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
        }

        let mut plan = self.inner.plan.lock().await;
        for step in plan.steps.iter_mut().filter(|s| s.status == StepStatus::Loading) {
            step.status = StepStatus::Ready;
        }
        plan.abandoned = true;
        self.publish(&plan);
        info!(plan_id = %plan.plan_id, "abandoned plan");
    }

    /// Cancel a resting order
    ///
    /// The order is signed by the account that placed it, held with the same
    /// signing capability as this session's account
    pub async fn cancel_order(&self, order: &LimitOrder) -> ExecutorResult<()> {
        let kind = self.snapshot().account.kind;
        let collaborators = &self.inner.collaborators;
        cancel_order(collaborators.signer.as_ref(), collaborators.relayer.as_ref(), kind, order)
            .await
    }

    // ----------------
    // | Step Driving |
    // ----------------

    /// Walk the plan, restarting once if a step falls back
    #[instrument(skip_all, fields(plan_id = %plan.plan_id))]
    async fn drive(&self, plan: &mut StepPlan) -> RunOutcome {
        if plan.abandoned || self.inner.abandoned.load(Ordering::SeqCst) {
            return RunOutcome::Abandoned;
        }
        let ctx = StepContext::new(&self.inner.collaborators, &self.inner.config, plan);

        'pass: loop {
            for index in 0..plan.steps.len() {
                let step = &plan.steps[index];
                match step.status {
                    StepStatus::Success => continue,
                    StepStatus::Pending if step.step_type.is_approve() => {
                        return RunOutcome::AwaitingSettlement { step_index: index };
                    },
                    StepStatus::Pending => continue,
                    StepStatus::Failed if !step.can_retry => {
                        let message = step.error_message.clone().unwrap_or_default();
                        return RunOutcome::Failed { step_index: index, message };
                    },
                    _ => {},
                }

                if self.inner.abandoned.load(Ordering::SeqCst) {
                    return RunOutcome::Abandoned;
                }

                let step_type = step.step_type;
                self.begin_step(plan, index);
                let completion = match step_type {
                    StepType::ApproveReset | StepType::Approve => {
                        approval::run_approval_step(&ctx, plan, index).await
                    },
                    StepType::Wrap => send::run_wrap_step(&ctx, plan, index).await,
                    StepType::Send => send::run_send_step(&ctx, plan, index).await,
                    StepType::SignMessage => send::run_sign_message_step(&ctx, plan, index).await,
                    StepType::BatchApproveAndSend => send::run_batch_step(&ctx, plan, index).await,
                };

                match completion {
                    Ok(completion) => {
                        if let Some(outcome) =
                            self.complete_step(&ctx, plan, index, completion).await
                        {
                            return outcome;
                        }
                    },
                    Err(e) => match e.failure_class(step_type) {
                        FailureClass::Fallback if !plan.pre_swap_data.should_fallback => {
                            warn!(step_index = index, error = %e, "step failed, falling back");
                            self.fall_back(plan, index);
                            continue 'pass;
                        },
                        FailureClass::UserCancel => {
                            self.fail_step(plan, index, &e, false /* can_retry */);
                            return RunOutcome::Cancelled { step_index: index };
                        },
                        FailureClass::Fallback | FailureClass::Terminal => {
                            let can_retry = plan.steps[index].can_retry;
                            self.fail_step(plan, index, &e, can_retry);
                            return RunOutcome::Failed { step_index: index, message: e.to_string() };
                        },
                    },
                }
            }

            break;
        }

        if plan.is_complete() {
            RunOutcome::Completed
        } else {
            RunOutcome::AwaitingSettlement { step_index: plan.last_index() }
        }
    }

    /// Mark a step as loading
    fn begin_step(&self, plan: &mut StepPlan, index: usize) {
        let step = &mut plan.steps[index];
        step.status = StepStatus::Loading;
        step.error_message = None;
        record_step_started(step.step_type);
        info!(step_index = index, step_type = step.step_type.as_str(), "running step");
        self.publish(plan);
    }

    /// Mark a step as failed
    fn fail_step(&self, plan: &mut StepPlan, index: usize, e: &ExecutorError, can_retry: bool) {
        let step = &mut plan.steps[index];
        step.status = StepStatus::Failed;
        step.can_retry = can_retry;
        step.error_message = Some(e.to_string());
        record_step_failed(step.step_type);
        error!(step_index = index, step_type = step.step_type.as_str(), error = %e, "step failed");
        self.publish(plan);
    }

    /// Downgrade the rest of the plan to per-step manual confirmation
    ///
    /// A merged approval and swap is split back into its separate steps
    fn fall_back(&self, plan: &mut StepPlan, index: usize) {
        record_fallback(&plan.account.network_id);
        plan.pre_swap_data.should_fallback = true;
        plan.pre_swap_data.batch_transfer_type = BatchTransferType::Normal;

        if plan.steps[index].step_type == StepType::BatchApproveAndSend {
            let steps = plan_steps(&plan.quote, BatchTransferType::Normal);
            plan.steps.splice(index.., steps);
            plan.pre_swap_data.artifacts.retain(|i, _| *i < index);
            plan.pre_swap_data.need_fetch_gas = plan.quote.needs_approval();
        } else {
            let step = &mut plan.steps[index];
            step.status = StepStatus::Ready;
            step.error_message = None;
        }

        self.publish(plan);
    }

    /// Apply a step's completion, returning the outcome if the run stops here
    async fn complete_step(
        &self,
        ctx: &StepContext<'_>,
        plan: &mut StepPlan,
        index: usize,
        completion: StepCompletion,
    ) -> Option<RunOutcome> {
        let step_type = plan.steps[index].step_type;
        let stop = match completion {
            StepCompletion::AwaitingSettlement { tx_id } => {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Pending;
                step.tx_hash = tx_id;
                Some(RunOutcome::AwaitingSettlement { step_index: index })
            },
            StepCompletion::Done { tx_id } => {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Success;
                step.tx_hash = tx_id;
                record_step_succeeded(step_type);
                None
            },
            StepCompletion::Sent { tx_id, gas, swap_info } => {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Success;
                step.tx_hash = Some(tx_id.clone());
                record_step_succeeded(step_type);

                let notification =
                    SwapNotification::SwapSubmitted { tx_id: Some(tx_id.clone()), order_id: None };
                self.finish_swap(ctx, plan, &swap_info, &tx_id, gas.as_ref(), notification).await;
                None
            },
            StepCompletion::OrderPlaced { order_id, swap_info } => {
                let step = &mut plan.steps[index];
                step.status = StepStatus::Pending;
                step.order_id = Some(order_id.clone());
                record_step_succeeded(step_type);

                let notification = SwapNotification::SwapSubmitted {
                    tx_id: None,
                    order_id: Some(order_id.clone()),
                };
                self.finish_swap(ctx, plan, &swap_info, &order_id, None, notification).await;
                None
            },
        };

        self.publish(plan);
        stop
    }

    /// Record the submitted swap in history, once per plan, and notify
    async fn finish_swap(
        &self,
        ctx: &StepContext<'_>,
        plan: &mut StepPlan,
        swap_info: &SwapInfo,
        tx_id: &str,
        gas: Option<&SelectedGasInfo>,
        notification: SwapNotification,
    ) {
        if !plan.pre_swap_data.history_recorded {
            match ctx.collaborators.history.record(swap_info, tx_id, gas).await {
                Ok(()) => {
                    plan.pre_swap_data.history_recorded = true;
                    record_history();
                },
                Err(e) => error!(%tx_id, error = %e, "failed to record swap history"),
            }
        }

        ctx.notify(notification).await;
    }
}
