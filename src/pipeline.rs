//! The Pipeline Executor (spec §4.1): runs a declared sequence of entries —
//! each either a single step or a set of steps to run concurrently — merging
//! outputs into a shared [`PipelineContext`], gating further entries on
//! per-step criticality, and reporting progress as each step finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::effects::chain::VariantSet;
use crate::error::{ErrorKind, StructuredError};
use crate::palette::Palette;
use crate::reporter::{ProgressStatus, Reporter};

/// The typed slice of `ctx.results` a step may produce. Spec §3 describes
/// `results` as `map<step_name, any>`; this crate only ever runs the three
/// concrete step kinds below, so a closed enum stands in for `any` without
/// losing type information at the call site.
#[derive(Debug, Clone)]
pub enum StepValue {
    Palette(Palette),
    Variants(VariantSet),
    Applied(bool),
    Skipped(Arc<str>),
}

/// A step's result (spec §4.1).
pub enum StepOutcome {
    Ok(StepValue),
    Skipped(Arc<str>),
    Failed(StructuredError),
}

/// One runnable unit. `run` is boxed rather than generic so `Entry::Parallel`
/// can hold a heterogeneous set of steps in one `Vec`.
pub struct Step {
    pub name: Arc<str>,
    pub is_critical: bool,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub weight: f64,
    run: Box<dyn Fn() -> StepOutcome + Send + Sync>,
}

impl Step {
    pub fn new(name: impl Into<Arc<str>>, is_critical: bool, run: impl Fn() -> StepOutcome + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            is_critical,
            max_attempts: 1,
            timeout: Duration::from_secs(30),
            weight: 1.0,
            run: Box::new(run),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// One position in the declared entry list (spec §3 glossary "Entry").
pub enum Entry {
    Single(Step),
    Parallel(Vec<Step>),
}

impl Entry {
    fn total_weight(&self) -> f64 {
        match self {
            Entry::Single(step) => step.weight,
            Entry::Parallel(steps) => steps.iter().map(|s| s.weight).sum(),
        }
    }
}

/// Shared mutable record threaded through a single orchestration (spec §3).
///
/// Lives only for the duration of one [`Executor::run`] call. Internals are
/// mutex-guarded so a parallel entry's members can write concurrently; step
/// bodies never see another step's in-flight write, only the context as it
/// stood when their entry began (spec §4.1 "Context merge").
pub struct PipelineContext {
    pub results: Mutex<std::collections::BTreeMap<Arc<str>, StepValue>>,
    pub errors: Arc<Mutex<Vec<StructuredError>>>,
    pub progress_cursor: Mutex<f64>,
    pub scratch_dir: std::path::PathBuf,
    pub reporter: Arc<dyn Reporter>,
    pub cancelled_flag: Arc<AtomicBool>,
}

impl PipelineContext {
    pub fn new(scratch_dir: std::path::PathBuf, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            results: Mutex::new(std::collections::BTreeMap::new()),
            errors: Arc::new(Mutex::new(Vec::new())),
            progress_cursor: Mutex::new(0.0),
            scratch_dir,
            reporter,
            cancelled_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn result(&self, step_name: &str) -> Option<StepValue> {
        self.results.lock().unwrap().get(step_name).cloned()
    }

    pub fn cancel(&self) {
        self.cancelled_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_flag.load(Ordering::SeqCst)
    }
}

/// Terminal state of one [`Entry`] (spec §4.1's entry state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Succeeded,
    SucceededWithWarnings,
    FailedCritically,
    Cancelled,
}

/// What [`Executor::run`] returns: one status per entry attempted, plus
/// whether the whole run was halted before reaching the end of the list.
pub struct ExecutionOutcome {
    pub entry_statuses: Vec<EntryStatus>,
    pub halted: bool,
}

impl ExecutionOutcome {
    /// True iff no entry ended `FailedCritically` or `Cancelled`.
    pub fn is_success(&self) -> bool {
        self.entry_statuses
            .iter()
            .all(|s| matches!(s, EntryStatus::Succeeded | EntryStatus::SucceededWithWarnings))
    }
}

/// Runs a declared entry list against a [`PipelineContext`] (spec §4.1).
pub struct Executor;

impl Executor {
    pub fn run(entries: Vec<Entry>, ctx: &PipelineContext) -> ExecutionOutcome {
        let total_weight: f64 = entries.iter().map(Entry::total_weight).sum::<f64>().max(f64::EPSILON);
        let mut completed_weight = 0.0;
        let mut statuses = Vec::with_capacity(entries.len());

        for entry in entries {
            if ctx.is_cancelled() {
                statuses.push(EntryStatus::Cancelled);
                return ExecutionOutcome { entry_statuses: statuses, halted: true };
            }

            let span = tracing::debug_span!("pipeline_entry");
            let _guard = span.enter();

            let (status, weight_done) = match entry {
                Entry::Single(step) => run_single(&step, ctx),
                Entry::Parallel(steps) => run_parallel(&steps, ctx),
            };
            completed_weight += weight_done;

            let fraction = (completed_weight / total_weight).clamp(0.0, 1.0);
            let progress_status = match status {
                EntryStatus::Succeeded => ProgressStatus::Complete,
                EntryStatus::SucceededWithWarnings => ProgressStatus::Warning,
                EntryStatus::FailedCritically | EntryStatus::Cancelled => ProgressStatus::Warning,
            };
            bump_progress(ctx, fraction);
            ctx.reporter.on_progress("entry", fraction, progress_status);

            let halt = matches!(status, EntryStatus::FailedCritically | EntryStatus::Cancelled);
            statuses.push(status);
            if halt {
                return ExecutionOutcome { entry_statuses: statuses, halted: true };
            }
        }

        ExecutionOutcome { entry_statuses: statuses, halted: false }
    }
}

/// Progress is monotonically non-decreasing (spec §4.1); clamp against the
/// high-water mark rather than trusting caller-supplied fractions.
fn bump_progress(ctx: &PipelineContext, fraction: f64) {
    let mut cursor = ctx.progress_cursor.lock().unwrap();
    if fraction > *cursor {
        *cursor = fraction;
    }
}

fn run_single(step: &Step, ctx: &PipelineContext) -> (EntryStatus, f64) {
    let outcome = execute_with_retry(step, ctx);
    let status = merge_outcome(step, outcome, ctx);
    (status, step.weight)
}

fn run_parallel(steps: &[Step], ctx: &PipelineContext) -> (EntryStatus, f64) {
    let outcomes: Mutex<Vec<(usize, StepOutcome)>> = Mutex::new(Vec::with_capacity(steps.len()));
    rayon::scope(|scope| {
        for (idx, step) in steps.iter().enumerate() {
            let outcomes = &outcomes;
            scope.spawn(move |_| {
                let outcome = execute_with_retry(step, ctx);
                outcomes.lock().unwrap().push((idx, outcome));
            });
        }
    });

    let mut ordered = outcomes.into_inner().unwrap();
    ordered.sort_by_key(|(idx, _)| *idx);

    let mut any_critical_failure = false;
    let mut any_failure = false;
    let total_weight = steps.iter().map(|s| s.weight).sum();

    for (idx, outcome) in ordered {
        let step = &steps[idx];
        if matches!(outcome, StepOutcome::Failed(_)) {
            any_failure = true;
            if step.is_critical {
                any_critical_failure = true;
            }
        }
        merge_outcome(step, outcome, ctx);
    }

    let status = match (any_critical_failure, any_failure) {
        (true, _) => EntryStatus::FailedCritically,
        (false, true) => EntryStatus::SucceededWithWarnings,
        (false, false) => EntryStatus::Succeeded,
    };
    (status, total_weight)
}

/// Writes one step's outcome into `ctx` and returns the resulting entry
/// status *for that single step* (a parallel entry folds several of these).
fn merge_outcome(step: &Step, outcome: StepOutcome, ctx: &PipelineContext) -> EntryStatus {
    match outcome {
        StepOutcome::Ok(value) => {
            ctx.results.lock().unwrap().insert(Arc::clone(&step.name), value);
            EntryStatus::Succeeded
        }
        StepOutcome::Skipped(reason) => {
            tracing::debug!(step = %step.name, %reason, "step skipped");
            ctx.results.lock().unwrap().insert(Arc::clone(&step.name), StepValue::Skipped(reason));
            EntryStatus::Succeeded
        }
        StepOutcome::Failed(error) => {
            ctx.reporter.on_error(&step.name, &error);
            let critical = step.is_critical;
            ctx.errors.lock().unwrap().push(error);
            match critical {
                true => EntryStatus::FailedCritically,
                false => EntryStatus::SucceededWithWarnings,
            }
        }
    }
}

/// Runs `step.run` on a worker thread so a configured timeout can be
/// enforced without the step cooperating beyond polling `cancelled_flag`;
/// retries on `Failed` up to `max_attempts` with exponential backoff (spec
/// §4.1 "Timeout/retry").
fn execute_with_retry(step: &Step, ctx: &PipelineContext) -> StepOutcome {
    let mut last = StepOutcome::Failed(StructuredError::new(Arc::clone(&step.name), ErrorKind::Internal { reason: Arc::from("step never ran") }));

    for attempt in 1..=step.max_attempts {
        if ctx.is_cancelled() {
            return StepOutcome::Failed(StructuredError::new(Arc::clone(&step.name), ErrorKind::Cancelled));
        }

        last = execute_with_timeout(step, ctx);
        if !matches!(last, StepOutcome::Failed(_)) {
            return last;
        }
        if attempt < step.max_attempts {
            let backoff = Duration::from_millis(100u64.saturating_mul(1u64 << (attempt - 1).min(10)));
            std::thread::sleep(backoff);
        }
    }
    last
}

fn execute_with_timeout(step: &Step, ctx: &PipelineContext) -> StepOutcome {
    let (tx, rx) = std::sync::mpsc::channel();
    // `run` is `Send + Sync`; the closure body may block on subprocess I/O
    // or image decode, so it runs off this thread to honor the timeout.
    let run = &step.run;
    let step_name = Arc::clone(&step.name);
    std::thread::scope(|scope| {
        scope.spawn(move || {
            // `Internal` is the only error kind permitted to originate from a
            // panic boundary (spec §7): catch it here so a panicking step
            // body becomes a `Failed` outcome instead of taking the scope
            // (and the whole orchestration thread) down with it.
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(run)).unwrap_or_else(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "step panicked".to_string());
                StepOutcome::Failed(StructuredError::new(step_name, ErrorKind::Internal { reason: Arc::from(reason) }))
            });
            let _ = tx.send(outcome);
        });

        match rx.recv_timeout(step.timeout) {
            Ok(outcome) => outcome,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                ctx.cancel();
                // Grace window: give the step a chance to notice cancellation
                // and return before declaring it `Cancelled`.
                match rx.recv_timeout(Duration::from_millis(250)) {
                    Ok(outcome) => outcome,
                    Err(_) => StepOutcome::Failed(StructuredError::new(Arc::clone(&step.name), ErrorKind::Cancelled)),
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                StepOutcome::Failed(StructuredError::new(Arc::clone(&step.name), ErrorKind::Internal { reason: Arc::from("step thread panicked") }))
            }
        }
    })
}
