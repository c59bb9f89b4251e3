//! Rate-limited, strictly sequential task scheduler.
//!
//! `Scheduler::run` turns an ordered task list into a lazy stream of `ScheduleEvent`s.
//! Timing rules:
//!  - before every task except the first one of the run: wait `inter_task`
//!    (or `backoff` once, if the previous task hit a transient error)
//!  - between pages of one task: wait `inter_page`
//!  - a transient error retries the same page once after `inter_page`; a second
//!    consecutive failure, or any permanent error, skips the task
//!  - a page that contributes no posts ends the task
//!
//! The stop flag is honoured at page and task boundaries and inside waits.

use crate::fetch::{FetchError, Fetcher, Page};
use crate::record::RawItem;
use crate::task::SearchTask;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inter-request delays. Defaults keep a long unattended run under Reddit's
/// anonymous rate ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayPolicy {
    pub inter_task: Duration,
    pub inter_page: Duration,
    pub backoff: Duration,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            inter_task: Duration::from_secs(180),
            inter_page: Duration::from_secs(2),
            backoff: Duration::from_secs(300),
        }
    }
}

impl DelayPolicy {
    pub fn zero() -> Self {
        Self { inter_task: Duration::ZERO, inter_page: Duration::ZERO, backoff: Duration::ZERO }
    }
}

/// Cooperative cancellation flag shared between the signal handler and the run.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Abstract blocking wait. Returns `false` if the wait was cut short by a stop request.
pub trait Wait {
    fn wait(&self, delay: Duration, stop: &StopFlag) -> bool;
}

impl<W: Wait + ?Sized> Wait for &W {
    fn wait(&self, delay: Duration, stop: &StopFlag) -> bool {
        (**self).wait(delay, stop)
    }
}

/// Real sleep, sliced into `tick`s so a stop request ends long waits promptly.
#[derive(Clone, Copy, Debug)]
pub struct SleepWait {
    pub tick: Duration,
}

impl Default for SleepWait {
    fn default() -> Self {
        Self { tick: Duration::from_millis(250) }
    }
}

impl Wait for SleepWait {
    fn wait(&self, delay: Duration, stop: &StopFlag) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(self.tick.max(Duration::from_millis(1))));
        }
    }
}

/// Returns immediately; still reports a pending stop request.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWait;

impl Wait for NoWait {
    fn wait(&self, _delay: Duration, stop: &StopFlag) -> bool {
        !stop.is_stopped()
    }
}

/// How a task's page sequence ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Results exhausted or limit reached.
    Done,
    /// Abandoned after a permanent error or two consecutive transient errors.
    Skipped(FetchError),
    /// Stop requested mid-task.
    Interrupted,
}

#[derive(Clone, Debug)]
pub enum ScheduleEvent {
    TaskStarted { task: SearchTask, position: usize },
    Page { task: SearchTask, page_no: usize, items: Vec<RawItem> },
    TaskFinished { task: SearchTask, outcome: TaskOutcome, pages: usize, posts: usize },
}

pub struct Scheduler<F, W> {
    fetcher: F,
    waiter: W,
    policy: DelayPolicy,
    stop: StopFlag,
}

impl<F: Fetcher, W: Wait> Scheduler<F, W> {
    pub fn new(fetcher: F, waiter: W, policy: DelayPolicy, stop: StopFlag) -> Self {
        Self { fetcher, waiter, policy, stop }
    }

    /// Consumes the scheduler; a run is not restartable.
    pub fn run(self, tasks: Vec<SearchTask>) -> ScheduleRun<F, W> {
        ScheduleRun {
            sched: self,
            tasks: tasks.into_iter(),
            current: None,
            position: 0,
            started_any: false,
            escalate_next: false,
            finished: false,
        }
    }
}

struct Active {
    task: SearchTask,
    cursor: Option<String>,
    pages: usize,
    posts: usize,
    exhausted: bool,
}

enum Attempt {
    Fetched(Page),
    Failed(FetchError),
    Interrupted,
}

pub struct ScheduleRun<F, W> {
    sched: Scheduler<F, W>,
    tasks: std::vec::IntoIter<SearchTask>,
    current: Option<Active>,
    position: usize,
    started_any: bool,
    escalate_next: bool,
    finished: bool,
}

impl<F: Fetcher, W: Wait> ScheduleRun<F, W> {
    fn finish(&mut self, active: Active, outcome: TaskOutcome) -> ScheduleEvent {
        if outcome == TaskOutcome::Interrupted {
            self.finished = true;
        }
        ScheduleEvent::TaskFinished { task: active.task, outcome, pages: active.pages, posts: active.posts }
    }

    fn start_next_task(&mut self) -> Option<ScheduleEvent> {
        let task = self.tasks.next()?;
        if self.sched.stop.is_stopped() {
            return None;
        }
        if self.started_any {
            let delay = if self.escalate_next { self.sched.policy.backoff } else { self.sched.policy.inter_task };
            self.escalate_next = false;
            if !delay.is_zero() {
                tracing::info!("waiting {}s before next search (rate limit)", delay.as_secs());
            }
            if !self.sched.waiter.wait(delay, &self.sched.stop) {
                return None;
            }
        }
        self.started_any = true;
        self.position += 1;
        self.current = Some(Active {
            exhausted: task.limit == 0,
            task: task.clone(),
            cursor: None,
            pages: 0,
            posts: 0,
        });
        Some(ScheduleEvent::TaskStarted { task, position: self.position })
    }

    fn fetch_with_retry(&mut self, active: &Active) -> Attempt {
        let cursor = active.cursor.as_deref();
        match self.sched.fetcher.fetch_page(&active.task, cursor) {
            Ok(page) => Attempt::Fetched(page),
            Err(FetchError::Transient(msg)) => {
                tracing::warn!("{}: transient error, retrying once: {}", active.task, msg);
                self.escalate_next = true;
                if !self.sched.waiter.wait(self.sched.policy.inter_page, &self.sched.stop) {
                    return Attempt::Interrupted;
                }
                match self.sched.fetcher.fetch_page(&active.task, cursor) {
                    Ok(page) => Attempt::Fetched(page),
                    Err(e) => Attempt::Failed(e),
                }
            }
            Err(e) => Attempt::Failed(e),
        }
    }
}

impl<F: Fetcher, W: Wait> Iterator for ScheduleRun<F, W> {
    type Item = ScheduleEvent;

    fn next(&mut self) -> Option<ScheduleEvent> {
        loop {
            if self.finished {
                return None;
            }
            let Some(mut active) = self.current.take() else {
                let ev = self.start_next_task();
                if ev.is_none() {
                    self.finished = true;
                }
                return ev;
            };

            if active.exhausted {
                return Some(self.finish(active, TaskOutcome::Done));
            }
            if self.sched.stop.is_stopped() {
                return Some(self.finish(active, TaskOutcome::Interrupted));
            }
            if active.pages > 0 && !self.sched.waiter.wait(self.sched.policy.inter_page, &self.sched.stop) {
                return Some(self.finish(active, TaskOutcome::Interrupted));
            }

            let mut page = match self.fetch_with_retry(&active) {
                Attempt::Fetched(page) => page,
                Attempt::Failed(e) => return Some(self.finish(active, TaskOutcome::Skipped(e))),
                Attempt::Interrupted => return Some(self.finish(active, TaskOutcome::Interrupted)),
            };

            // Cap posts at the task limit; comments stay with their post.
            let allowance = active.task.limit - active.posts;
            let mut seen = 0usize;
            page.items.retain(|item| {
                if matches!(item, RawItem::Post(_)) {
                    seen += 1;
                }
                seen <= allowance
            });
            let added = seen.min(allowance);
            active.posts += added;
            active.pages += 1;
            active.cursor = page.next;
            // A page without posts ends the task even if the fetcher offers a cursor.
            active.exhausted = active.cursor.is_none() || added == 0 || active.posts >= active.task.limit;

            let task = active.task.clone();
            let page_no = active.pages;
            self.current = Some(active);
            if page.items.is_empty() {
                continue;
            }
            return Some(ScheduleEvent::Page { task, page_no, items: page.items });
        }
    }
}
