//! The deferred task queue that lifecycle hooks run on.
//!
//! Tasks run in submission order once the current synchronous work is done, either at an explicit [`Scheduler::flush`]
//! or (in the browser, with [`Checkpoint::Microtask`]) in a microtask queued by the first submission.
//!
//! A task may hand back a future. That future is spawned and not awaited by the queue,
//! so the next task starts right away. Failures of either kind are reported and never stop the queue.
//!
//! Natively, spawned futures are polled by the scheduler itself at each flush, without entering an executor,
//! so flushing (and awaiting [`Scheduler::next_tick`]) works from inside any async context.

use futures::future::LocalBoxFuture;
use std::{
	cell::{Cell, RefCell},
	collections::VecDeque,
	fmt::{self, Debug, Formatter},
	future::Future,
	pin::Pin,
	rc::{Rc, Weak},
	task::{Context, Poll},
};
use tracing::{debug, error, instrument, trace, trace_span};

pub type TaskFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

/// What a deferred task returns: a synchronous failure, or optionally a future to spawn.
pub type TaskOutput = anyhow::Result<Option<TaskFuture>>;

type Task = Box<dyn FnOnce() -> TaskOutput>;

/// When queued tasks run without an explicit [`Scheduler::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Checkpoint {
	/// Only [`Scheduler::flush`] and [`Scheduler::next_tick`] run tasks.
	#[default]
	Manual,
	/// The first task submitted after a drain queues a browser microtask that flushes.
	#[cfg(target_arch = "wasm32")]
	Microtask,
}

#[derive(Clone)]
pub struct Scheduler(Rc<Inner>);

struct Inner {
	checkpoint: Checkpoint,
	queue: RefCell<VecDeque<Queued>>,
	scheduled: Cell<bool>,
	draining: Cell<bool>,
	reporter: RefCell<Option<Rc<dyn Fn(&anyhow::Error)>>>,
	#[cfg(not(target_arch = "wasm32"))]
	spawned: RefCell<futures::stream::FuturesUnordered<LocalBoxFuture<'static, ()>>>,
	/// Futures spawned while `spawned` is being polled.
	#[cfg(not(target_arch = "wasm32"))]
	incoming: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
}

struct Queued {
	label: String,
	task: Task,
}

/// Resets the drain flags even if a task panics.
struct DrainGuard<'a>(&'a Inner);
impl Drop for DrainGuard<'_> {
	fn drop(&mut self) {
		self.0.draining.set(false);
		self.0.scheduled.set(false);
	}
}

impl Scheduler {
	#[must_use]
	pub fn new(checkpoint: Checkpoint) -> Self {
		Self(Rc::new(Inner {
			checkpoint,
			queue: RefCell::default(),
			scheduled: Cell::new(false),
			draining: Cell::new(false),
			reporter: RefCell::new(None),
			#[cfg(not(target_arch = "wasm32"))]
			spawned: RefCell::default(),
			#[cfg(not(target_arch = "wasm32"))]
			incoming: RefCell::default(),
		}))
	}

	#[must_use]
	pub fn checkpoint(&self) -> Checkpoint {
		self.0.checkpoint
	}

	/// Installs an additional diagnostic channel for task failures. Failures are always logged as errors regardless.
	pub fn set_error_reporter(&self, reporter: impl Fn(&anyhow::Error) + 'static) {
		*self.0.reporter.borrow_mut() = Some(Rc::new(reporter));
	}

	/// The number of tasks waiting to run.
	#[must_use]
	pub fn pending(&self) -> usize {
		self.0.queue.borrow().len()
	}

	/// Whether a checkpoint has been requested and not yet reached.
	#[must_use]
	pub fn is_scheduled(&self) -> bool {
		self.0.scheduled.get()
	}

	pub fn schedule(&self, label: impl Into<String>, task: impl FnOnce() -> TaskOutput + 'static) {
		let label = label.into();
		trace!(label = %label, "Scheduling deferred task.");
		self.0.queue.borrow_mut().push_back(Queued { label, task: Box::new(task) });

		if !self.0.scheduled.replace(true) {
			#[cfg(target_arch = "wasm32")]
			if self.0.checkpoint == Checkpoint::Microtask {
				let scheduler = self.clone();
				wasm_bindgen_futures::spawn_local(async move {
					scheduler.flush();
				});
			}
		}
	}

	/// Runs queued tasks until the queue is empty, including any submitted meanwhile.
	///
	/// Returns the number of tasks run. Calling this from within a task returns `0` immediately,
	/// as the outer pass picks up whatever was queued.
	#[instrument(skip(self))]
	pub fn flush(&self) -> usize {
		if self.0.draining.replace(true) {
			trace!("Already draining.");
			return 0;
		}
		let guard = DrainGuard(&self.0);

		let mut ran = 0;
		loop {
			let next = self.0.queue.borrow_mut().pop_front();
			let Some(Queued { label, task }) = next else {
				break;
			};

			let span = trace_span!("Running deferred task", label = %label);
			let _enter = span.enter();
			ran += 1;
			match task() {
				Ok(None) => (),
				Ok(Some(future)) => self.spawn(label, future),
				Err(error) => report(&self.0, &label, &error),
			}
		}
		drop(guard);

		#[cfg(not(target_arch = "wasm32"))]
		self.run_spawned(&mut Context::from_waker(futures::task::noop_waker_ref()));

		if ran > 0 {
			debug!("Ran {} deferred task(s).", ran);
		}
		ran
	}

	/// Resolves once the queue has drained and one more turn has passed.
	///
	/// Natively, spawned futures still pending are polled with the awaiting task's waker in between,
	/// so their wake-ups reach the outer executor.
	pub fn next_tick(&self) -> impl Future<Output = ()> + 'static {
		let scheduler = self.clone();
		async move {
			scheduler.flush();
			YieldNow {
				scheduler: scheduler.clone(),
				yielded: false,
			}
			.await;
			scheduler.flush();
		}
	}

	/// The number of spawned futures that haven't completed yet.
	#[cfg(not(target_arch = "wasm32"))]
	#[must_use]
	pub fn spawned(&self) -> usize {
		self.0.spawned.try_borrow().map_or(0, |spawned| spawned.len()) + self.0.incoming.borrow().len()
	}

	fn spawn(&self, label: String, future: TaskFuture) {
		let inner: Weak<Inner> = Rc::downgrade(&self.0);
		let watched = async move {
			if let Err(error) = future.await {
				match inner.upgrade() {
					Some(inner) => report(&inner, &label, &error),
					None => error!("Deferred task {:?} failed after its scheduler was dropped: {:#}", label, error),
				}
			}
		};

		#[cfg(target_arch = "wasm32")]
		wasm_bindgen_futures::spawn_local(watched);

		#[cfg(not(target_arch = "wasm32"))]
		self.0.incoming.borrow_mut().push(Box::pin(watched));
	}

	/// Polls spawned futures until none can make progress. Re-entrant calls are skipped.
	#[cfg(not(target_arch = "wasm32"))]
	fn run_spawned(&self, cx: &mut Context<'_>) {
		use futures::StreamExt as _;

		let Ok(mut spawned) = self.0.spawned.try_borrow_mut() else {
			return trace!("Spawned futures are already being polled.");
		};
		loop {
			spawned.extend(self.0.incoming.borrow_mut().drain(..));
			let mut completed = 0;
			while let Poll::Ready(Some(())) = spawned.poll_next_unpin(cx) {
				completed += 1;
			}
			if completed > 0 {
				trace!("{} spawned future(s) completed. {} pending.", completed, spawned.len());
			}
			if self.0.incoming.borrow().is_empty() {
				break;
			}
		}
	}
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new(Checkpoint::default())
	}
}

impl Debug for Scheduler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("checkpoint", &self.0.checkpoint)
			.field("pending", &self.pending())
			.field("scheduled", &self.0.scheduled.get())
			.field("draining", &self.0.draining.get())
			.finish_non_exhaustive()
	}
}

fn report(inner: &Inner, label: &str, error: &anyhow::Error) {
	error!("Deferred task {:?} failed: {:#}", label, error);
	let reporter = inner.reporter.borrow().clone();
	if let Some(reporter) = reporter {
		reporter(error);
	}
}

/// Pending exactly once.
struct YieldNow {
	#[cfg_attr(target_arch = "wasm32", allow(dead_code))]
	scheduler: Scheduler,
	yielded: bool,
}
impl Future for YieldNow {
	type Output = ();

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		if self.yielded {
			return Poll::Ready(());
		}
		self.yielded = true;
		#[cfg(not(target_arch = "wasm32"))]
		self.scheduler.run_spawned(cx);
		cx.waker().wake_by_ref();
		Poll::Pending
	}
}

#[cfg(test)]
mod tests {
	use super::{Checkpoint, Scheduler, TaskFuture};
	use futures::channel::oneshot;
	use std::{cell::RefCell, rc::Rc};

	#[test]
	fn fifo_with_reentrant_submissions() {
		let scheduler = Scheduler::new(Checkpoint::Manual);
		let log = Rc::new(RefCell::new(Vec::new()));

		for i in 0..3 {
			let log = Rc::clone(&log);
			let inner = scheduler.clone();
			scheduler.schedule("outer", move || {
				log.borrow_mut().push(i);
				if i == 0 {
					let log = Rc::clone(&log);
					inner.schedule("inner", move || {
						log.borrow_mut().push(10);
						Ok(None)
					});
					assert_eq!(inner.flush(), 0);
				}
				Ok(None)
			});
		}
		assert!(scheduler.is_scheduled());
		assert!(log.borrow().is_empty());

		assert_eq!(scheduler.flush(), 4);
		assert_eq!(*log.borrow(), [0, 1, 2, 10]);
		assert!(!scheduler.is_scheduled());
		assert_eq!(scheduler.pending(), 0);
	}

	#[test]
	fn failures_are_isolated_and_reported() {
		let scheduler = Scheduler::default();
		let reported = Rc::new(RefCell::new(Vec::new()));
		scheduler.set_error_reporter({
			let reported = Rc::clone(&reported);
			move |error| reported.borrow_mut().push(error.to_string())
		});

		let ran = Rc::new(RefCell::new(false));
		scheduler.schedule("sync failure", || Err(anyhow::anyhow!("sync")));
		scheduler.schedule("async failure", || Ok(Some(Box::pin(async { Err::<(), _>(anyhow::anyhow!("async")) }))));
		scheduler.schedule("fine", {
			let ran = Rc::clone(&ran);
			move || {
				*ran.borrow_mut() = true;
				Ok(None)
			}
		});

		scheduler.flush();
		assert!(*ran.borrow());
		assert_eq!(*reported.borrow(), ["sync", "async"]);
	}

	#[test]
	fn next_tick_drains() {
		let scheduler = Scheduler::default();
		let ran = Rc::new(RefCell::new(0));
		{
			let ran = Rc::clone(&ran);
			scheduler.schedule("count", move || {
				*ran.borrow_mut() += 1;
				Ok(None)
			});
		}
		futures::executor::block_on(scheduler.next_tick());
		assert_eq!(*ran.borrow(), 1);
	}

	#[test]
	fn flushing_inside_an_executor() {
		let scheduler = Scheduler::default();
		let done = Rc::new(RefCell::new(false));
		{
			let done = Rc::clone(&done);
			scheduler.schedule("async", move || {
				Ok(Some(Box::pin(async move {
					futures::future::ready(()).await;
					*done.borrow_mut() = true;
					Ok::<(), anyhow::Error>(())
				}) as TaskFuture))
			});
		}
		assert_eq!(futures::executor::block_on(async { scheduler.flush() }), 1);
		assert!(*done.borrow());
		assert_eq!(scheduler.spawned(), 0);
	}

	#[test]
	fn woken_futures_resume_at_the_next_flush() {
		let scheduler = Scheduler::default();
		let (sender, receiver) = oneshot::channel::<&str>();
		let received = Rc::new(RefCell::new(None));
		{
			let received = Rc::clone(&received);
			scheduler.schedule("wait", move || {
				Ok(Some(Box::pin(async move {
					*received.borrow_mut() = Some(receiver.await?);
					Ok::<(), anyhow::Error>(())
				}) as TaskFuture))
			});
		}
		scheduler.flush();
		assert_eq!(scheduler.spawned(), 1);
		assert!(received.borrow().is_none());

		sender.send("value").unwrap();
		futures::executor::block_on(scheduler.next_tick());
		assert_eq!(*received.borrow(), Some("value"));
		assert_eq!(scheduler.spawned(), 0);
	}
}
