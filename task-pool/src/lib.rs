//! A fixed set of worker threads fed from the frame thread.
//!
//! Each worker owns a bounded queue and a context object that its tasks
//! borrow mutably while they run. Tasks are handed out round-robin. Only the
//! thread owning the pool schedules; workers only execute.
//!
//! Scheduling does not wake anyone. Work queued between `begin_sema` and
//! `end_sema` is counted on a shared [`Sema`], and the owner releases it with
//! `notify_sema` then blocks with `wait_sema`. With no threads the pool is in
//! immediate mode and every task runs on the caller before `schedule`
//! returns.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

#[cfg(feature = "hprof")]
use coarse_prof::profile;
use log::{debug, warn};

/// Tasks a single worker may have waiting before `schedule` blocks
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

type TaskFn<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

struct Task<C> {
    func: TaskFn<C>,
    sema: Option<Arc<Counter>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outstanding task count that can be blocked on until it reaches zero
#[derive(Default)]
struct Counter {
    count: Mutex<u32>,
    zero: Condvar,
}

impl Counter {
    fn add(&self) {
        *lock(&self.count) += 1;
    }

    fn done(&self) {
        let mut count = lock(&self.count);
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    fn get(&self) -> u32 {
        *lock(&self.count)
    }

    fn wait(&self) {
        let mut count = lock(&self.count);
        while *count != 0 {
            count = self.zero.wait(count).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Handle on a batch of tasks scheduled between `begin_sema` and `end_sema`.
/// An empty batch is already complete.
#[derive(Clone, Default)]
pub struct Sema(Option<Arc<Counter>>);

impl Sema {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Tasks of this batch that have not finished yet
    pub fn pending(&self) -> u32 {
        self.0.as_ref().map_or(0, |c| c.get())
    }
}

struct QueueState<C> {
    tasks: VecDeque<Task<C>>,
    alive: bool,
}

struct WorkQueue<C> {
    state: Mutex<QueueState<C>>,
    ready: Condvar,
    space: Condvar,
    capacity: usize,
}

impl<C> WorkQueue<C> {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::with_capacity(capacity),
                alive: true,
            }),
            ready: Condvar::new(),
            space: Condvar::new(),
            capacity,
        }
    }

    fn push(&self, task: Task<C>) {
        let mut state = lock(&self.state);
        while state.tasks.len() >= self.capacity {
            // The worker may be asleep with a full queue, it has to be woken
            // to make room.
            self.ready.notify_one();
            state = self.space.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.tasks.push_back(task);
    }

    /// Blocks until there is a task, or returns `None` once the queue is
    /// both empty and closed
    fn pop(&self) -> Option<Task<C>> {
        let mut state = lock(&self.state);
        loop {
            if let Some(task) = state.tasks.pop_front() {
                self.space.notify_one();
                return Some(task);
            }
            if !state.alive {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn close(&self) {
        lock(&self.state).alive = false;
        self.ready.notify_all();
    }
}

/// A task that panics still counts as done, and the worker carries on with
/// the rest of its queue.
fn worker_loop<C>(queue: Arc<WorkQueue<C>>, idle: Arc<Counter>, mut context: C) {
    while let Some(task) = queue.pop() {
        let func = task.func;
        if catch_unwind(AssertUnwindSafe(|| func(&mut context))).is_err() {
            warn!(
                "Task panicked on {}",
                thread::current().name().unwrap_or("task pool worker")
            );
        }
        if let Some(sema) = task.sema {
            sema.done();
        }
        idle.done();
    }
}

pub struct ThreadPool<C: Send + 'static> {
    queues: Vec<Arc<WorkQueue<C>>>,
    workers: Vec<JoinHandle<()>>,
    next_queue: usize,
    sema_begun: bool,
    cur_sema: Option<Arc<Counter>>,
    /// Every task scheduled and not yet finished
    idle: Arc<Counter>,
    /// Set in immediate mode only
    inline: Option<C>,
}

impl<C: Send + 'static> ThreadPool<C> {
    /// `threads == 0` gives an immediate mode pool with a single context
    /// that runs tasks on the calling thread. `make_context` is called once
    /// per worker with the worker's index.
    pub fn new(threads: usize, make_context: impl FnMut(usize) -> C) -> std::io::Result<Self> {
        Self::with_capacity(threads, DEFAULT_QUEUE_CAPACITY, make_context)
    }

    pub fn with_capacity(
        threads: usize,
        capacity: usize,
        mut make_context: impl FnMut(usize) -> C,
    ) -> std::io::Result<Self> {
        let mut pool = Self {
            queues: Vec::with_capacity(threads),
            workers: Vec::with_capacity(threads),
            next_queue: 0,
            sema_begun: false,
            cur_sema: None,
            idle: Arc::new(Counter::default()),
            inline: None,
        };

        if threads == 0 {
            debug!("Task pool in immediate mode");
            pool.inline = Some(make_context(0));
            return Ok(pool);
        }

        for i in 0..threads {
            let queue = Arc::new(WorkQueue::new(capacity.max(1)));
            let context = make_context(i);
            let worker_queue = queue.clone();
            let idle = pool.idle.clone();
            let handle = thread::Builder::new()
                .name(format!("render-worker-{i}"))
                .spawn(move || worker_loop(worker_queue, idle, context))?;
            pool.queues.push(queue);
            pool.workers.push(handle);
        }
        debug!("Started {threads} task pool workers, queue capacity {capacity}");
        Ok(pool)
    }

    /// Number of worker threads, zero in immediate mode
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn is_immediate(&self) -> bool {
        self.inline.is_some()
    }

    /// The context used by immediate mode
    pub fn inline_context(&mut self) -> Option<&mut C> {
        self.inline.as_mut()
    }

    fn task_sema(&mut self) -> Option<Arc<Counter>> {
        if !self.sema_begun {
            return None;
        }
        let sema = self.cur_sema.get_or_insert_with(Default::default).clone();
        sema.add();
        Some(sema)
    }

    /// Queue a task on the next worker in turn. The worker is not woken, see
    /// `notify`.
    pub fn schedule(&mut self, func: impl FnOnce(&mut C) + Send + 'static) {
        #[cfg(feature = "hprof")]
        profile!("schedule");
        if let Some(context) = self.inline.as_mut() {
            func(context);
            return;
        }

        let sema = self.task_sema();
        self.idle.add();
        let queue = &self.queues[self.next_queue];
        self.next_queue = (self.next_queue + 1) % self.queues.len();
        queue.push(Task {
            func: Box::new(func),
            sema,
        });
    }

    /// Run `func` once on every worker against that worker's context
    pub fn for_each(&mut self, func: impl Fn(&mut C) + Send + Sync + 'static) {
        if let Some(context) = self.inline.as_mut() {
            func(context);
            return;
        }

        let func = Arc::new(func);
        for i in 0..self.queues.len() {
            let sema = self.task_sema();
            self.idle.add();
            let func = func.clone();
            self.queues[i].push(Task {
                func: Box::new(move |context: &mut C| func(context)),
                sema,
            });
        }
    }

    /// Start counting scheduled tasks in to a new batch
    pub fn begin_sema(&mut self) {
        if self.sema_begun {
            warn!("begin_sema called while a batch is already open");
        }
        self.sema_begun = true;
    }

    /// Close the batch. Nothing scheduled in immediate mode gets counted, so
    /// the batch is empty there.
    pub fn end_sema(&mut self) -> Sema {
        self.sema_begun = false;
        Sema(self.cur_sema.take())
    }

    /// Wake every worker to drain its queue
    pub fn notify(&self) {
        for queue in &self.queues {
            queue.ready.notify_all();
        }
    }

    pub fn notify_sema(&self, sema: &Sema) {
        if !sema.is_empty() {
            self.notify();
        }
    }

    /// Block until every task of the batch has run
    pub fn wait_sema(&self, sema: &Sema) {
        #[cfg(feature = "hprof")]
        profile!("wait_sema");
        if let Some(counter) = &sema.0 {
            self.notify();
            counter.wait();
        }
    }

    /// Block until every queue is empty and every worker is between tasks
    pub fn wait_idle(&self) {
        #[cfg(feature = "hprof")]
        profile!("wait_idle");
        self.notify();
        self.idle.wait();
    }

    /// Run everything still queued then join the workers
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        for queue in &self.queues {
            queue.close();
        }
        for (i, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!("Task pool worker {i} panicked");
            }
        }
        self.queues.clear();
        debug!("Task pool shut down");
    }
}

impl<C: Send + 'static> Drop for ThreadPool<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, mpsc};
    use std::thread;
    use std::time::Duration;

    use super::ThreadPool;

    #[test]
    fn immediate_mode_runs_inline() {
        let mut pool = ThreadPool::new(0, |_| 0u32).unwrap();
        assert!(pool.is_immediate());
        pool.begin_sema();
        for _ in 0..5 {
            pool.schedule(|ctx| *ctx += 1);
        }
        let sema = pool.end_sema();
        assert!(sema.is_empty());
        assert_eq!(*pool.inline_context().unwrap(), 5);

        pool.for_each(|ctx| *ctx *= 2);
        assert_eq!(*pool.inline_context().unwrap(), 10);
    }

    #[test]
    fn sema_waits_for_batch() {
        let mut pool = ThreadPool::new(4, |_| ()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        pool.begin_sema();
        for _ in 0..100 {
            let count = count.clone();
            pool.schedule(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        let sema = pool.end_sema();
        assert!(!sema.is_empty());
        pool.notify_sema(&sema);
        pool.wait_sema(&sema);
        assert_eq!(sema.pending(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn for_each_visits_every_worker_once() {
        let mut pool = ThreadPool::new(4, |i| i).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_task = seen.clone();
        pool.for_each(move |ctx| seen_by_task.lock().unwrap().push(*ctx));
        pool.wait_idle();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn round_robin_spreads_tasks() {
        let mut pool = ThreadPool::new(2, |_| 0usize).unwrap();
        for _ in 0..8 {
            pool.schedule(|ctx| *ctx += 1);
        }
        pool.wait_idle();

        let totals = Arc::new(Mutex::new(Vec::new()));
        let t = totals.clone();
        pool.for_each(move |ctx| t.lock().unwrap().push(*ctx));
        pool.wait_idle();
        assert_eq!(*totals.lock().unwrap(), vec![4, 4]);
    }

    #[test]
    fn full_queue_does_not_stall() {
        let mut pool = ThreadPool::with_capacity(1, 2, |_| ()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let count = count.clone();
            pool.schedule(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_idle();
        assert_eq!(count.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn panicking_task_still_completes_batch() {
        let (tx, rx) = mpsc::channel();
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        thread::spawn(move || {
            let mut pool = ThreadPool::new(2, |_| ()).unwrap();
            pool.begin_sema();
            pool.schedule(|_| panic!("bad column"));
            for _ in 0..4 {
                let counted = counted.clone();
                pool.schedule(move |_| {
                    counted.fetch_add(1, Ordering::SeqCst);
                });
            }
            let sema = pool.end_sema();
            pool.notify_sema(&sema);
            pool.wait_sema(&sema);
            pool.wait_idle();
            tx.send(sema.pending()).unwrap();
        });

        let pending = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("batch with a panicking task never completed");
        assert_eq!(pending, 0);
        // The worker that caught the panic kept running its queue
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn shutdown_drains_pending_work() {
        let mut pool = ThreadPool::new(3, |_| ()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..30 {
            let count = count.clone();
            pool.schedule(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 30);
        assert_eq!(pool.threads(), 0);
    }
}
