use log::debug;
use task_pool::ThreadPool;

#[cfg(feature = "hprof")]
use coarse_prof::profile;

use super::ColumnBuffer;

/// The main thread's column buffer plus a pool of workers, each with its
/// own. Work handed to `run` goes to the pool when the matching parallel
/// switch is on, otherwise it runs on the main buffer at once.
pub struct DrawWorkers {
    pool: ThreadPool<ColumnBuffer>,
    pub columns: ColumnBuffer,
    parallel_sky: bool,
    parallel_spans: bool,
    /// A sky was drawn on the workers since the last reset
    drawsky: bool,
    batch_open: bool,
}

impl DrawWorkers {
    pub fn new(
        threads: usize,
        parallel_sky: bool,
        parallel_spans: bool,
        view_height: usize,
    ) -> std::io::Result<Self> {
        let pool = ThreadPool::new(threads, |_| ColumnBuffer::new(view_height))?;
        debug!(
            "Draw workers: {threads} threads, parallel sky {parallel_sky}, parallel spans {parallel_spans}"
        );
        Ok(Self {
            pool,
            columns: ColumnBuffer::new(view_height),
            parallel_sky,
            parallel_spans,
            drawsky: false,
            batch_open: false,
        })
    }

    pub fn set_parallel(&mut self, sky: bool, spans: bool) {
        self.parallel_sky = sky;
        self.parallel_spans = spans;
    }

    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    /// Every buffer is emptied and sized for the new view
    pub fn resize(&mut self, view_height: usize) {
        self.reset_column_buffer();
        self.columns.resize(view_height);
        self.pool.begin_sema();
        self.pool.for_each(move |buf| buf.resize(view_height));
        let sema = self.pool.end_sema();
        self.pool.notify_sema(&sema);
        self.pool.wait_sema(&sema);
    }

    /// Start a batch, tasks run from here are waited on by `end_batch`
    pub fn begin_batch(&mut self) {
        self.pool.begin_sema();
        self.batch_open = true;
    }

    pub fn end_batch(&mut self) {
        if !self.batch_open {
            return;
        }
        self.batch_open = false;
        let sema = self.pool.end_sema();
        self.pool.notify_sema(&sema);
        self.pool.wait_sema(&sema);
    }

    pub fn run(&mut self, parallel: bool, task: impl FnOnce(&mut ColumnBuffer) + Send + 'static) {
        if parallel {
            self.pool.schedule(task);
        } else {
            task(&mut self.columns);
        }
    }

    /// Sky columns are drawn through column buffers, on the workers when
    /// parallel. Those buffers are flushed by `reset_column_buffer`.
    pub fn run_sky(&mut self, task: impl FnOnce(&mut ColumnBuffer) + Send + 'static) {
        if self.parallel_sky {
            self.drawsky = true;
        }
        self.run(self.parallel_sky, task);
    }

    pub fn run_span(&mut self, task: impl FnOnce(&mut ColumnBuffer) + Send + 'static) {
        self.run(self.parallel_spans, task);
    }

    /// Doom function name `R_ResetColumnBuffer`. Flushes the main buffer,
    /// then every worker's if a sky went to them.
    pub fn reset_column_buffer(&mut self) {
        #[cfg(feature = "hprof")]
        profile!("reset_column_buffer");
        self.columns.reset();
        if self.drawsky {
            self.pool.begin_sema();
            self.pool.for_each(|buf| buf.reset());
            let sema = self.pool.end_sema();
            self.pool.notify_sema(&sema);
            self.pool.wait_sema(&sema);
            self.drawsky = false;
        }
    }

    /// Block until every worker is idle
    pub fn wait_idle(&self) {
        self.pool.wait_idle();
    }
}
