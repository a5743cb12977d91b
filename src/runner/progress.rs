use parking_lot::Mutex;

/// Tasks started across all workers of one warehouse. Only for log output.
#[derive(Debug)]
pub struct Progress {
    started: Mutex<usize>,
    total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            started: Mutex::new(0),
            total,
        }
    }

    /// Counts one more task and returns its position.
    pub fn advance(&self) -> usize {
        let mut started = self.started.lock();
        *started += 1;
        *started
    }

    pub fn current(&self) -> usize {
        *self.started.lock()
    }

    pub fn total(&self) -> usize {
        self.total
    }
}
