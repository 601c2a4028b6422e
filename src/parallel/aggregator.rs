use crossbeam::queue::SegQueue;

/// Lock-free, unordered collector of loop results.
///
/// Any worker may [`add`](Self::add) concurrently; the controller drains the
/// whole set once after every worker has joined. No ordering is kept across
/// workers, so callers needing order embed a key in the result and sort.
#[derive(Debug)]
pub struct ResultAggregator<R> {
    results: SegQueue<R>,
}

impl<R> Default for ResultAggregator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResultAggregator<R> {
    pub fn new() -> Self {
        Self {
            results: SegQueue::new(),
        }
    }

    #[inline]
    pub fn add(&self, result: R) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Take every collected result
    pub fn drain(self) -> Vec<R> {
        let mut results = Vec::with_capacity(self.results.len());
        while let Some(result) = self.results.pop() {
            results.push(result);
        }
        results
    }
}
