use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

/// Progress sink owned by the caller of a loop (a GUI bar, a terminal bar, a
/// headless counter). Values are percentages in `0..=100`.
pub trait ProgressReporter: Send + Sync {
    fn set_value(&self, percent: u32);
    fn value(&self) -> u32;
    fn set_indeterminate(&self, indeterminate: bool);
    fn is_indeterminate(&self) -> bool;
}

/// Write `value` only when it exceeds what the reporter already shows.
/// An absent reporter makes this a no-op.
pub fn set_value_if_larger(reporter: Option<&dyn ProgressReporter>, value: u32) {
    if let Some(reporter) = reporter {
        let value = value.min(100);
        if value > reporter.value() {
            reporter.set_value(value);
        }
    }
}

/// Switch determinate/indeterminate mode, skipping redundant writes
pub fn set_indeterminate(reporter: Option<&dyn ProgressReporter>, indeterminate: bool) {
    if let Some(reporter) = reporter
        && reporter.is_indeterminate() != indeterminate
    {
        reporter.set_indeterminate(indeterminate);
    }
}

/// Timing thresholds for the adaptive reporting cadence
#[derive(Debug, Clone, Copy)]
pub struct CadenceSettings {
    /// Updates arriving faster than this make reporting sparser
    pub fast: Duration,
    /// Updates arriving slower than this make reporting denser
    pub slow: Duration,
}

impl Default for CadenceSettings {
    fn default() -> Self {
        Self {
            fast: Duration::from_millis(500),
            slow: Duration::from_millis(3000),
        }
    }
}

const MAX_MODULO: usize = usize::MAX / 4;

/// Per-worker decision of which checkpoints publish progress.
///
/// Starts by reporting at every checkpoint, then adapts the stride so that
/// updates land between the fast and slow thresholds.
#[derive(Debug)]
pub struct ProgressCadence {
    settings: CadenceSettings,
    modulo: usize,
    countdown: usize,
    last_update: Option<Instant>,
}

impl ProgressCadence {
    pub fn new(settings: CadenceSettings) -> Self {
        Self {
            settings,
            modulo: 1,
            countdown: 0,
            last_update: None,
        }
    }

    /// Count one checkpoint; true when this one should publish progress
    pub fn tick(&mut self) -> bool {
        self.countdown += 1;
        if self.countdown < self.modulo {
            return false;
        }
        self.countdown = 0;
        self.adapt(Instant::now());
        true
    }

    fn adapt(&mut self, now: Instant) {
        if let Some(last) = self.last_update {
            let lag = now.saturating_duration_since(last);
            if lag > self.settings.slow {
                self.modulo = ((self.modulo as f64 * 0.7) as usize).max(1);
            } else if lag < self.settings.fast {
                self.modulo = ((self.modulo as f64 * 1.3) as usize)
                    .max(self.modulo + 1)
                    .min(MAX_MODULO);
            }
        }
        self.last_update = Some(now);
    }

    pub fn modulo(&self) -> usize {
        self.modulo
    }
}

/// Per-invocation bridge from worker checkpoints to the caller's reporter.
///
/// Delivery goes through a try-lock guarding the highest value sent so far:
/// a worker that finds it held simply skips its update, and values reach the
/// reporter in strictly increasing order.
pub struct ProgressBridge {
    reporter: Option<Arc<dyn ProgressReporter>>,
    lo: i64,
    len: u64,
    delivered: Mutex<u32>,
}

impl ProgressBridge {
    pub fn new(reporter: Option<Arc<dyn ProgressReporter>>, lo: i64, len: u64) -> Self {
        Self {
            reporter,
            lo,
            len,
            delivered: Mutex::new(0),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.reporter.is_some()
    }

    /// Mark the start of a run: the reporter leaves indeterminate mode
    pub fn start(&self) {
        set_indeterminate(self.reporter.as_deref(), false);
    }

    /// Publish progress for a worker that just finished `index`
    pub fn report_index(&self, index: i64) {
        if self.reporter.is_none() || self.len == 0 {
            return;
        }
        let offset = index.abs_diff(self.lo) as u128;
        let percent = (offset * 100 / self.len as u128).min(100) as u32;
        self.deliver(percent);
    }

    fn deliver(&self, percent: u32) {
        let Some(reporter) = self.reporter.as_deref() else {
            return;
        };
        let mut delivered = match self.delivered.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        if percent > *delivered {
            set_value_if_larger(Some(reporter), percent);
            *delivered = percent;
        }
    }

    /// Publish 100% after a successful run
    pub fn complete(&self) {
        let Some(reporter) = self.reporter.as_deref() else {
            return;
        };
        let mut delivered = self
            .delivered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set_value_if_larger(Some(reporter), 100);
        *delivered = 100;
    }
}

/// Headless reporter backed by atomics, for batch mode and status polling
#[derive(Debug, Default)]
pub struct AtomicProgress {
    value: AtomicU32,
    indeterminate: AtomicBool,
}

impl AtomicProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for AtomicProgress {
    fn set_value(&self, percent: u32) {
        self.value.store(percent.min(100), Ordering::Relaxed);
    }

    fn value(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    fn set_indeterminate(&self, indeterminate: bool) {
        self.indeterminate.store(indeterminate, Ordering::Relaxed);
    }

    fn is_indeterminate(&self) -> bool {
        self.indeterminate.load(Ordering::Relaxed)
    }
}

/// Terminal progress bar using indicatif
pub struct BarProgress {
    bar: ProgressBar,
    indeterminate: AtomicBool,
}

impl BarProgress {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self::from_bar(ProgressBar::new(100), message)
    }

    /// A bar that never draws (quiet or JSON output)
    pub fn hidden() -> Self {
        Self::from_bar(ProgressBar::hidden(), "")
    }

    fn from_bar(bar: ProgressBar, message: impl Into<Cow<'static, str>>) -> Self {
        bar.set_style(determinate_style());
        bar.set_message(message);
        Self {
            bar,
            indeterminate: AtomicBool::new(false),
        }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

fn determinate_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} [{elapsed_precise}] {spinner}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl ProgressReporter for BarProgress {
    fn set_value(&self, percent: u32) {
        self.bar.set_position(percent.min(100) as u64);
    }

    fn value(&self) -> u32 {
        self.bar.position().min(100) as u32
    }

    fn set_indeterminate(&self, indeterminate: bool) {
        self.indeterminate.store(indeterminate, Ordering::Relaxed);
        if indeterminate {
            self.bar.set_style(spinner_style());
            self.bar.enable_steady_tick(Duration::from_millis(100));
        } else {
            self.bar.disable_steady_tick();
            self.bar.set_style(determinate_style());
        }
    }

    fn is_indeterminate(&self) -> bool {
        self.indeterminate.load(Ordering::Relaxed)
    }
}

/// Maps a full 0..=100 range onto one step's window of a parent reporter,
/// so a multi-step operation can hand each step its own reporter.
pub struct ProgressSubrange {
    parent: Option<Arc<dyn ProgressReporter>>,
    total_steps: u32,
    current_step: AtomicU32,
}

impl ProgressSubrange {
    pub fn new(parent: Option<Arc<dyn ProgressReporter>>, total_steps: u32) -> anyhow::Result<Self> {
        if total_steps == 0 {
            anyhow::bail!("progress subrange needs at least one step");
        }
        let subrange = Self {
            parent,
            total_steps,
            current_step: AtomicU32::new(0),
        };
        subrange.set_value(0);
        Ok(subrange)
    }

    /// Advance to the next step's window; stays on the last step once reached
    pub fn next_step(&self) {
        let last = self.total_steps - 1;
        let _ = self
            .current_step
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |step| Some((step + 1).min(last)));
        self.set_value(0);
    }

    pub fn current_step(&self) -> u32 {
        self.current_step.load(Ordering::Acquire)
    }

    fn window(&self) -> (u32, u32) {
        let step = self.current_step();
        (
            100 * step / self.total_steps,
            100 * (step + 1) / self.total_steps,
        )
    }
}

impl ProgressReporter for ProgressSubrange {
    fn set_value(&self, percent: u32) {
        let (min, max) = self.window();
        set_value_if_larger(self.parent.as_deref(), min + percent.min(100) * (max - min) / 100);
    }

    fn value(&self) -> u32 {
        let Some(parent) = self.parent.as_deref() else {
            return 100;
        };
        let (min, max) = self.window();
        let parent_value = parent.value();
        if max == min {
            return if parent_value >= max { 100 } else { 0 };
        }
        (parent_value.saturating_sub(min) * 100 / (max - min)).min(100)
    }

    fn set_indeterminate(&self, indeterminate: bool) {
        set_indeterminate(self.parent.as_deref(), indeterminate);
    }

    fn is_indeterminate(&self) -> bool {
        self.parent
            .as_deref()
            .is_some_and(|parent| parent.is_indeterminate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every delivered value
    #[derive(Default)]
    struct Recording {
        values: Mutex<Vec<u32>>,
        indeterminate_writes: AtomicU32,
        indeterminate: AtomicBool,
    }

    impl ProgressReporter for Recording {
        fn set_value(&self, percent: u32) {
            self.values.lock().unwrap().push(percent);
        }

        fn value(&self) -> u32 {
            self.values.lock().unwrap().last().copied().unwrap_or(0)
        }

        fn set_indeterminate(&self, indeterminate: bool) {
            self.indeterminate_writes.fetch_add(1, Ordering::Relaxed);
            self.indeterminate.store(indeterminate, Ordering::Relaxed);
        }

        fn is_indeterminate(&self) -> bool {
            self.indeterminate.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn test_set_value_if_larger_skips_smaller_values() {
        let recording = Recording::default();
        set_value_if_larger(Some(&recording), 10);
        set_value_if_larger(Some(&recording), 5);
        set_value_if_larger(Some(&recording), 10);
        set_value_if_larger(Some(&recording), 250);

        assert_eq!(*recording.values.lock().unwrap(), vec![10, 100]);
    }

    #[test]
    fn test_absent_reporter_is_noop() {
        set_value_if_larger(None, 50);
        set_indeterminate(None, true);

        let bridge = ProgressBridge::new(None, 0, 10);
        bridge.start();
        bridge.report_index(5);
        bridge.complete();
        assert!(!bridge.is_attached());
    }

    #[test]
    fn test_set_indeterminate_is_debounced() {
        let recording = Recording::default();
        set_indeterminate(Some(&recording), false);
        set_indeterminate(Some(&recording), true);
        set_indeterminate(Some(&recording), true);

        assert_eq!(recording.indeterminate_writes.load(Ordering::Relaxed), 1);
        assert!(recording.is_indeterminate());
    }

    #[test]
    fn test_bridge_maps_indices_to_percentages() {
        let recording = Arc::new(Recording::default());
        let bridge = ProgressBridge::new(Some(recording.clone()), 100, 200);

        bridge.report_index(150);
        bridge.report_index(120);
        bridge.report_index(299);
        bridge.complete();

        assert_eq!(*recording.values.lock().unwrap(), vec![25, 99, 100]);
    }

    #[test]
    fn test_cadence_grows_when_updates_are_fast() {
        let mut cadence = ProgressCadence::new(CadenceSettings::default());
        assert!(cadence.tick());
        assert!(cadence.tick());
        // Two reports well under the fast threshold widen the stride
        assert!(cadence.modulo() > 1);
        assert!(!cadence.tick());
    }

    #[test]
    fn test_cadence_shrinks_when_updates_are_slow() {
        let settings = CadenceSettings {
            fast: Duration::ZERO,
            slow: Duration::ZERO,
        };
        let mut cadence = ProgressCadence::new(settings);
        cadence.modulo = 10;
        cadence.last_update = Some(Instant::now() - Duration::from_millis(5));
        cadence.countdown = 9;

        assert!(cadence.tick());
        assert_eq!(cadence.modulo(), 7);
    }

    #[test]
    fn test_subrange_maps_steps_onto_parent() {
        let parent = Arc::new(AtomicProgress::new());
        let subrange = ProgressSubrange::new(Some(parent.clone()), 4).unwrap();

        subrange.set_value(50);
        assert_eq!(parent.value(), 12);
        assert_eq!(subrange.value(), 48);

        subrange.next_step();
        assert_eq!(subrange.current_step(), 1);
        assert_eq!(parent.value(), 25);
        subrange.set_value(100);
        assert_eq!(parent.value(), 50);

        for _ in 0..10 {
            subrange.next_step();
        }
        assert_eq!(subrange.current_step(), 3);
        subrange.set_value(100);
        assert_eq!(parent.value(), 100);
    }

    #[test]
    fn test_subrange_without_parent() {
        let subrange = ProgressSubrange::new(None, 2).unwrap();
        subrange.set_value(30);
        subrange.set_indeterminate(true);
        assert_eq!(subrange.value(), 100);
        assert!(!subrange.is_indeterminate());

        assert!(ProgressSubrange::new(None, 0).is_err());
    }

    #[test]
    fn test_hidden_bar_tracks_values() {
        let bar = BarProgress::hidden();
        bar.set_value(42);
        assert_eq!(bar.value(), 42);

        bar.set_indeterminate(true);
        assert!(bar.is_indeterminate());
        bar.set_indeterminate(false);
        bar.finish_and_clear();
    }
}
