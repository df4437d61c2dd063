use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
    time::{Duration, Instant},
};

/// Per-source self-time accounting. A transform starts the profiler on entry
/// to `copy_pixels`, pauses it around upstream pulls so the predecessor's
/// time is excluded, and stops it on exit.
///
/// Stateful and single-threaded by design; never share one across threads.
#[derive(Clone, Debug)]
pub struct SourceProfiler {
    name: Cow<'static, str>,
    elapsed: Duration,
    running: Option<Instant>,
    calls: u64,
    pixels: u64,
}

impl SourceProfiler {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            elapsed: Duration::ZERO,
            running: None,
            calls: 0,
            pixels: 0,
        }
    }

    pub fn start(&mut self) {
        self.calls += 1;
        self.running = Some(Instant::now());
    }

    pub fn pause(&mut self) {
        if let Some(started) = self.running.take() {
            self.elapsed += started.elapsed();
        }
    }

    pub fn resume(&mut self) {
        self.running = Some(Instant::now());
    }

    pub fn stop(&mut self, pixels: u64) {
        self.pause();
        self.pixels += pixels;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn call_count(&self) -> u64 {
        self.calls
    }

    pub fn pixel_count(&self) -> u64 {
        self.pixels
    }
}

impl Display for SourceProfiler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ms = self.elapsed.as_secs_f64() * 1e3;
        let rate = if ms > 0.0 {
            self.pixels as f64 / ms / 1e3
        } else {
            0.0
        };
        write!(f, "{}: {} calls, {:.2} ms, {:.1} MP/s", self.name, self.calls, ms, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_excludes_upstream_time() {
        let mut profiler = SourceProfiler::new("test");
        profiler.start();
        profiler.pause();
        let settled = profiler.elapsed();
        std::thread::sleep(Duration::from_millis(5));
        profiler.resume();
        profiler.stop(100);

        // The sleep happened while paused, so only the (tiny) running spans count.
        assert!(profiler.elapsed() - settled < Duration::from_millis(5));
        assert_eq!(profiler.call_count(), 1);
        assert_eq!(profiler.pixel_count(), 100);
    }
}
