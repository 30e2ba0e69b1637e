use std::time::Instant;

use chrono::{Timelike, Utc};

/// Per-stage timings of the streaming loop plus a rolling per-second
/// throughput count. Logs once a second when enabled.
pub struct PerformanceProfiler {
    frame_time: Instant,
    capture_time: Instant,
    conversion_time: Instant,
    total_time: Instant,
    last_second: u32,
    last_second_frame_count: u32,
    current_second_frame_count: u32,
    last_second_skipped: u32,
    current_second_skipped: u32,
    bytes_sent: usize,
    last_bitrate: f64, // in kbps
    log_enabled: bool,
}

impl PerformanceProfiler {
    pub fn new(log_enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            frame_time: now,
            capture_time: now,
            conversion_time: now,
            total_time: now,
            last_second: Utc::now().second(),
            last_second_frame_count: 0,
            current_second_frame_count: 0,
            last_second_skipped: 0,
            current_second_skipped: 0,
            bytes_sent: 0,
            last_bitrate: 0.0,
            log_enabled,
        }
    }

    pub fn accept_frame(&mut self) {
        self.frame_time = Instant::now();
    }

    pub fn done_capture(&mut self) {
        self.capture_time = Instant::now();
    }

    pub fn done_conversion(&mut self) {
        self.conversion_time = Instant::now();
    }

    pub fn skipped_frame(&mut self) {
        self.current_second_skipped += 1;
        self.roll_second();
    }

    pub fn done_processing(&mut self, size: usize) {
        self.total_time = Instant::now();
        self.current_second_frame_count += 1;
        self.bytes_sent += size;
        self.roll_second();
    }

    fn roll_second(&mut self) {
        let current_second = Utc::now().second();
        if current_second == self.last_second {
            return;
        }
        self.last_second = current_second;
        self.last_second_frame_count = self.current_second_frame_count;
        self.last_second_skipped = self.current_second_skipped;
        self.last_bitrate = self.bytes_sent as f64 * 8.0 / 1000.0;
        self.current_second_frame_count = 0;
        self.current_second_skipped = 0;
        self.bytes_sent = 0;
        if self.log_enabled {
            self.report();
        }
    }

    fn report(&self) {
        let ms = |from: Instant, to: Instant| to.saturating_duration_since(from).as_secs_f64() * 1000.0;
        info!(
            "Last frame {:.1}ms ({:.1} capture, {:.1} convert, {:.1} send). {} fps, {} skipped, {:.1} kbps",
            ms(self.frame_time, self.total_time),
            ms(self.frame_time, self.capture_time),
            ms(self.capture_time, self.conversion_time),
            ms(self.conversion_time, self.total_time),
            self.last_second_frame_count,
            self.last_second_skipped,
            self.last_bitrate
        );
    }
}
