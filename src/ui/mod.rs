//! Progress reporting for concurrent downloads.
//!
//! The engine only sees [`ProgressSink`]; terminal rendering lives in
//! [`ConsoleProgress`], which draws one `indicatif` bar per download.

use std::io::{self, Write};
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::warn;

const BAR_TEMPLATE: &str = "{msg} {wide_bar:.cyan/blue} {bytes}/{total_bytes} {binary_bytes_per_sec} {elapsed_precise} eta {eta}";

/// Identifies one progress entry. Each download task owns exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgressHandle(pub usize);

pub trait ProgressSink: Send + Sync {
    /// Open a new entry. `total` is 0 when the size is unknown.
    fn start(&self, label: &str, total: u64) -> ProgressHandle;
    fn advance(&self, handle: ProgressHandle, bytes: u64);
    fn finish(&self, handle: ProgressHandle, label: &str);
    /// Close an entry whose transfer failed or was cancelled.
    fn abandon(&self, handle: ProgressHandle, label: &str);
}

/// An open progress entry. Dropping it without [`ProgressEntry::finish`]
/// abandons it, so failed and cancelled downloads never leave a live bar behind.
pub struct ProgressEntry<'a> {
    sink: &'a dyn ProgressSink,
    handle: ProgressHandle,
    label: String,
    done: bool,
}

impl<'a> ProgressEntry<'a> {
    pub fn start(sink: &'a dyn ProgressSink, label: String, total: u64) -> Self {
        let handle = sink.start(&label, total);
        Self {
            sink,
            handle,
            label,
            done: false,
        }
    }

    pub fn advance(&self, bytes: u64) {
        self.sink.advance(self.handle, bytes);
    }

    pub fn finish(mut self, label: &str) {
        self.done = true;
        self.sink.finish(self.handle, label);
    }
}

impl Drop for ProgressEntry<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.sink
                .abandon(self.handle, &format!("Failed: {}", self.label));
        }
    }
}

#[derive(Debug, Default)]
pub struct ConsoleProgress {
    multi: MultiProgress,
    bars: Mutex<Vec<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer that prints above the bars instead of through them. Meant as the log target.
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            multi: self.multi.clone(),
        }
    }

    fn bar(&self, handle: ProgressHandle) -> Option<ProgressBar> {
        self.bars
            .lock()
            .ok()
            .and_then(|bars| bars.get(handle.0).cloned())
    }
}

impl ProgressSink for ConsoleProgress {
    fn start(&self, label: &str, total: u64) -> ProgressHandle {
        let bar = self.multi.add(ProgressBar::new(total));
        let style = ProgressStyle::with_template(BAR_TEMPLATE).unwrap_or_else(|err| {
            warn!("progress: bad bar template ({err}); using default style");
            ProgressStyle::default_bar()
        });
        bar.set_style(style.progress_chars("#>-"));
        bar.set_message(label.to_owned());

        let mut bars = match self.bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };
        bars.push(bar);
        ProgressHandle(bars.len() - 1)
    }

    fn advance(&self, handle: ProgressHandle, bytes: u64) {
        if let Some(bar) = self.bar(handle) {
            bar.inc(bytes);
        }
    }

    fn finish(&self, handle: ProgressHandle, label: &str) {
        if let Some(bar) = self.bar(handle) {
            bar.finish_with_message(label.to_owned());
        }
    }

    fn abandon(&self, handle: ProgressHandle, label: &str) {
        if let Some(bar) = self.bar(handle) {
            bar.abandon_with_message(label.to_owned());
        }
    }
}

/// Stderr writer that hides the bars while a line is written.
pub struct LogWriter {
    multi: MultiProgress,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Discards all progress. Used when stderr is not worth drawing to.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn start(&self, _label: &str, _total: u64) -> ProgressHandle {
        ProgressHandle(0)
    }

    fn advance(&self, _handle: ProgressHandle, _bytes: u64) {}

    fn finish(&self, _handle: ProgressHandle, _label: &str) {}

    fn abandon(&self, _handle: ProgressHandle, _label: &str) {}
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Records every call so tests can check progress accounting.
    #[derive(Debug, Default)]
    pub struct RecordingProgress {
        pub entries: Mutex<Vec<RecordedEntry>>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct RecordedEntry {
        pub label: String,
        pub total: u64,
        pub advanced: u64,
        pub finished: Option<String>,
        pub abandoned: Option<String>,
    }

    impl RecordingProgress {
        pub fn snapshot(&self) -> Vec<RecordedEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingProgress {
        fn start(&self, label: &str, total: u64) -> ProgressHandle {
            let mut entries = self.entries.lock().unwrap();
            entries.push(RecordedEntry {
                label: label.to_owned(),
                total,
                ..Default::default()
            });
            ProgressHandle(entries.len() - 1)
        }

        fn advance(&self, handle: ProgressHandle, bytes: u64) {
            self.entries.lock().unwrap()[handle.0].advanced += bytes;
        }

        fn finish(&self, handle: ProgressHandle, label: &str) {
            self.entries.lock().unwrap()[handle.0].finished = Some(label.to_owned());
        }

        fn abandon(&self, handle: ProgressHandle, label: &str) {
            self.entries.lock().unwrap()[handle.0].abandoned = Some(label.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_bars_track_their_own_position() {
        let progress = ConsoleProgress::new();
        progress
            .multi
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());

        let a = progress.start("a", 100);
        let b = progress.start("b", 0);
        assert_ne!(a, b);

        progress.advance(a, 40);
        progress.advance(a, 60);
        progress.advance(b, 5);
        progress.finish(a, "done a");

        assert_eq!(progress.bar(a).unwrap().position(), 100);
        assert!(progress.bar(a).unwrap().is_finished());
        assert_eq!(progress.bar(b).unwrap().position(), 5);
        assert!(progress.bar(ProgressHandle(9)).is_none());
    }

    #[test]
    fn dropped_entry_is_abandoned_and_finished_entry_is_not() {
        let progress = testing::RecordingProgress::default();
        {
            let entry = ProgressEntry::start(&progress, "Downloading osx".into(), 10);
            entry.advance(4);
        }
        ProgressEntry::start(&progress, "Downloading win64".into(), 3).finish("Saved win64");

        let entries = progress.snapshot();
        assert_eq!(entries[0].advanced, 4);
        assert_eq!(entries[0].abandoned.as_deref(), Some("Failed: Downloading osx"));
        assert_eq!(entries[0].finished, None);
        assert_eq!(entries[1].finished.as_deref(), Some("Saved win64"));
        assert_eq!(entries[1].abandoned, None);
    }

    #[test]
    fn console_abandon_stops_the_bar() {
        let progress = ConsoleProgress::new();
        progress
            .multi
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());
        let handle = progress.start("linux64", 100);
        progress.advance(handle, 30);
        progress.abandon(handle, "Failed: linux64");

        let bar = progress.bar(handle).unwrap();
        assert!(bar.is_finished());
        assert_eq!(bar.position(), 30);
    }

    #[test]
    fn log_writer_prints_while_bars_are_live() {
        let progress = ConsoleProgress::new();
        progress
            .multi
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());
        let _handle = progress.start("win64", 10);

        let mut writer = progress.log_writer();
        let line = b"[INFO] fetch: still going\n";
        assert_eq!(writer.write(line).unwrap(), line.len());
        writer.flush().unwrap();
    }
}
