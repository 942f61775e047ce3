//! Live-mode directory watcher.
//!
//! An external capture producer rotates window CSVs in a directory and
//! repoints a well-known symlink at the newest one. The watcher polls that
//! symlink and yields each newly resolved file exactly once; the
//! cancellation token is consulted at the top of every poll so a SIGINT is
//! honoured within one interval.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::coordinator::CancelToken;

/// Symlink name the capture producer maintains.
pub const LATEST_CAPTURE_NAME: &str = "latest_capture.csv";
/// Poll interval of the live loop.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a capture directory for successive window files.
pub struct LiveWatcher {
    dir: PathBuf,
    interval: Duration,
    last: Option<PathBuf>,
    warned_missing: bool,
}

impl LiveWatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LiveWatcher {
            dir: dir.into(),
            interval: POLL_INTERVAL,
            last: None,
            warned_missing: false,
        }
    }

    /// Overrides the poll interval (tests).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Blocks until a new capture file appears, returning its resolved
    /// path; `None` once `cancel` fires.
    pub fn next_capture(&mut self, cancel: &CancelToken) -> Option<PathBuf> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(path) = self.poll_once() {
                self.last = Some(path.clone());
                return Some(path);
            }
            thread::sleep(self.interval);
        }
    }

    /// One poll step: reads the symlink and reports a not-yet-analysed
    /// target, if any. Relative targets resolve against the watched
    /// directory. The first missing-symlink occurrence logs a one-shot
    /// waiting message.
    pub fn poll_once(&mut self) -> Option<PathBuf> {
        let link = self.dir.join(LATEST_CAPTURE_NAME);
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(_) => {
                if !self.warned_missing {
                    log::warn!(
                        "waiting for first capture at {} (is the capture tool running?)",
                        link.display()
                    );
                    self.warned_missing = true;
                }
                return None;
            }
        };

        let resolved = if target.is_absolute() {
            target
        } else {
            self.dir.join(target)
        };
        if self.last.as_deref() == Some(resolved.as_path()) {
            return None;
        }
        if !is_readable_file(&resolved) {
            return None;
        }
        Some(resolved)
    }

    /// Remembers a path as analysed without going through a poll.
    pub fn mark_analysed(&mut self, path: PathBuf) {
        self.last = Some(path);
    }
}

fn is_readable_file(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::{LATEST_CAPTURE_NAME, LiveWatcher};
    use crate::coordinator::CancelToken;
    use std::os::unix::fs::symlink;
    use std::time::Duration;

    #[test]
    fn missing_symlink_yields_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut watcher = LiveWatcher::new(dir.path());
        assert_eq!(watcher.poll_once(), None);
        // Second poll stays quiet too; the waiting message is one-shot.
        assert_eq!(watcher.poll_once(), None);
    }

    #[test]
    fn new_target_is_reported_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let capture = dir.path().join("capture_0001.csv");
        std::fs::write(&capture, "Source IP, Destination IP\n").expect("write");
        symlink("capture_0001.csv", dir.path().join(LATEST_CAPTURE_NAME)).expect("symlink");

        let mut watcher = LiveWatcher::new(dir.path());
        let found = watcher.poll_once().expect("capture");
        assert_eq!(found, capture);
        watcher.mark_analysed(found);
        assert_eq!(watcher.poll_once(), None);
    }

    #[test]
    fn retargeted_symlink_triggers_reanalysis() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = dir.path().join(LATEST_CAPTURE_NAME);
        let first = dir.path().join("capture_0001.csv");
        let second = dir.path().join("capture_0002.csv");
        std::fs::write(&first, "x\n").expect("write");
        std::fs::write(&second, "x\n").expect("write");
        symlink("capture_0001.csv", &link).expect("symlink");

        let mut watcher = LiveWatcher::new(dir.path());
        let first_found = watcher.poll_once().expect("first");
        watcher.mark_analysed(first_found);

        std::fs::remove_file(&link).expect("remove");
        symlink("capture_0002.csv", &link).expect("symlink");
        assert_eq!(watcher.poll_once(), Some(second));
    }

    #[test]
    fn dangling_symlink_yields_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        symlink("gone.csv", dir.path().join(LATEST_CAPTURE_NAME)).expect("symlink");
        let mut watcher = LiveWatcher::new(dir.path());
        assert_eq!(watcher.poll_once(), None);
    }

    #[test]
    fn cancellation_wins_over_waiting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut watcher =
            LiveWatcher::new(dir.path()).with_interval(Duration::from_millis(1));
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(watcher.next_capture(&cancel), None);
    }
}
