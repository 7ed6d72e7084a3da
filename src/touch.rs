use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Bump the modification time of `path` so watchers notice the dialog
/// closed. Waits until the wall clock has left the file's current mtime
/// second, so the new stamp is always different. Failures are logged and
/// otherwise ignored.
pub fn touch_file(path: &Path) {
    if let Err(err) = try_touch(path) {
        debug!(path = %path.display(), error = %err, "touch file not updated");
    }
}

fn try_touch(path: &Path) -> io::Result<()> {
    let mtime = unix_secs(fs::metadata(path)?.modified()?);
    loop {
        let now = SystemTime::now();
        if unix_secs(now) != mtime {
            let file = File::options().write(true).open(path)?;
            file.set_modified(now)?;
            debug!(path = %path.display(), "touch file updated");
            return Ok(());
        }
        thread::sleep(Duration::from_secs(1));
    }
}
