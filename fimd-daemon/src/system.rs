//! Process-level helpers used during daemon startup.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Raise the process nice value by `increment`. Returns the new nice value.
///
/// Linux keeps a nice value per thread, so the new value is written to every
/// thread listed under `/proc/self/task`. Threads created afterwards inherit
/// it from their creator.
#[cfg(target_os = "linux")]
pub fn lower_priority(increment: i32) -> io::Result<i32> {
    let target = current_priority()?.saturating_add(increment).clamp(-20, 19);
    // Repeat until a pass finds nothing to change, so threads spawned by a
    // not-yet-lowered thread during the walk are picked up too.
    loop {
        let mut changed = false;
        for tid in thread_ids()? {
            match thread_priority(tid) {
                Ok(nice) if nice == target => {}
                Ok(_) => match set_thread_priority(tid, target) {
                    Ok(()) => changed = true,
                    Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {}
                    Err(err) => return Err(err),
                },
                // exited mid-walk
                Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {}
                Err(err) => return Err(err),
            }
        }
        if !changed {
            return Ok(target);
        }
    }
}

/// Raise the process nice value by `increment`. Returns the new nice value.
#[cfg(not(target_os = "linux"))]
pub fn lower_priority(increment: i32) -> io::Result<i32> {
    // nice(2) can return -1 on success, so errno is the only reliable signal.
    unsafe {
        *errno_location() = 0;
        let value = libc::nice(increment);
        if value == -1 && *errno_location() != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(value)
    }
}

/// Nice value of the calling thread.
#[cfg(target_os = "linux")]
pub fn current_priority() -> io::Result<i32> {
    thread_priority(0)
}

#[cfg(target_os = "linux")]
fn thread_ids() -> io::Result<Vec<libc::id_t>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir("/proc/self/task")? {
        if let Some(tid) = entry?.file_name().to_str().and_then(|n| n.parse().ok()) {
            ids.push(tid);
        }
    }
    Ok(ids)
}

#[cfg(target_os = "linux")]
fn thread_priority(tid: libc::id_t) -> io::Result<i32> {
    // getpriority(2) can return -1 on success as well.
    unsafe {
        *errno_location() = 0;
        let value = libc::getpriority(libc::PRIO_PROCESS as _, tid);
        if value == -1 && *errno_location() != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(value)
    }
}

#[cfg(target_os = "linux")]
fn set_thread_priority(tid: libc::id_t, nice: i32) -> io::Result<()> {
    if unsafe { libc::setpriority(libc::PRIO_PROCESS as _, tid, nice) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

#[cfg(any(target_os = "openbsd", target_os = "netbsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno()
}

/// Delete everything inside `dir`, keeping (or creating) `dir` itself.
/// Returns how many top-level entries were removed.
pub fn purge_dir_contents(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            return Ok(0);
        }
        Err(err) => return Err(err),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(target_os = "linux")]
    #[test]
    fn lowered_priority_reaches_worker_and_blocking_threads() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime");

        let (lowered, worker, blocking) = runtime.block_on(async {
            let lowered = lower_priority(1).expect("lower priority");
            let worker = tokio::spawn(async { current_priority() })
                .await
                .expect("join worker")
                .expect("worker priority");
            let blocking = tokio::spawn(async {
                tokio::task::spawn_blocking(current_priority).await
            })
            .await
            .expect("join worker")
            .expect("join blocking")
            .expect("blocking priority");
            (lowered, worker, blocking)
        });

        assert_eq!(current_priority().expect("main priority"), lowered);
        assert_eq!(worker, lowered, "worker thread kept its old priority");
        assert_eq!(blocking, lowered, "blocking thread kept its old priority");
    }

    #[test]
    fn purge_removes_files_and_subtrees_but_keeps_the_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let cache = tmp.path().join("local");
        fs::create_dir_all(cache.join("etc/ssh")).expect("mkdir");
        fs::write(cache.join("etc/ssh/sshd_config.gz"), b"x").expect("write");
        fs::write(cache.join("stray"), b"y").expect("write");

        assert_eq!(purge_dir_contents(&cache).expect("purge"), 2);
        assert!(cache.is_dir());
        assert_eq!(fs::read_dir(&cache).expect("read").count(), 0);
    }

    #[test]
    fn purge_creates_a_missing_directory() {
        let tmp = TempDir::new().expect("tempdir");
        let cache = tmp.path().join("diff/local");
        assert_eq!(purge_dir_contents(&cache).expect("purge"), 0);
        assert!(cache.is_dir());
    }
}
