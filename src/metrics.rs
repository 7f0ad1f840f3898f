//! Resource figures reported in a run summary.

use std::sync::{Mutex, OnceLock};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

const MIB: u64 = 1024 * 1024;

/// Memory of this process and what the host still has free, in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSample {
    pub rss_mb: u64,
    pub available_mb: u64,
}

static SYSTEM: OnceLock<Option<(Pid, Mutex<System>)>> = OnceLock::new();

fn shared_system() -> Option<&'static (Pid, Mutex<System>)> {
    SYSTEM
        .get_or_init(|| {
            let pid = sysinfo::get_current_pid().ok()?;
            Some((pid, Mutex::new(System::new())))
        })
        .as_ref()
}

/// Sample this process. Zeroes when the platform gives no figures.
pub fn sample() -> ResourceSample {
    let Some((pid, sys)) = shared_system() else {
        return ResourceSample::default();
    };
    let Ok(mut sys) = sys.lock() else {
        return ResourceSample::default();
    };
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[*pid]),
        false,
        ProcessRefreshKind::nothing().with_memory(),
    );
    sys.refresh_memory();
    ResourceSample {
        rss_mb: sys.process(*pid).map_or(0, |p| p.memory() / MIB),
        available_mb: sys.available_memory() / MIB,
    }
}

/// Input rows handled per second; 0 for an instant run.
pub fn rows_per_sec(rows: usize, secs: f64) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    (rows as f64 / secs).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_in_mebibytes() {
        let s = sample();
        assert!(s.rss_mb < 1 << 20);
        assert!(s.available_mb < 1 << 30);
    }

    #[test]
    fn throughput_rounds_and_guards_zero_duration() {
        assert_eq!(rows_per_sec(1_000, 0.0), 0);
        assert_eq!(rows_per_sec(1_000, 3.0), 333);
        assert_eq!(rows_per_sec(0, 2.0), 0);
    }
}
