//! Local system probes: disk usage, memory usage, process RSS
//!
//! All readings come straight from the kernel (`statvfs`, `/proc`) with no
//! subprocess spawning. A missing process or unreadable mount is reported as
//! `Unavailable` so the classifier can escalate it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{MetricSource, ProbeError};
use crate::types::{MetricKind, MetricSample, Target};

// ============================================================================
// Disk usage
// ============================================================================

/// Filesystem usage probe for one mount/path, in percent used.
pub struct DiskUsageProbe {
    path: PathBuf,
}

impl DiskUsageProbe {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MetricSource for DiskUsageProbe {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError> {
        let pct = disk_usage_percent(&self.path)?;
        Ok(MetricSample::new(&target.id, MetricKind::Disk, pct))
    }
}

/// Percent of filesystem capacity in use, computed the way `df` reports it
/// (used / (used + available to unprivileged users)).
fn disk_usage_percent(path: &Path) -> Result<f64, ProbeError> {
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        return Err(ProbeError::Unavailable(format!(
            "statvfs failed for {}",
            path.display()
        )));
    }

    let stat = unsafe { stat.assume_init() };
    let used = stat.f_blocks.saturating_sub(stat.f_bfree);
    let usable = used + stat.f_bavail;
    if usable == 0 {
        return Err(ProbeError::Unavailable(format!(
            "filesystem at {} reports zero capacity",
            path.display()
        )));
    }
    Ok(used as f64 / usable as f64 * 100.0)
}

// ============================================================================
// Memory usage
// ============================================================================

/// System memory usage probe, in percent of total.
pub struct MemoryUsageProbe;

#[async_trait]
impl MetricSource for MemoryUsageProbe {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError> {
        let pct = memory_usage_percent("/proc/meminfo")?;
        Ok(MetricSample::new(&target.id, MetricKind::Memory, pct))
    }
}

/// Parse MemTotal / MemAvailable from a meminfo-format file.
fn memory_usage_percent(meminfo_path: &str) -> Result<f64, ProbeError> {
    let contents = std::fs::read_to_string(meminfo_path)
        .map_err(|e| ProbeError::Unavailable(format!("cannot read {}: {}", meminfo_path, e)))?;

    let mut total_kb = None;
    let mut available_kb = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_meminfo_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_meminfo_kb(rest);
        }
    }

    match (total_kb, available_kb) {
        (Some(total), Some(available)) if total > 0.0 => {
            Ok((total - available) / total * 100.0)
        }
        _ => Err(ProbeError::Unavailable(format!(
            "{} missing MemTotal/MemAvailable",
            meminfo_path
        ))),
    }
}

fn parse_meminfo_kb(rest: &str) -> Option<f64> {
    rest.trim().trim_end_matches(" kB").trim().parse().ok()
}

// ============================================================================
// Process RSS
// ============================================================================

/// Resident set size probe for a named process, in MB.
///
/// Scans `/proc` for a process whose `comm` matches. Not finding one is an
/// `Unavailable` error; for existence-style checks the target's config maps
/// that to EMERGENCY.
pub struct ProcessRssProbe {
    process_name: String,
    proc_root: PathBuf,
}

impl ProcessRssProbe {
    pub fn new(process_name: String) -> Self {
        Self {
            process_name,
            proc_root: PathBuf::from("/proc"),
        }
    }

    #[cfg(test)]
    fn with_proc_root(process_name: String, proc_root: PathBuf) -> Self {
        Self {
            process_name,
            proc_root,
        }
    }

    fn rss_mb(&self) -> Result<f64, ProbeError> {
        let entries = std::fs::read_dir(&self.proc_root)
            .map_err(|e| ProbeError::Unavailable(format!("cannot read /proc: {}", e)))?;

        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }

            let comm = match std::fs::read_to_string(entry.path().join("comm")) {
                Ok(c) => c,
                Err(_) => continue, // process exited between readdir and read
            };
            // comm is truncated to 15 chars by the kernel
            if comm.trim() != truncate_comm(&self.process_name) {
                continue;
            }

            if let Some(kb) = read_vm_rss_kb(&entry.path().join("status")) {
                return Ok(kb / 1024.0);
            }
        }

        Err(ProbeError::Unavailable(format!(
            "no running process named '{}'",
            self.process_name
        )))
    }
}

fn truncate_comm(name: &str) -> &str {
    if name.len() > 15 {
        &name[..15]
    } else {
        name
    }
}

/// Whether a process with the given comm name is currently running.
///
/// Used by the executor's two-phase restart to decide when a graceful stop
/// has actually taken effect.
pub fn process_exists(name: &str) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str() else { continue };
        if !pid.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) {
            if comm.trim() == truncate_comm(name) {
                return true;
            }
        }
    }
    false
}

fn read_vm_rss_kb(status_path: &Path) -> Option<f64> {
    let contents = std::fs::read_to_string(status_path).ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return parse_meminfo_kb(rest);
        }
    }
    None
}

#[async_trait]
impl MetricSource for ProcessRssProbe {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError> {
        let mb = self.rss_mb()?;
        Ok(MetricSample::new(&target.id, MetricKind::ProcessRss, mb))
    }
}
