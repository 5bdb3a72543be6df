//! Bundled pass engine writing patterns through the regular file API.

use super::pattern::{self, Pattern};
use super::{BusyLock, CancelFlag, FillReport, PassEngine, Progress};
use crate::config::{EngineConfig, PassPolicy, FILLER_PREFIX};
use crate::error::{Error, Result};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Attempts at finding an unused filler name.
const FILLER_NAME_ATTEMPTS: usize = 16;

/// Length of the random part of a filler name.
const FILLER_NAME_LEN: usize = 12;

/// Overwrites files in place and fills free space with filler files.
#[derive(Debug, Default)]
pub struct OverwriteEngine {
    config: EngineConfig,
    busy: BusyLock,
}

impl OverwriteEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            busy: BusyLock::new(),
        }
    }

    /// Overwrite `path` with every pass, then truncate and unlink it.
    ///
    /// A cancel request stops after the current pass; the file is still
    /// truncated and unlinked before [`Error::Interrupted`] is returned.
    fn shred(
        &self,
        path: &Path,
        extent: u64,
        policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<()> {
        let logical_len = fs::metadata(path)?.len();
        let mut file = OpenOptions::new().write(true).open(path)?;

        let outcome = self.overwrite_passes(&mut file, logical_len, extent, policy, progress, cancel);
        if matches!(&outcome, Err(e) if !e.is_interrupted()) {
            return outcome;
        }

        file.set_len(0)?;
        if !policy.fast_mode {
            file.sync_all()?;
        }
        drop(file);
        unlink_obscured(path)?;

        outcome
    }

    fn overwrite_passes(
        &self,
        file: &mut File,
        logical_len: u64,
        extent: u64,
        policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<()> {
        let passes = pattern::schedule(policy);
        let total = passes.len() as u32;
        let mut rng = pattern::rng(policy.fast_mode);
        let buf_len = self.config.chunk_size.min(extent as usize).max(1);
        let mut buf = vec![0u8; buf_len];

        for (index, pass) in passes.iter().enumerate() {
            if index > 0 && cancel.is_canceled() {
                info!("Cancel requested, stopping after pass {} of {}", index, total);
                return Err(Error::Interrupted);
            }

            let pass_no = index as u32 + 1;
            progress(Progress::PassStarted {
                pass: pass_no,
                total,
            });
            debug!("Pass {}/{} ({:?})", pass_no, total, pass);

            write_pass(file, logical_len, extent, *pass, rng.as_mut(), &mut buf, &|done| {
                let within = if extent == 0 {
                    1.0
                } else {
                    done as f64 / extent as f64
                };
                progress(Progress::Fraction((index as f64 + within) / total as f64));
            })?;

            if !policy.fast_mode {
                file.sync_all()?;
            }
        }

        progress(Progress::Fraction(1.0));
        Ok(())
    }

    /// Write filler data until the device (or the configured cap) is full.
    ///
    /// Returns the number of bytes written. Running out of space ends the
    /// write phase normally. Every filler created is pushed to `fillers`,
    /// even when an error is returned.
    fn fill_free_space<S: FillSink>(
        &self,
        dir: &Path,
        mut file: S,
        open_next: &mut dyn FnMut() -> io::Result<(PathBuf, S)>,
        fillers: &mut Vec<PathBuf>,
        policy: &PassPolicy,
        cancel: &CancelFlag,
        report: &dyn Fn(u64),
    ) -> Result<u64> {
        let mut rng = pattern::rng(policy.fast_mode);
        let mut buf = vec![0u8; self.config.chunk_size];
        let mut written = 0u64;

        loop {
            if cancel.is_canceled() {
                info!("Cancel requested, ending fill of {} early", dir.display());
                break;
            }

            let mut chunk = buf.len();
            if let Some(limit) = self.config.fill_limit {
                if written >= limit {
                    debug!("Fill limit of {} bytes reached", limit);
                    break;
                }
                chunk = chunk.min((limit - written) as usize);
            }

            rng.fill_bytes(&mut buf[..chunk]);
            match file.write(&buf[..chunk]) {
                Ok(0) => {
                    debug!("Device full after {} bytes", written);
                    break;
                }
                Ok(n) => {
                    written += n as u64;
                    report(written);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_disk_full(&e) => {
                    debug!("Device full after {} bytes", written);
                    break;
                }
                Err(e) if is_file_too_large(&e) => {
                    finish_filler(&mut file, policy)?;
                    match open_next() {
                        Ok((path, next)) => {
                            debug!("Filler reached size limit, continuing in {}", path.display());
                            fillers.push(path);
                            file = next;
                        }
                        Err(e) if is_disk_full(&e) => break,
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        finish_filler(&mut file, policy)?;
        Ok(written)
    }
}

impl PassEngine for OverwriteEngine {
    fn run_file_passes(
        &self,
        path: &Path,
        policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<()> {
        policy.validate()?;
        let _guard = self.busy.try_acquire()?;

        let metadata = fs::symlink_metadata(path)?;
        if !metadata.is_file() {
            debug!("{} is not a regular file, unlinking only", path.display());
            fs::remove_file(path)?;
            progress(Progress::Fraction(1.0));
            return Ok(());
        }

        let extent = allocated_extent(&metadata);
        self.shred(path, extent, policy, progress, cancel)
    }

    fn run_fill(
        &self,
        dir: &Path,
        policy: &PassPolicy,
        progress: &dyn Fn(Progress),
        cancel: &CancelFlag,
    ) -> Result<FillReport> {
        policy.validate()?;
        let _guard = self.busy.try_acquire()?;

        let expected = match (available_space(dir), self.config.fill_limit) {
            (Some(free), Some(limit)) => Some(free.min(limit)),
            (free, None) => free,
            (None, limit) => limit,
        };
        let phases = f64::from(policy.total_passes()) + 1.0;

        let (path, file) = create_filler(dir).map_err(|e| {
            if is_disk_full(&e) {
                Error::NoSpaceDuringSetup(dir.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        info!("Filling free space below {} using {}", dir.display(), path.display());

        let mut fillers = vec![path];
        let written = self.fill_free_space(dir, file, &mut || create_filler(dir), &mut fillers, policy, cancel, &|bytes| {
            match expected {
                Some(total) => {
                    let within = (bytes as f64 / total as f64).min(1.0);
                    progress(Progress::Fraction(within / phases));
                }
                None => progress(Progress::Pulse),
            }
        });

        // Fillers are scrubbed even after an error or a cancel request.
        let scrub_all = CancelFlag::new();
        let scrubbed = scrub_fillers(&fillers, phases, progress, &|filler, report| {
            let extent = fs::metadata(filler).map(|m| m.len()).unwrap_or(0);
            self.shred(filler, extent, policy, report, &scrub_all)
        });

        let bytes_written = written?;
        scrubbed?;
        if cancel.is_canceled() {
            return Err(Error::Interrupted);
        }

        Ok(FillReport {
            bytes_written,
            fillers,
        })
    }

    fn busy(&self) -> &BusyLock {
        &self.busy
    }

    fn name(&self) -> &'static str {
        "overwrite"
    }
}

fn write_pass(
    file: &mut File,
    logical_len: u64,
    extent: u64,
    pattern: Pattern,
    rng: &mut dyn RngCore,
    buf: &mut [u8],
    on_written: &dyn Fn(u64),
) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;

    let mut offset = 0u64;
    while offset < extent {
        let n = (buf.len() as u64).min(extent - offset) as usize;
        pattern.fill(&mut buf[..n], offset, rng);

        match file.write_all(&buf[..n]) {
            Ok(()) => {}
            // Slack past the logical end may not be writable on a full device.
            Err(e) if offset + n as u64 > logical_len && is_disk_full(&e) => break,
            Err(e) => return Err(e.into()),
        }

        offset += n as u64;
        on_written(offset);
    }

    on_written(extent);
    Ok(())
}

/// Destination of filler data.
trait FillSink: Write {
    fn sync_data_to_disk(&mut self) -> io::Result<()>;
}

impl FillSink for File {
    fn sync_data_to_disk(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Flush a filler; running out of space while flushing is expected.
fn finish_filler<S: FillSink>(file: &mut S, policy: &PassPolicy) -> Result<()> {
    if policy.fast_mode {
        return Ok(());
    }
    match file.sync_data_to_disk() {
        Err(e) if !is_disk_full(&e) => Err(e.into()),
        _ => Ok(()),
    }
}

/// Overwrite and delete every filler, continuing past failures.
///
/// A filler whose scrub fails is still truncated and unlinked so the
/// device is not left full. Returns the first error.
fn scrub_fillers(
    fillers: &[PathBuf],
    phases: f64,
    progress: &dyn Fn(Progress),
    scrub: &dyn Fn(&Path, &dyn Fn(Progress)) -> Result<()>,
) -> Result<()> {
    let count = fillers.len() as f64;
    let mut first_err = None;

    for (index, filler) in fillers.iter().enumerate() {
        let result = scrub(filler, &|p| match p {
            Progress::Fraction(f) => {
                let within = (index as f64 + f) / count;
                progress(Progress::Fraction((1.0 + within * (phases - 1.0)) / phases));
            }
            other => progress(other),
        });

        if let Err(e) = result {
            warn!("Could not scrub filler {}: {}", filler.display(), e);
            if let Err(remove_err) = discard_filler(filler) {
                warn!("Could not remove filler {}: {}", filler.display(), remove_err);
            }
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }

    first_err.map_or(Ok(()), Err)
}

/// Truncate and unlink a filler without overwriting it.
fn discard_filler(path: &Path) -> io::Result<()> {
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => file.set_len(0)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }
    unlink_obscured(path)
}

/// Create a uniquely named filler file in `dir`.
fn create_filler(dir: &Path) -> io::Result<(PathBuf, File)> {
    let mut rng = rand::thread_rng();
    let mut last_err = None;

    for _ in 0..FILLER_NAME_ATTEMPTS {
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(FILLER_NAME_LEN)
            .map(char::from)
            .collect();
        let path = dir.join(format!("{}{}", FILLER_PREFIX, suffix));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists)))
}

/// Rename to a random name of the same length, then unlink.
fn unlink_obscured(path: &Path) -> io::Result<()> {
    let target = match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let random: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(name.len().max(1))
                .map(char::from)
                .collect();
            let renamed = parent.join(random);
            if !renamed.exists() && fs::rename(path, &renamed).is_ok() {
                renamed
            } else {
                path.to_path_buf()
            }
        }
        _ => path.to_path_buf(),
    };

    fs::remove_file(target)
}

/// Logical size rounded up to the filesystem block, covering the slack of
/// the last block.
#[cfg(unix)]
fn allocated_extent(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;

    let len = metadata.len();
    let block = metadata.blksize();
    if len == 0 || block == 0 {
        return len;
    }
    match len % block {
        0 => len,
        remainder => len + (block - remainder),
    }
}

#[cfg(not(unix))]
fn allocated_extent(metadata: &fs::Metadata) -> u64 {
    metadata.len()
}

/// Bytes available to unprivileged users on the filesystem of `dir`.
#[cfg(unix)]
fn available_space(dir: &Path) -> Option<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(dir.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `c_path` is NUL-terminated and `stat` is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }

    let bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
    (bytes > 0).then_some(bytes)
}

#[cfg(not(unix))]
fn available_space(_dir: &Path) -> Option<u64> {
    None
}

fn is_disk_full(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EDQUOT))
        || e.kind() == io::ErrorKind::WriteZero
}

fn is_file_too_large(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EFBIG)
}
