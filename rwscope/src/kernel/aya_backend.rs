//! # aya Kernel Backend
//!
//! Production implementation of the capability traits.
//!
//! ## Types
//!
//! - [`AyaKernel`] - Loads the probe object from disk with `Ebpf::load_file`
//! - [`AyaProbeObject`] - Owns the `Ebpf` handle and the kprobe link IDs
//! - [`AyaMap`] - `HashMap<MapData, u32, u32>` behind a mutex
//! - [`PerfChannel`] - Blocking reader over the per-CPU perf buffers
//!
//! ## Blocking Reads
//!
//! Perf buffers are non-blocking, so [`PerfChannel::read`] waits in `poll(2)`
//! on every buffer fd plus an `eventfd`. [`PerfChannel::close`] writes to the
//! eventfd, which wakes a reader stuck in `poll` no matter how long the probes
//! stay quiet.

use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::io;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aya::maps::perf::PerfEventArrayBuffer;
use aya::maps::{HashMap, MapData, MapError, PerfEventArray};
use aya::programs::kprobe::KProbeLinkId;
use aya::programs::KProbe;
use aya::Ebpf;
use bytes::BytesMut;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use parking_lot::Mutex;
use rwscope_common::{SyscallEvent, EVENTS_MAP};

use super::symbols::KALLSYMS_PATH;
use super::{
    online_cpus, ChannelRecord, EventChannel, Kernel, KernelMap, ProbeMap, ProbeObject,
    SymbolTable,
};
use crate::domain::{ChannelError, KernelError, Syscall};

/// Default perf buffer size per CPU, in pages (256 KiB with 4 KiB pages)
pub const DEFAULT_PERF_PAGES: usize = 64;

/// Records pulled from one perf buffer per `read_events` call
const READ_BATCH: usize = 16;

/// Loads the probe object from a file built by `cargo xtask build-ebpf`
#[derive(Debug, Clone)]
pub struct AyaKernel {
    object_path: PathBuf,
    kallsyms_path: PathBuf,
    perf_pages: usize,
}

impl AyaKernel {
    #[must_use]
    pub fn new(object_path: impl Into<PathBuf>) -> Self {
        Self {
            object_path: object_path.into(),
            kallsyms_path: PathBuf::from(KALLSYMS_PATH),
            perf_pages: DEFAULT_PERF_PAGES,
        }
    }

    /// Per-CPU perf buffer size in pages (must be a power of two)
    #[must_use]
    pub fn with_perf_pages(mut self, perf_pages: usize) -> Self {
        self.perf_pages = perf_pages;
        self
    }

    #[must_use]
    pub fn with_kallsyms_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kallsyms_path = path.into();
        self
    }

    #[must_use]
    pub fn object_path(&self) -> &Path {
        &self.object_path
    }
}

impl Kernel for AyaKernel {
    fn load(&self) -> Result<Box<dyn ProbeObject>, KernelError> {
        let bpf = Ebpf::load_file(&self.object_path)?;
        info!("✓ Loaded probe object: {}", self.object_path.display());
        Ok(Box::new(AyaProbeObject { bpf, links: BTreeMap::new(), perf_pages: self.perf_pages }))
    }

    fn symbol_table(&self) -> Result<SymbolTable, KernelError> {
        SymbolTable::load(&self.kallsyms_path)
    }
}

/// A loaded `Ebpf` object and the kprobe links created from it
pub struct AyaProbeObject {
    bpf: Ebpf,
    links: BTreeMap<Syscall, KProbeLinkId>,
    perf_pages: usize,
}

impl AyaProbeObject {
    fn kprobe(&mut self, syscall: Syscall) -> Result<&mut KProbe, KernelError> {
        let name = syscall.program_name();
        let program: &mut KProbe =
            self.bpf.program_mut(name).ok_or(KernelError::MissingProgram(name))?.try_into()?;
        Ok(program)
    }
}

impl ProbeObject for AyaProbeObject {
    fn take_map(&mut self, map: ProbeMap) -> Result<Arc<dyn KernelMap>, KernelError> {
        let name = map.name();
        let inner: HashMap<MapData, u32, u32> =
            HashMap::try_from(self.bpf.take_map(name).ok_or(KernelError::MissingMap(name))?)?;
        Ok(Arc::new(AyaMap { inner: Mutex::new(inner) }))
    }

    fn attach(&mut self, syscall: Syscall, symbol: &str) -> Result<(), KernelError> {
        let program = self.kprobe(syscall)?;
        program.load()?;
        let link_id = program.attach(symbol, 0)?;
        self.links.insert(syscall, link_id);
        info!("✓ Attached kprobe: {} → {symbol}", syscall.program_name());
        Ok(())
    }

    fn detach(&mut self, syscall: Syscall) -> Result<(), KernelError> {
        let link_id =
            self.links.remove(&syscall).ok_or(KernelError::NotAttached(syscall.program_name()))?;
        self.kprobe(syscall)?.detach(link_id)?;
        debug!("Detached kprobe: {}", syscall.program_name());
        Ok(())
    }

    fn open_channel(&mut self) -> Result<Arc<dyn EventChannel>, KernelError> {
        let map = self.bpf.take_map(EVENTS_MAP).ok_or(KernelError::MissingMap(EVENTS_MAP))?;
        let mut events = PerfEventArray::try_from(map)?;

        let cpus = online_cpus()?;
        let buffers = cpus
            .iter()
            .map(|cpu| events.open(cpu.0, Some(self.perf_pages)))
            .collect::<Result<Vec<_>, _>>()?;
        info!("✓ Opened perf buffers on {} CPUs ({} pages each)", cpus.len(), self.perf_pages);

        Ok(Arc::new(PerfChannel::new(buffers)?))
    }
}

/// `u32 → u32` BPF hash map
pub struct AyaMap {
    inner: Mutex<HashMap<MapData, u32, u32>>,
}

impl KernelMap for AyaMap {
    fn update(&self, key: u32, value: u32) -> Result<(), KernelError> {
        self.inner.lock().insert(key, value, 0)?;
        Ok(())
    }

    fn lookup(&self, key: u32) -> Result<Option<u32>, KernelError> {
        match self.inner.lock().get(&key, 0) {
            Ok(value) => Ok(Some(value)),
            Err(MapError::KeyNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: u32) -> Result<(), KernelError> {
        match self.inner.lock().remove(&key) {
            Err(e) if !is_not_found(&e) => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Result<Vec<u32>, KernelError> {
        Ok(self.inner.lock().keys().collect::<Result<Vec<_>, _>>()?)
    }
}

fn is_not_found(err: &MapError) -> bool {
    matches!(err, MapError::KeyNotFound) || errno(err) == Some(Errno::ENOENT as i32)
}

/// First OS error code found walking the `source()` chain
fn errno(err: &(dyn Error + 'static)) -> Option<i32> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_error) = e.downcast_ref::<io::Error>() {
            return io_error.raw_os_error();
        }
        current = e.source();
    }
    None
}

struct PerfReaders {
    buffers: Vec<PerfEventArrayBuffer<MapData>>,
    out: Vec<BytesMut>,
    pending: VecDeque<ChannelRecord>,
}

impl PerfReaders {
    /// Block in poll(2) until a buffer or `wake` is readable
    fn wait_readable(&self, wake: &EventFd) -> Result<(), ChannelError> {
        let mut fds: Vec<PollFd<'_>> = self
            .buffers
            .iter()
            .map(|buf| buf.as_fd())
            .chain(std::iter::once(wake.as_fd()))
            .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
            .collect();

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) | Err(Errno::EINTR) => Ok(()),
            Err(errno) => Err(ChannelError::Io(errno.into())),
        }
    }

    /// Move every readable record into the pending queue
    fn drain(&mut self) -> Result<(), ChannelError> {
        let Self { buffers, out, pending } = self;
        for buf in buffers.iter_mut() {
            while buf.readable() {
                let events = buf.read_events(out)?;
                if events.lost > 0 {
                    pending.push_back(ChannelRecord::Lost(
                        u64::try_from(events.lost).unwrap_or(u64::MAX),
                    ));
                }
                let samples = out.iter().take(events.read);
                pending.extend(samples.map(|sample| ChannelRecord::Sample(sample.to_vec())));
            }
        }
        Ok(())
    }
}

/// Blocking, force-closable reader over the per-CPU perf buffers
///
/// Only one thread reads at a time; the reader holds the buffer lock while it
/// waits, and [`PerfChannel::close`] never takes it.
pub struct PerfChannel {
    readers: Mutex<PerfReaders>,
    wake: EventFd,
    closed: AtomicBool,
}

impl PerfChannel {
    /// Wrap already-opened per-CPU buffers
    ///
    /// # Errors
    /// Returns an error if the wake-up eventfd cannot be created
    pub fn new(buffers: Vec<PerfEventArrayBuffer<MapData>>) -> io::Result<Self> {
        let out =
            (0..READ_BATCH).map(|_| BytesMut::with_capacity(SyscallEvent::SIZE * 2)).collect();
        Ok(Self {
            readers: Mutex::new(PerfReaders { buffers, out, pending: VecDeque::new() }),
            wake: EventFd::from_flags(EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)?,
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl EventChannel for PerfChannel {
    fn read(&self) -> Result<ChannelRecord, ChannelError> {
        let mut readers = self.readers.lock();
        loop {
            if self.is_closed() {
                return Err(ChannelError::Closed);
            }
            if let Some(record) = readers.pending.pop_front() {
                return Ok(record);
            }

            readers.wait_readable(&self.wake)?;

            if self.is_closed() {
                return Err(ChannelError::Closed);
            }
            readers.drain()?;
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.wake.write(1) {
            warn!("Failed to wake event reader: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_fails_to_load() {
        let kernel = AyaKernel::new("/nonexistent/rwscope.o");
        assert!(kernel.load().is_err());
    }

    #[test]
    fn test_close_without_buffers_wakes_reader() {
        let channel = Arc::new(PerfChannel::new(Vec::new()).unwrap());
        let reader = {
            let channel = Arc::clone(&channel);
            std::thread::spawn(move || channel.read())
        };

        channel.close();
        channel.close();

        let result = reader.join().unwrap();
        assert!(matches!(result, Err(ChannelError::Closed)));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found(&MapError::KeyNotFound));
        let enoent = Errno::ENOENT as i32;
        assert_eq!(errno(&io::Error::from_raw_os_error(enoent)), Some(enoent));
        assert_eq!(errno(&io::Error::new(io::ErrorKind::Other, "no errno")), None);
    }
}
