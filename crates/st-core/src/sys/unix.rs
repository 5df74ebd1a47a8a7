//! Unix domain socket backend

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;

/// A fresh socket path in the temp directory
pub(crate) fn pipe_name() -> String {
    std::env::temp_dir()
        .join(format!("subterm-{}.sock", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

/// Creator side before a connector has arrived
pub(crate) struct Listener {
    inner: UnixListener,
    path: PathBuf,
}

impl Listener {
    pub(crate) fn bind(name: &str) -> io::Result<Self> {
        let path = PathBuf::from(name);
        let inner = UnixListener::bind(&path)?;
        inner.set_nonblocking(true)?;
        Ok(Self { inner, path })
    }

    /// Accept the connector if it has connected
    pub(crate) fn try_accept(&mut self) -> io::Result<Option<Conn>> {
        match self.inner.accept() {
            Ok((stream, _)) => {
                // Some platforms hand out accepted sockets with the listener's flags
                stream.set_nonblocking(false)?;
                Ok(Some(Conn(stream)))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %self.path.display(), error = %e, "failed to remove socket file");
            }
        }
    }
}

/// A connected stream end
#[derive(Debug)]
pub(crate) struct Conn(UnixStream);

impl Conn {
    pub(crate) fn connect(name: &str) -> io::Result<Self> {
        UnixStream::connect(name).map(Conn)
    }

    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        self.0.try_clone().map(Conn)
    }

    /// Bytes readable without blocking, `None` once the peer is gone and
    /// nothing is left to read
    pub(crate) fn available(&self) -> io::Result<Option<usize>> {
        available(self.0.as_raw_fd())
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        match self.0.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Query readable bytes on a socket or pipe descriptor
pub(crate) fn available(fd: RawFd) -> io::Result<Option<usize>> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    // SAFETY: pfd is a valid pollfd for the duration of the call
    let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if pfd.revents & libc::POLLNVAL != 0 {
        return Ok(None);
    }

    let mut count: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count as *mut libc::c_int) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let hung_up = pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0;
    let at_eof = pfd.revents & libc::POLLIN != 0;
    if count == 0 && (hung_up || at_eof) {
        return Ok(None);
    }

    Ok(Some(count.max(0) as usize))
}

/// Anonymous pipe pair `(read, write)`, both close-on-exec
pub(crate) fn anonymous_pipe() -> io::Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds has room for the two descriptors pipe(2) writes
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: both descriptors were just created and are owned here
    let (read, write) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    set_inheritable(read.as_raw_fd(), false)?;
    set_inheritable(write.as_raw_fd(), false)?;
    Ok((read, write))
}

/// Readable bytes on an anonymous pipe
pub(crate) fn file_available(file: &File) -> io::Result<Option<usize>> {
    available(file.as_raw_fd())
}

/// Let children spawned from now on inherit `file`; returns its raw value
pub(crate) fn make_inheritable(file: &File) -> io::Result<u64> {
    set_inheritable(file.as_raw_fd(), true)?;
    Ok(file.as_raw_fd() as u64)
}

/// Give up ownership of `file` without closing it
pub(crate) fn into_raw(file: File) -> u64 {
    file.into_raw_fd() as u64
}

/// Take ownership of an inherited descriptor
///
/// # Safety
///
/// `raw` must be an open descriptor not owned by anything else.
pub(crate) unsafe fn file_from_raw(raw: u64) -> File {
    File::from_raw_fd(raw as RawFd)
}

fn set_inheritable(fd: RawFd, inheritable: bool) -> io::Result<()> {
    let flags = if inheritable { 0 } else { libc::FD_CLOEXEC };
    // SAFETY: fd is a valid open descriptor
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
