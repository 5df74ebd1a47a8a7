//! Named pipe backend

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, IntoRawHandle, RawHandle};
use std::ptr;

use windows_sys::Win32::Foundation::{
    GetLastError, SetHandleInformation, ERROR_BROKEN_PIPE, ERROR_INVALID_HANDLE, ERROR_NO_DATA,
    ERROR_PIPE_CONNECTED, ERROR_PIPE_LISTENING, GENERIC_READ, GENERIC_WRITE, HANDLE,
    HANDLE_FLAG_INHERIT, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_FIRST_PIPE_INSTANCE, OPEN_EXISTING,
    PIPE_ACCESS_DUPLEX,
};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, CreatePipe, DisconnectNamedPipe, PeekNamedPipe,
    SetNamedPipeHandleState, PIPE_NOWAIT, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE,
    PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
};

const BUFFER_SIZE: u32 = 64 * 1024;

/// A fresh pipe name in the local pipe namespace
pub(crate) fn pipe_name() -> String {
    format!(r"\\.\pipe\subterm-{}", uuid::Uuid::new_v4())
}

fn wide(name: &str) -> Vec<u16> {
    OsStr::new(name).encode_wide().chain(Some(0)).collect()
}

fn raw(file: &File) -> HANDLE {
    file.as_raw_handle() as HANDLE
}

/// Server instance waiting for its client
pub(crate) struct Listener {
    pipe: Option<File>,
}

impl Listener {
    pub(crate) fn bind(name: &str) -> io::Result<Self> {
        let name = wide(name);
        // SAFETY: name is NUL-terminated and outlives the call
        let handle = unsafe {
            CreateNamedPipeW(
                name.as_ptr(),
                PIPE_ACCESS_DUPLEX | FILE_FLAG_FIRST_PIPE_INSTANCE,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_NOWAIT,
                PIPE_UNLIMITED_INSTANCES,
                BUFFER_SIZE,
                BUFFER_SIZE,
                0,
                ptr::null(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: handle is a freshly created pipe owned by the File
        let pipe = unsafe { File::from_raw_handle(handle as RawHandle) };
        Ok(Self { pipe: Some(pipe) })
    }

    /// Hand out the server handle once a client has connected
    pub(crate) fn try_accept(&mut self) -> io::Result<Option<Conn>> {
        let Some(pipe) = self.pipe.as_ref() else {
            return Ok(None);
        };

        // SAFETY: non-overlapped connect on a valid pipe handle
        let connected = unsafe { ConnectNamedPipe(raw(pipe), ptr::null_mut()) };
        if connected != 0 {
            return Ok(None);
        }

        // SAFETY: reads the calling thread's last error
        match unsafe { GetLastError() } {
            ERROR_PIPE_LISTENING => Ok(None),
            // A client that already left still counts; poll reports it
            ERROR_PIPE_CONNECTED | ERROR_NO_DATA => {
                let mode = PIPE_READMODE_BYTE | PIPE_WAIT;
                // SAFETY: mode outlives the call
                if unsafe { SetNamedPipeHandleState(raw(pipe), &mode, ptr::null(), ptr::null()) }
                    == 0
                {
                    return Err(io::Error::last_os_error());
                }
                Ok(self.pipe.take().map(|pipe| Conn { pipe, server: true }))
            }
            code => Err(io::Error::from_raw_os_error(code as i32)),
        }
    }
}

/// A connected pipe end
#[derive(Debug)]
pub(crate) struct Conn {
    pipe: File,
    server: bool,
}

impl Conn {
    pub(crate) fn connect(name: &str) -> io::Result<Self> {
        let name = wide(name);
        // SAFETY: name is NUL-terminated and outlives the call
        let handle = unsafe {
            CreateFileW(
                name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                0,
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: handle was just opened and is owned by the File
        let pipe = unsafe { File::from_raw_handle(handle as RawHandle) };
        Ok(Self {
            pipe,
            server: false,
        })
    }

    pub(crate) fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            pipe: self.pipe.try_clone()?,
            server: self.server,
        })
    }

    /// Bytes readable without blocking, `None` once the peer is gone
    pub(crate) fn available(&self) -> io::Result<Option<usize>> {
        file_available(&self.pipe)
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        if self.server {
            // SAFETY: valid server handle
            unsafe { DisconnectNamedPipe(raw(&self.pipe)) };
        }
        Ok(())
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pipe.read(buf)
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pipe.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.pipe.flush()
    }
}

/// Readable bytes on any pipe handle
pub(crate) fn file_available(file: &File) -> io::Result<Option<usize>> {
    let mut avail: u32 = 0;
    // SAFETY: only the total-available out parameter is requested
    let ok = unsafe {
        PeekNamedPipe(
            raw(file),
            ptr::null_mut(),
            0,
            ptr::null_mut(),
            &mut avail,
            ptr::null_mut(),
        )
    };
    if ok != 0 {
        return Ok(Some(avail as usize));
    }

    // SAFETY: reads the calling thread's last error
    match unsafe { GetLastError() } {
        ERROR_BROKEN_PIPE | ERROR_INVALID_HANDLE | ERROR_NO_DATA => Ok(None),
        code => Err(io::Error::from_raw_os_error(code as i32)),
    }
}

/// Anonymous pipe pair `(read, write)`, neither inheritable
pub(crate) fn anonymous_pipe() -> io::Result<(File, File)> {
    let mut read: HANDLE = 0;
    let mut write: HANDLE = 0;
    // SAFETY: out pointers are valid; default security, not inheritable
    if unsafe { CreatePipe(&mut read, &mut write, ptr::null(), 0) } == 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: both handles were just created and are owned here
    unsafe {
        Ok((
            File::from_raw_handle(read as RawHandle),
            File::from_raw_handle(write as RawHandle),
        ))
    }
}

/// Let children spawned from now on inherit `file`; returns its raw value
pub(crate) fn make_inheritable(file: &File) -> io::Result<u64> {
    let handle = raw(file);
    // SAFETY: handle is valid for as long as `file` is open
    if unsafe { SetHandleInformation(handle, HANDLE_FLAG_INHERIT, HANDLE_FLAG_INHERIT) } == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(handle as u64)
}

/// Give up ownership of `file` without closing it
pub(crate) fn into_raw(file: File) -> u64 {
    file.into_raw_handle() as HANDLE as u64
}

/// Take ownership of an inherited handle
///
/// # Safety
///
/// `raw` must be an open handle not owned by anything else.
pub(crate) unsafe fn file_from_raw(raw: u64) -> File {
    File::from_raw_handle(raw as HANDLE as RawHandle)
}
