//! Redirection of a file descriptor into log lines.
//!
//! A capture points the target descriptor at a pipe whose read end is
//! drained by a dedicated thread. Every chunk read is written through to a
//! duplicate of the original descriptor, then split on newlines; each
//! complete, non-empty line is handed to the line callback. A trailing
//! partial line is delivered when the capture stops.

use std::{
    fs::File,
    io::{self, ErrorKind, Read, Write},
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    thread::{self, JoinHandle},
};

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_retry(mut f: impl FnMut() -> libc::c_int) -> io::Result<libc::c_int> {
    loop {
        match cvt(f()) {
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Creates a close-on-exec pipe, returning `(read_end, write_end)`.
pub(crate) fn create_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    let (read_end, write_end) =
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    for fd in [&read_end, &write_end] {
        cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) })?;
    }
    Ok((read_end, write_end))
}

fn duplicate(fd: RawFd) -> io::Result<OwnedFd> {
    let copy = cvt(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) })?;
    Ok(unsafe { OwnedFd::from_raw_fd(copy) })
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

/// Splits a byte stream into lines.
#[derive(Default, Debug)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, mut chunk: &[u8], on_line: &mut impl FnMut(String)) {
        while let Some(position) = chunk.iter().position(|b| *b == b'\n') {
            self.pending.extend_from_slice(&chunk[..position]);
            self.emit(on_line);
            chunk = &chunk[position + 1..];
        }
        self.pending.extend_from_slice(chunk);
    }

    pub(crate) fn finish(&mut self, on_line: &mut impl FnMut(String)) {
        self.emit(on_line);
    }

    fn emit(&mut self, on_line: &mut impl FnMut(String)) {
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        if !self.pending.is_empty() {
            on_line(String::from_utf8_lossy(&self.pending).into_owned());
        }
        self.pending.clear();
    }
}

struct Pump<F> {
    source: File,
    passthrough: File,
    wake: File,
    buffer: Vec<u8>,
    splitter: LineSplitter,
    on_line: F,
}

impl<F: FnMut(String)> Pump<F> {
    fn run(mut self) {
        let mut fds = [
            libc::pollfd {
                fd: self.source.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wake.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        loop {
            if cvt_retry(|| unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) }).is_err() {
                break;
            }
            if fds[0].revents != 0 && !self.read_once() {
                break;
            }
            if fds[1].revents != 0 {
                // Stop requested: take what is already buffered in the pipe and leave.
                if set_nonblocking(self.source.as_raw_fd()).is_ok() {
                    while self.read_once() {}
                }
                break;
            }
        }
        self.splitter.finish(&mut self.on_line);
    }

    // Returns false on end of file or error.
    fn read_once(&mut self) -> bool {
        loop {
            match self.source.read(&mut self.buffer) {
                Ok(0) => return false,
                Ok(n) => {
                    let chunk = &self.buffer[..n];
                    let _ = self.passthrough.write_all(chunk);
                    self.splitter.push(chunk, &mut self.on_line);
                    return true;
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return false,
            }
        }
    }
}

/// An active redirection of one file descriptor.
pub struct StreamCapture {
    fd: RawFd,
    original: OwnedFd,
    wake: File,
    reader: Option<JoinHandle<()>>,
}

impl StreamCapture {
    /// Redirects `fd` and starts delivering its lines to `on_line`.
    ///
    /// On error `fd` is left untouched.
    pub fn start<F>(fd: RawFd, buffer_size: usize, on_line: F) -> io::Result<Self>
    where
        F: FnMut(String) + Send + 'static,
    {
        let original = duplicate(fd)?;
        let passthrough = File::from(original.try_clone()?);
        let (read_end, write_end) = create_pipe()?;
        let (wake_read, wake_write) = create_pipe()?;
        let pump = Pump {
            source: File::from(read_end),
            passthrough,
            wake: File::from(wake_read),
            buffer: vec![0; buffer_size.max(1)],
            splitter: LineSplitter::default(),
            on_line,
        };
        let reader = thread::Builder::new()
            .name(format!("mtfacility-capture-{fd}"))
            .spawn(move || pump.run())?;
        let mut capture = Self {
            fd,
            original,
            wake: File::from(wake_write),
            reader: Some(reader),
        };
        if let Err(error) = cvt_retry(|| unsafe { libc::dup2(write_end.as_raw_fd(), fd) }) {
            drop(write_end);
            capture.join_reader();
            return Err(error);
        }
        Ok(capture)
    }

    pub fn is_active(&self) -> bool {
        self.reader.is_some()
    }

    /// Restores the original descriptor and joins the reader thread.
    ///
    /// Lines written before the call are delivered, including a trailing
    /// partial line; nothing is delivered after it returns. On error the
    /// capture stays active. Stopping twice is a no-op.
    pub fn stop(&mut self) -> io::Result<()> {
        if self.reader.is_none() {
            return Ok(());
        }
        cvt_retry(|| unsafe { libc::dup2(self.original.as_raw_fd(), self.fd) })?;
        self.join_reader();
        Ok(())
    }

    fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = self.wake.write_all(&[1]);
            if reader.thread().id() != thread::current().id() {
                let _ = reader.join();
            }
        }
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collect(chunks: &[&[u8]]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut splitter = LineSplitter::default();
        for chunk in chunks {
            splitter.push(chunk, &mut |line| lines.push(line));
        }
        splitter.finish(&mut |line| lines.push(line));
        lines
    }

    #[test]
    fn splits_on_newlines_across_chunks() {
        assert_eq!(collect(&[b"a\nb"]), ["a", "b"]);
        assert_eq!(collect(&[b"hel", b"lo\nwor", b"ld\n"]), ["hello", "world"]);
        assert_eq!(collect(&[b"crlf\r\n", b"\n\n", b"x"]), ["crlf", "x"]);
        assert!(collect(&[b""]).is_empty());
    }

    #[test]
    fn partial_line_waits_for_finish() {
        let mut lines = Vec::new();
        let mut splitter = LineSplitter::default();
        splitter.push(b"no newline yet", &mut |line| lines.push(line));
        assert!(lines.is_empty());
        splitter.finish(&mut |line| lines.push(line));
        assert_eq!(lines, ["no newline yet"]);
    }

    #[test]
    fn capture_writes_through_and_flushes_on_stop() {
        let (observer, target) = create_pipe().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let mut capture = StreamCapture::start(target.as_raw_fd(), 3, move |line| {
            sink.lock().unwrap().push(line)
        })
        .unwrap();
        assert!(capture.is_active());

        let mut writer = File::from(target.try_clone().unwrap());
        writer.write_all(b"a\nb").unwrap();
        drop(writer);

        capture.stop().unwrap();
        capture.stop().unwrap();
        assert!(!capture.is_active());
        assert_eq!(*lines.lock().unwrap(), ["a", "b"]);

        // The restored descriptor writes to the original pipe again.
        let mut writer = File::from(target.try_clone().unwrap());
        writer.write_all(b"\nafter").unwrap();
        drop(writer);
        drop(capture);
        drop(target);

        let mut raw = String::new();
        File::from(observer).read_to_string(&mut raw).unwrap();
        assert_eq!(raw, "a\nb\nafter");
        assert_eq!(lines.lock().unwrap().len(), 2);
    }

    #[test]
    fn stop_returns_while_a_duplicate_is_still_open() {
        let (_observer, target) = create_pipe().unwrap();
        let mut capture = StreamCapture::start(target.as_raw_fd(), 64, |_| {}).unwrap();
        let lingering = target.try_clone().unwrap();
        capture.stop().unwrap();
        drop(lingering);
    }

    #[test]
    fn invalid_descriptor_fails_to_start() {
        assert!(StreamCapture::start(-1, 64, |_| {}).is_err());
    }
}
