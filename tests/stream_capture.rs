use std::{
    fs::File,
    io::{Read, Write},
    os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd},
    sync::Arc,
};

use mtfacility::{Facility, Level, MemoryLogger, TAG_CAPTURED_STDERR, TAG_CAPTURED_STDOUT};

/// Points stdout at a fresh pipe. Returns its read end and the real stdout.
fn stdout_into_pipe() -> (File, OwnedFd) {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (observer, stand_in) =
        unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    let real = std::io::stdout().as_fd().try_clone_to_owned().unwrap();
    assert_ne!(
        unsafe { libc::dup2(stand_in.as_raw_fd(), libc::STDOUT_FILENO) },
        -1
    );
    (observer, real)
}

// Single test: the standard streams are process-wide.
#[test]
fn standard_streams_become_records() {
    let logger = Arc::new(MemoryLogger::new());
    let facility = Facility::builder()
        .with_min_log_level(Level::Debug)
        .with_logger(logger.clone())
        .build()
        .unwrap();

    let (mut observer, real_stdout) = stdout_into_pipe();
    facility.set_captures_standard_output(true).unwrap();
    assert!(facility.captures_standard_output());
    facility.set_captures_standard_output(true).unwrap();
    let mut stdout = std::io::stdout();
    stdout.write_all(b"a\nb").unwrap();
    stdout.flush().unwrap();
    facility.set_captures_standard_output(false).unwrap();
    assert!(!facility.captures_standard_output());
    assert_ne!(
        unsafe { libc::dup2(real_stdout.as_raw_fd(), libc::STDOUT_FILENO) },
        -1
    );
    facility.flush();

    // The bytes still reached the stream stdout pointed at before capture.
    let mut passed_through = [0; 3];
    observer.read_exact(&mut passed_through).unwrap();
    assert_eq!(&passed_through, b"a\nb");

    assert_eq!(logger.messages(), ["a", "b"]);
    for record in logger.records() {
        assert_eq!(record.level(), Level::Info);
        assert_eq!(record.tag(), Some(TAG_CAPTURED_STDOUT));
        assert!(record.callstack().is_none());
    }

    logger.clear();
    facility.set_captures_standard_error(true).unwrap();
    let mut stderr = std::io::stderr();
    stderr.write_all(b"first failure\nsecond failure\n").unwrap();
    facility.set_captures_standard_error(false).unwrap();
    facility.set_captures_standard_error(false).unwrap();
    facility.flush();

    assert_eq!(logger.messages(), ["first failure", "second failure"]);
    for record in logger.records() {
        assert_eq!(record.level(), Level::Error);
        assert_eq!(record.tag(), Some(TAG_CAPTURED_STDERR));
    }

    // Shutdown restores an active capture and delivers its partial line.
    logger.clear();
    facility.set_captures_standard_output(true).unwrap();
    stdout.write_all(b"unterminated").unwrap();
    stdout.flush().unwrap();
    facility.shutdown();
    assert!(!facility.captures_standard_output());
    assert_eq!(logger.messages(), ["unterminated"]);
    assert_eq!(logger.close_count(), 1);
}
