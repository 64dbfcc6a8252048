use std::io;

pub fn get_current_uid() -> libc::uid_t {
    unsafe { libc::getuid() }
}

/// Monotonic clock value in nanoseconds, the clock used to timestamp
/// kernel events
pub fn monotonic_ns() -> Result<u64, io::Error> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
}

/// Lifts the locked memory limit, older kernels account eBPF maps
/// against it
pub fn bump_memlock_rlimit() -> Result<(), io::Error> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };

    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
