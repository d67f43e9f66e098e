// SPDX-License-Identifier: MIT
//
// Process spawn/liveness/wait, ported from the original C remoting layer's
// `process.c` (POSIX: fork+execv, liveness via `kill(pid, 0)`; Windows:
// CreateProcessA, liveness via WaitForSingleObject(0)).

use std::io;

use crate::error::PlatformError;

#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandle(libc::pid_t);

#[cfg(windows)]
#[derive(Debug, Clone, Copy)]
pub struct ProcessHandle(windows_sys::Win32::Foundation::HANDLE);

/// Spawn `argv[0]` with the remaining entries as arguments. Equivalent to
/// the C source's `process_spawn(char *const argv[])`.
#[cfg(unix)]
pub fn process_spawn(argv: &[String]) -> Result<ProcessHandle, PlatformError> {
    use std::ffi::CString;

    let program = argv.first().cloned().unwrap_or_default();
    let c_args: Vec<CString> = argv.iter().map(|s| CString::new(s.as_str()).unwrap()).collect();
    let mut c_argv: Vec<*const libc::c_char> = c_args.iter().map(|s| s.as_ptr()).collect();
    c_argv.push(std::ptr::null());

    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(PlatformError::ProcessSpawn {
            program,
            source: io::Error::last_os_error(),
        }),
        0 => {
            unsafe {
                libc::execv(c_argv[0], c_argv.as_ptr());
                // execv only returns on failure.
                libc::_exit(127);
            }
        }
        child => {
            tracing::debug!(pid = child, "spawned server process");
            Ok(ProcessHandle(child))
        }
    }
}

#[cfg(unix)]
pub fn process_is_alive(handle: ProcessHandle) -> bool {
    unsafe { libc::kill(handle.0, 0) == 0 }
}

#[cfg(unix)]
pub fn process_wait(handle: ProcessHandle) -> Result<(), PlatformError> {
    let mut status: libc::c_int = 0;
    let ret = unsafe { libc::waitpid(handle.0, &mut status, 0) };
    if ret == -1 {
        return Err(PlatformError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(unix)]
pub fn process_close(_handle: ProcessHandle) {
    // No handle to release on POSIX: the pid is just an integer.
}

#[cfg(unix)]
pub fn current_pid() -> u32 {
    unsafe { libc::getpid() as u32 }
}

/// Liveness check against a bare pid rather than a `ProcessHandle`, for
/// the server side of the bridge: it only ever learns its parent's pid
/// from argv (§6 "Server CLI"), never a handle it spawned itself.
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(windows)]
pub fn process_spawn(argv: &[String]) -> Result<ProcessHandle, PlatformError> {
    use windows_sys::Win32::Foundation::FALSE;
    use windows_sys::Win32::System::Threading::*;

    let program = argv.first().cloned().unwrap_or_default();
    let mut cmdline = argv
        .iter()
        .map(|a| format!("\"{a}\""))
        .collect::<Vec<_>>()
        .join(" ");
    cmdline.push('\0');
    let mut wide: Vec<u16> = cmdline.encode_utf16().collect();

    unsafe {
        let mut si: STARTUPINFOW = std::mem::zeroed();
        si.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
        let mut pi: PROCESS_INFORMATION = std::mem::zeroed();

        let ok = CreateProcessW(
            std::ptr::null(),
            wide.as_mut_ptr(),
            std::ptr::null(),
            std::ptr::null(),
            FALSE,
            0,
            std::ptr::null(),
            std::ptr::null(),
            &si,
            &mut pi,
        );

        if ok == 0 {
            return Err(PlatformError::ProcessSpawn {
                program,
                source: io::Error::last_os_error(),
            });
        }

        windows_sys::Win32::Foundation::CloseHandle(pi.hThread);
        Ok(ProcessHandle(pi.hProcess))
    }
}

#[cfg(windows)]
pub fn process_is_alive(handle: ProcessHandle) -> bool {
    use windows_sys::Win32::System::Threading::{WaitForSingleObject, WAIT_TIMEOUT};
    unsafe { WaitForSingleObject(handle.0, 0) == WAIT_TIMEOUT }
}

#[cfg(windows)]
pub fn process_wait(handle: ProcessHandle) -> Result<(), PlatformError> {
    use windows_sys::Win32::System::Threading::{WaitForSingleObject, INFINITE};
    unsafe {
        WaitForSingleObject(handle.0, INFINITE);
    }
    Ok(())
}

#[cfg(windows)]
pub fn process_close(handle: ProcessHandle) {
    unsafe {
        windows_sys::Win32::Foundation::CloseHandle(handle.0);
    }
}

#[cfg(windows)]
pub fn current_pid() -> u32 {
    unsafe { windows_sys::Win32::System::Threading::GetCurrentProcessId() }
}

/// Liveness check against a bare pid rather than a `ProcessHandle`, for
/// the server side of the bridge: it only ever learns its parent's pid
/// from argv (§6 "Server CLI"), never a handle it spawned itself.
#[cfg(windows)]
pub fn pid_is_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        OpenProcess, WaitForSingleObject, PROCESS_QUERY_LIMITED_INFORMATION, WAIT_TIMEOUT,
    };
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        let alive = WaitForSingleObject(handle, 0) == WAIT_TIMEOUT;
        CloseHandle(handle);
        alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn spawned_process_is_alive_then_dies() {
        let handle = process_spawn(&["/bin/sleep".to_string(), "1".to_string()]).unwrap();
        assert!(process_is_alive(handle));
        process_wait(handle).unwrap();
        assert!(!process_is_alive(handle));
    }

    #[test]
    fn current_pid_matches_std() {
        assert_eq!(current_pid(), std::process::id());
    }
}
