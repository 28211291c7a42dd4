//! Real-time thread setup shared by the ISO callback thread and the
//! loopback transport's simulated cycle-clock thread.
//!
//! Grounded directly on `bark::thread` (the teacher's binary crate):
//! same `pthread_setname_np` + `SCHED_FIFO` pattern, same
//! warn-once-then-suggest-setcap behaviour on `EPERM`.

use std::ffi::CString;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

/// Priority used for the isochronous transport thread. FFADO itself runs
/// its packet thread at the highest `SCHED_FIFO` priority available to an
/// unprivileged-but-capable process.
pub const ISO_THREAD_PRIORITY: i32 = 99;

pub fn set_name(name: &str) {
    let cstr = CString::new(name).expect("not a cstring in ffado_util::thread::set_name");

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

pub fn set_realtime_priority() {
    set_realtime_priority_at(ISO_THREAD_PRIORITY);
}

pub fn set_realtime_priority_at(priority: i32) {
    let rc = unsafe {
        libc::sched_setscheduler(
            0,
            libc::SCHED_FIFO,
            &libc::sched_param { sched_priority: priority },
        )
    };

    if rc < 0 {
        static WARNED: AtomicBool = AtomicBool::new(false);
        let warned = WARNED.swap(true, Ordering::Relaxed);

        if !warned {
            let err = std::io::Error::last_os_error();

            log::warn!("failed to set realtime thread priority: {err}");

            if err.kind() == ErrorKind::PermissionDenied {
                let path = std::env::current_exe()
                    .map(|path| path.display().to_string());

                let path = path.as_deref().unwrap_or("path/to/ffado-streamd");

                log::warn!("fix by running: setcap cap_sys_nice=ep {path}");
            }
        }
    }
}
