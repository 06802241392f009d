// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named worker threads with optional real-time priority.

use crate::error::{Error, Result};
use std::thread::{self, JoinHandle};

/// Round-robin priority used by gateway workers unless configured otherwise
pub const DEFAULT_RT_PRIORITY: u8 = 80;

/// Spawn a named worker. `priority > 0` requests `SCHED_RR` at that level.
///
/// Raising priority usually needs `CAP_SYS_NICE`; when the request is
/// refused the worker keeps the inherited policy and a warning is logged.
pub fn spawn_worker<F>(name: String, priority: u8, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let thread_name = name.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            if priority > 0 {
                if let Err(e) = set_current_thread_rr_priority(priority) {
                    log::warn!(
                        "[SCHED] {}: keeping default policy ({})",
                        thread_name,
                        e
                    );
                }
            }
            body();
        })
        .map_err(|e| Error::Spawn(e.to_string()))
}

/// Switch the calling thread to `SCHED_RR` at `priority` (clamped to 1-99).
#[cfg(target_os = "linux")]
pub fn set_current_thread_rr_priority(priority: u8) -> std::result::Result<(), String> {
    // SAFETY: sched_param is plain data; all-zero is a valid value.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = libc::c_int::from(priority.clamp(1, 99));

    // SAFETY: pthread_self() is always a valid handle for the calling thread
    // and `param` outlives the call.
    let ret = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param) };
    if ret == 0 {
        Ok(())
    } else {
        Err(format!(
            "pthread_setschedparam(SCHED_RR, {}) failed: {}",
            param.sched_priority,
            std::io::Error::from_raw_os_error(ret)
        ))
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_thread_rr_priority(priority: u8) -> std::result::Result<(), String> {
    Err(format!(
        "real-time priority not supported on this platform (priority={})",
        priority
    ))
}
