//! SIGCHLD ハンドラによる終了済み子プロセスの回収。
//!
//! ハンドラは `waitpid(-1, WNOHANG)` を回収できる子がなくなるまで繰り返し、
//! 各 PID を [`JobSlots::mark_done`] に渡す。出力・メモリ確保・ブロッキングはしない。
//! 通知とスロット解放はメインループの [`JobTable::sweep`](crate::job::JobTable::sweep) が行う。
//!
//! [`SigchldBlock`] は fork からジョブ登録（またはフォアグラウンド待機）までの間
//! SIGCHLD を保留し、登録前の子がハンドラに回収されるのを防ぐ。

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::job::JobSlots;

/// ハンドラが参照するスロット配列。[`install`] で一度設定したら解放しない。
static SLOTS: AtomicPtr<JobSlots> = AtomicPtr::new(ptr::null_mut());

// ── errno 退避 ────────────────────────────────────────────────────

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

// ── ハンドラ ──────────────────────────────────────────────────────

/// 終了済みの子をすべて回収し、追跡中なら Done にする。回収した数を返す。
///
/// async-signal-safe。ハンドラ外からも呼べる（テスト・ベンチマーク用）。
pub fn drain(slots: &JobSlots) -> usize {
    let mut reaped = 0;
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        slots.mark_done(pid);
        reaped += 1;
    }
    reaped
}

extern "C" fn on_sigchld(_sig: libc::c_int) {
    unsafe {
        let saved = *errno_location();
        let slots = SLOTS.load(Ordering::Acquire);
        if !slots.is_null() {
            drain(&*slots);
        }
        *errno_location() = saved;
    }
}

/// SIGCHLD ハンドラを設置し、`slots` をプロセス終了まで保持させる。
///
/// 再設置した場合、以前のスロット配列はハンドラが使用中の可能性があるため解放しない。
pub fn install(slots: Arc<JobSlots>) -> io::Result<()> {
    let raw = Arc::into_raw(slots) as *mut JobSlots;
    let previous = SLOTS.swap(raw, Ordering::AcqRel);
    if !previous.is_null() {
        debug!("reaper re-installed; previous job slots leaked");
    }

    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = on_sigchld as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGCHLD, &action, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    debug!("SIGCHLD reaper installed");
    Ok(())
}

// ── SIGCHLD の一時保留 ────────────────────────────────────────────

/// 生存中は SIGCHLD をブロックし、Drop で元のシグナルマスクに戻す。
///
/// 保留された SIGCHLD は解除時に 1 回配送され、ハンドラがまとめて回収する。
pub struct SigchldBlock {
    previous: libc::sigset_t,
}

impl SigchldBlock {
    pub fn new() -> io::Result<Self> {
        unsafe {
            let mut set: libc::sigset_t = mem::zeroed();
            let mut previous: libc::sigset_t = mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGCHLD);
            let ret = libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous);
            if ret != 0 {
                return Err(io::Error::from_raw_os_error(ret));
            }
            Ok(Self { previous })
        }
    }

    /// 元のマスクに戻す。fork 後の子プロセスで exec 前に呼ぶ（マスクは exec を越えて引き継がれる）。
    pub fn restore(&self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, ptr::null_mut());
        }
    }
}

impl Drop for SigchldBlock {
    fn drop(&mut self) {
        self.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigchld_blocked() -> bool {
        unsafe {
            let mut current: libc::sigset_t = mem::zeroed();
            libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), &mut current);
            libc::sigismember(&current, libc::SIGCHLD) == 1
        }
    }

    #[test]
    fn block_is_scoped() {
        // マスクはスレッド単位。他テストと干渉しない
        assert!(!sigchld_blocked());
        {
            let _guard = SigchldBlock::new().unwrap();
            assert!(sigchld_blocked());
        }
        assert!(!sigchld_blocked());
    }
}
