//! 外部コマンドの実行: 単一コマンド / 2 段パイプライン、フォアグラウンド待機、ジョブ登録。
//!
//! - [`execute`]: トークン列を [`CommandPlan`] に変換して実行する
//! - 単一コマンド: fork → 子で [`Launch::exec`]
//! - パイプライン: `pipe` を 1 本作り、前段の stdout を書き込み端に、後段の stdin を読み込み端に付け替える。
//!   親は両端をすぐ閉じる（後段が EOF を受け取れるように）
//! - foreground: 子を起動順に `waitpid` で待つ
//! - background: 最後の子だけをジョブテーブルに登録し、`[N] pid` を表示して即座に返る
//!
//! fork からジョブ登録・待機完了までは [`SigchldBlock`] で SIGCHLD を保留する。

use std::io::{self, Write};

use libc::pid_t;
use tracing::debug;

use crate::job::JobTable;
use crate::launch::Launch;
use crate::parser::{self, CommandPlan, Stages};
use crate::reaper::SigchldBlock;
use crate::shell::Flow;

// ── エラー型 ──────────────────────────────────────────────────────

/// 親プロセス側の実行失敗。報告してシェルは継続する。
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("fork: {0}")]
    Fork(#[source] io::Error),
    #[error("sigmask: {0}")]
    SignalMask(#[source] io::Error),
}

// ── fd 付け替え ───────────────────────────────────────────────────

/// 子プロセスでの標準入出力の接続先。
#[derive(Clone, Copy)]
enum Wiring {
    /// 親の stdin/stdout をそのまま使う。
    Inherit,
    /// stdout をパイプの書き込み端へ。
    StdoutTo { read: i32, write: i32 },
    /// stdin をパイプの読み込み端から。
    StdinFrom { read: i32, write: i32 },
}

impl Wiring {
    /// 子プロセスで付け替えを行い、パイプの両端を閉じる。
    ///
    /// `dup2` が失敗しても両端は閉じてからエラーを返す。
    fn apply(self) -> io::Result<()> {
        let (fd, target, read, write) = match self {
            Self::Inherit => return Ok(()),
            Self::StdoutTo { read, write } => (write, libc::STDOUT_FILENO, read, write),
            Self::StdinFrom { read, write } => (read, libc::STDIN_FILENO, read, write),
        };
        let ret = unsafe { libc::dup2(fd, target) };
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(read);
            libc::close(write);
        }
        if ret < 0 {
            return Err(err);
        }
        Ok(())
    }
}

fn open_pipe() -> Result<(i32, i32), ExecError> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(ExecError::Pipe(io::Error::last_os_error()));
    }
    Ok((fds[0], fds[1]))
}

fn close_pipe(read: i32, write: i32) {
    unsafe {
        libc::close(read);
        libc::close(write);
    }
}

// ── 子プロセス起動 ────────────────────────────────────────────────

/// 子プロセスを 1 つ起動し、PID を返す。
///
/// argv の準備（メモリ確保）は fork 前に親で行う。子はシグナルマスクを戻し、
/// fd を付け替えて exec する。失敗した子はエラーを表示して終了する。
fn fork_child(mask: &SigchldBlock, args: &[&str], wiring: Wiring) -> Result<pid_t, ExecError> {
    let prepared = Launch::prepare(args);
    let _ = io::stdout().flush();

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(ExecError::Fork(io::Error::last_os_error()));
    }

    if pid == 0 {
        // 子プロセス: ここから戻らない
        mask.restore();
        if let Err(e) = wiring.apply() {
            eprintln!("myshell: dup2: {}", e);
            unsafe { libc::_exit(1) }
        }
        // ここから先の失敗経路はメモリ確保を伴う（エラー整形と eprintln）
        let err = match prepared.and_then(|launch| launch.exec()) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        eprintln!("myshell: {}", err);
        unsafe { libc::_exit(err.exit_status()) }
    }

    debug!(pid, ?args, "spawned");
    Ok(pid)
}

/// フォアグラウンドの子 1 つを待機し、終了ステータスを返す。
///
/// 既に回収済み（`ECHILD`）なら `None`。
fn wait_foreground(pid: pid_t) -> Option<i32> {
    loop {
        let mut raw_status: i32 = 0;
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if ret == pid {
            let code = if libc::WIFEXITED(raw_status) {
                libc::WEXITSTATUS(raw_status)
            } else if libc::WIFSIGNALED(raw_status) {
                128 + libc::WTERMSIG(raw_status)
            } else {
                1
            };
            debug!(pid, code, "foreground child exited");
            return Some(code);
        }
        if ret < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return None;
    }
}

// ── 実行 ──────────────────────────────────────────────────────────

/// 外部コマンド 1 行分を実行する。
///
/// `cmd_text` は入力行そのままの文字列で、ジョブテーブルの表示用に使う。
/// エラーは stderr に報告し、常に [`Flow::Continue`] を返す。
pub fn execute(jobs: &mut JobTable, tokens: &[&str], cmd_text: &str, out: &mut dyn Write) -> Flow {
    let plan = parser::plan(tokens);
    if let Err(e) = run(jobs, &plan, cmd_text, out) {
        eprintln!("myshell: {}", e);
    }
    Flow::Continue
}

fn run(
    jobs: &mut JobTable,
    plan: &CommandPlan<'_>,
    cmd_text: &str,
    out: &mut dyn Write,
) -> Result<(), ExecError> {
    let _ = out.flush();
    let mask = SigchldBlock::new().map_err(ExecError::SignalMask)?;

    match &plan.stages {
        Stages::Single(args) => {
            let pid = fork_child(&mask, args, Wiring::Inherit)?;
            finish(jobs, &[pid], plan.background, cmd_text, out);
        }
        Stages::Pipe(first, second) => {
            let (read, write) = open_pipe()?;

            let first_pid = match fork_child(&mask, first, Wiring::StdoutTo { read, write }) {
                Ok(pid) => pid,
                Err(e) => {
                    close_pipe(read, write);
                    return Err(e);
                }
            };
            let second = fork_child(&mask, second, Wiring::StdinFrom { read, write });

            // 親はパイプのデータに関与しない
            close_pipe(read, write);

            match second {
                Ok(second_pid) => {
                    finish(jobs, &[first_pid, second_pid], plan.background, cmd_text, out);
                }
                Err(e) => {
                    settle_orphaned_stage(first_pid, plan.background);
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}

/// 後段の起動に失敗したパイプラインの前段を始末する。
///
/// foreground なら前段の終了を待つ。background なら登録せず reaper に任せる。
fn settle_orphaned_stage(pid: pid_t, background: bool) {
    if !background {
        wait_foreground(pid);
    }
}

/// 起動済みの子を待機するか、最後の子をジョブとして登録する。
fn finish(jobs: &mut JobTable, pids: &[pid_t], background: bool, cmd_text: &str, out: &mut dyn Write) {
    if !background {
        for &pid in pids {
            wait_foreground(pid);
        }
        return;
    }

    // パイプラインは後段だけを代表として追跡する
    let Some(&pid) = pids.last() else { return };
    let _ = match jobs.register(pid, cmd_text) {
        Ok(id) => writeln!(out, "[{}] {}", id, pid),
        Err(e) => writeln!(out, "myshell: {}", e),
    };
    let _ = out.flush();
}
