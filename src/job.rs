//! ジョブテーブル: バックグラウンドプロセスの固定長レジストリ。
//!
//! テーブルは 2 つの部分に分かれる。
//!
//! - [`JobSlots`]: スロットごとの PID とステータスを atomic で保持する共有部。
//!   SIGCHLD ハンドラ（[`reaper`](crate::reaper)）から [`JobSlots::mark_done`] で更新される。
//! - [`JobTable`]: メインループが所有する部分。コマンド文字列を保持し、
//!   登録（[`JobTable::register`]）・完了回収（[`JobTable::sweep`]）・一覧（[`JobTable::list_active`]）を行う。
//!
//! ## 状態遷移
//!
//! ```text
//! Free ──register──▶ Running ──mark_done (シグナル)──▶ Done ──sweep (同期)──▶ Free
//! ```
//!
//! シグナル文脈が書き込むのはステータスセルだけ。PID とコマンド文字列は
//! スロットが Free の間にメインループだけが書き換える。ロックは使わない。

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;

use libc::pid_t;
use tracing::{debug, warn};

// ── ステータス ───────────────────────────────────────────────────────

const FREE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;
const DONE: u8 = 3;

/// ジョブの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// 実行中。登録直後の状態。
    Running,
    /// 停止中。表現だけ持っており、この状態に遷移させる経路はない。
    Stopped,
    /// 終了済み。次の [`JobTable::sweep`] で通知・回収される。
    Done,
}

impl JobStatus {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            RUNNING => Some(Self::Running),
            STOPPED => Some(Self::Stopped),
            DONE => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Done => "Done",
        })
    }
}

// ── エラー型 ──────────────────────────────────────────────────────

/// ジョブ登録の失敗。
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// 空きスロットがない。プロセスは追跡されずに走り続ける。
    #[error("too many jobs")]
    TooManyJobs,
}

// ── 共有部 ───────────────────────────────────────────────────────────

/// 1 スロット分の共有状態。
struct Slot {
    pid: AtomicI32,
    state: AtomicU8,
}

/// シグナルハンドラと共有するスロット配列。
///
/// 生成後に長さは変わらない。[`mark_done`](Self::mark_done) は
/// メモリ確保・ブロッキング・I/O を一切行わないため、シグナルハンドラから呼べる。
pub struct JobSlots {
    slots: Box<[Slot]>,
}

impl JobSlots {
    fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                pid: AtomicI32::new(0),
                state: AtomicU8::new(FREE),
            })
            .collect();
        Self { slots }
    }

    /// `pid` を持つ最初の実行中スロットを Done にする。該当がなければ何もしない。
    ///
    /// async-signal-safe。書き込むのはステータスセルのみ。
    pub fn mark_done(&self, pid: pid_t) {
        for slot in self.slots.iter() {
            let state = slot.state.load(Ordering::Acquire);
            if state != RUNNING && state != STOPPED {
                continue;
            }
            if slot.pid.load(Ordering::Relaxed) != pid {
                continue;
            }
            // Done → Running には戻さない。失敗するのは既に Done の場合だけ。
            let _ = slot
                .state
                .compare_exchange(state, DONE, Ordering::AcqRel, Ordering::Acquire);
            return;
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn status(&self, index: usize) -> Option<JobStatus> {
        JobStatus::from_raw(self.slots[index].state.load(Ordering::Acquire))
    }
}

// ── JobTable ─────────────────────────────────────────────────────────

/// 回収されたジョブ。完了通知の表示に使う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    pub id: usize,
    pub command: String,
}

/// `jobs` ビルトインが表示する 1 行分。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveJob {
    pub id: usize,
    pub status: JobStatus,
    pub command: String,
}

/// ジョブテーブル。容量固定で、ジョブ ID は `スロット番号 + 1`。
///
/// [`Shell`](crate::shell::Shell) が所有する。共有部は [`slots`](Self::slots) で
/// 取り出して reaper に渡す。
pub struct JobTable {
    slots: Arc<JobSlots>,
    /// 各スロットの表示用コマンド文字列。メインループからのみ触る。
    commands: Vec<Option<String>>,
}

impl JobTable {
    /// `capacity` スロットのテーブルを作る。
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(JobSlots::new(capacity)),
            commands: vec![None; capacity],
        }
    }

    /// reaper と共有するスロット配列。
    pub fn slots(&self) -> Arc<JobSlots> {
        Arc::clone(&self.slots)
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// 最小番号の空きスロットにジョブを登録し、ジョブ ID を返す。
    ///
    /// PID とコマンド文字列を書いてから Running を release で公開するため、
    /// シグナルハンドラが書きかけのスロットを見ることはない。
    pub fn register(&mut self, pid: pid_t, command: &str) -> Result<usize, JobError> {
        for (index, slot) in self.slots.slots.iter().enumerate() {
            if slot.state.load(Ordering::Acquire) != FREE {
                continue;
            }
            slot.pid.store(pid, Ordering::Relaxed);
            self.commands[index] = Some(command.to_string());
            slot.state.store(RUNNING, Ordering::Release);

            let id = index + 1;
            debug!(id, pid, command, "job registered");
            return Ok(id);
        }
        warn!(pid, command, "job table full; process left untracked");
        Err(JobError::TooManyJobs)
    }

    /// [`JobSlots::mark_done`] と同じ。同期文脈から使う。
    pub fn mark_done(&self, pid: pid_t) {
        self.slots.mark_done(pid);
    }

    /// Done のスロットをスロット順に回収し、ID とコマンド文字列を返す。
    ///
    /// Done 以外のスロットには触れない。回収したスロットは Free に戻り、ID は再利用可能になる。
    pub fn sweep(&mut self) -> Vec<CompletedJob> {
        let mut completed = Vec::new();
        for (index, slot) in self.slots.slots.iter().enumerate() {
            if slot.state.load(Ordering::Acquire) != DONE {
                continue;
            }
            let command = self.commands[index].take().unwrap_or_default();
            slot.pid.store(0, Ordering::Relaxed);
            slot.state.store(FREE, Ordering::Release);
            debug!(id = index + 1, %command, "job swept");
            completed.push(CompletedJob {
                id: index + 1,
                command,
            });
        }
        completed
    }

    /// Running / Stopped のジョブをスロット順に返す。
    pub fn list_active(&self) -> Vec<ActiveJob> {
        (0..self.capacity())
            .filter_map(|index| match self.slots.status(index) {
                Some(status @ (JobStatus::Running | JobStatus::Stopped)) => Some(ActiveJob {
                    id: index + 1,
                    status,
                    command: self.commands[index].clone().unwrap_or_default(),
                }),
                _ => None,
            })
            .collect()
    }

    /// 占有中スロットのステータス（ID 指定）。空きスロットなら `None`。
    #[cfg(test)]
    fn status(&self, id: usize) -> Option<JobStatus> {
        if id == 0 || id > self.capacity() {
            return None;
        }
        self.slots.status(id - 1)
    }
}

// ── 表示ヘルパー ─────────────────────────────────────────────────────

/// Done ジョブを回収し、`[N] Done\tcommand` 形式で `out` に書く。
///
/// プロンプト表示前に毎回呼ぶ。書き込みに失敗した通知は捨てる（スロットは回収済み）。
pub fn report_done(jobs: &mut JobTable, out: &mut dyn Write) {
    for job in jobs.sweep() {
        let _ = writeln!(out, "[{}] {}\t{}", job.id, JobStatus::Done, job.command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_slot_index_plus_one() {
        let mut jobs = JobTable::new(4);
        for (i, pid) in [100, 101, 102, 103].into_iter().enumerate() {
            assert_eq!(jobs.register(pid, "sleep 1 &"), Ok(i + 1));
        }
    }

    #[test]
    fn register_rejects_when_full() {
        let mut jobs = JobTable::new(2);
        jobs.register(10, "a &").unwrap();
        jobs.register(11, "b &").unwrap();
        assert_eq!(jobs.register(12, "c &"), Err(JobError::TooManyJobs));

        let active = jobs.list_active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].command, "a &");
        assert_eq!(active[1].command, "b &");
    }

    #[test]
    fn mark_done_then_sweep_frees_slot() {
        let mut jobs = JobTable::new(3);
        jobs.register(10, "a &").unwrap();
        let id = jobs.register(11, "b &").unwrap();
        assert_eq!(id, 2);

        jobs.mark_done(11);
        assert_eq!(jobs.status(2), Some(JobStatus::Done));
        // Done は一覧に出ない
        assert_eq!(jobs.list_active().len(), 1);

        let done = jobs.sweep();
        assert_eq!(
            done,
            vec![CompletedJob {
                id: 2,
                command: "b &".to_string()
            }]
        );
        assert_eq!(jobs.status(2), None);

        // 解放された ID が再利用される
        assert_eq!(jobs.register(12, "c &"), Ok(2));
    }

    #[test]
    fn mark_done_unknown_pid_is_noop() {
        let mut jobs = JobTable::new(2);
        jobs.register(10, "a &").unwrap();
        jobs.mark_done(999);
        assert_eq!(jobs.status(1), Some(JobStatus::Running));
        assert!(jobs.sweep().is_empty());
    }

    #[test]
    fn sweep_leaves_running_jobs() {
        let mut jobs = JobTable::new(2);
        jobs.register(10, "a &").unwrap();
        assert!(jobs.sweep().is_empty());
        assert_eq!(jobs.status(1), Some(JobStatus::Running));
    }

    #[test]
    fn sweep_reports_once() {
        let mut jobs = JobTable::new(2);
        jobs.register(10, "a &").unwrap();
        jobs.mark_done(10);
        jobs.mark_done(10); // 二重通知でも Done のまま
        assert_eq!(jobs.sweep().len(), 1);
        assert!(jobs.sweep().is_empty());
    }

    #[test]
    fn sweep_preserves_slot_order() {
        let mut jobs = JobTable::new(3);
        jobs.register(10, "a &").unwrap();
        jobs.register(11, "b &").unwrap();
        jobs.register(12, "c &").unwrap();
        jobs.mark_done(12);
        jobs.mark_done(10);
        let ids: Vec<usize> = jobs.sweep().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn mark_done_through_shared_slots() {
        let mut jobs = JobTable::new(2);
        let shared = jobs.slots();
        jobs.register(42, "sleep 5 &").unwrap();
        shared.mark_done(42);
        assert_eq!(jobs.status(1), Some(JobStatus::Done));
    }

    #[test]
    fn report_done_formats_notice() {
        let mut jobs = JobTable::new(2);
        jobs.register(10, "sleep 1 &").unwrap();
        jobs.mark_done(10);
        let mut out = Vec::new();
        report_done(&mut jobs, &mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "[1] Done\tsleep 1 &\n");
    }

    #[test]
    fn status_out_of_range_is_none() {
        let jobs = JobTable::new(1);
        assert_eq!(jobs.status(0), None);
        assert_eq!(jobs.status(2), None);
    }
}
