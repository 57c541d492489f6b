//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずシェルのプロセス内で直接実行される。
//! `try_exec()` が `Some(flow)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。

use std::env;
use std::io::Write;

use crate::shell::{Flow, Shell};

/// ビルトイン名の一覧（`help` の表示順）。
pub const BUILTINS: [&str; 4] = ["cd", "help", "exit", "jobs"];

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `Some(flow)`: ビルトインとして実行済み
/// - `None`: 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec(shell: &mut Shell, args: &[&str], out: &mut dyn Write) -> Option<Flow> {
    let flow = match *args.first()? {
        "cd" => builtin_cd(args),
        "help" => builtin_help(out),
        "exit" => Flow::Exit,
        "jobs" => builtin_jobs(shell, out),
        _ => return None,
    };
    Some(flow)
}

/// `cd dir`: カレントディレクトリを変更する。引数は必須。
fn builtin_cd(args: &[&str]) -> Flow {
    match args.get(1) {
        None => eprintln!("myshell: expected argument to \"cd\""),
        Some(dir) => {
            if let Err(e) = env::set_current_dir(dir) {
                eprintln!("myshell: cd: {}: {}", dir, e);
            }
        }
    }
    Flow::Continue
}

fn builtin_help(out: &mut dyn Write) -> Flow {
    let _ = writeln!(out, "myshell - a small job-control shell");
    let _ = writeln!(out, "Supports pipes, I/O redirection, and basic job control.");
    let _ = writeln!(out, "Built-in commands: {}", BUILTINS.join(", "));
    Flow::Continue
}

/// `jobs`: 実行中・停止中のジョブを `[N] Status\tcommand` 形式で一覧表示する。
fn builtin_jobs(shell: &Shell, out: &mut dyn Write) -> Flow {
    for job in shell.jobs.list_active() {
        let _ = writeln!(out, "[{}] {}\t{}", job.id, job.status, job.command);
    }
    Flow::Continue
}
