//! シェルの状態とコマンドディスパッチ。
//!
//! [`Shell`] は設定とジョブテーブルを保持する。[`Shell::dispatch`] が 1 行分のトークン列を
//! ビルトイン（[`builtins::try_exec`]）か外部コマンド（[`executor::execute`]）に振り分ける。

use std::io::Write;

use tracing::debug;

use crate::builtins;
use crate::config::Config;
use crate::executor;
use crate::job::JobTable;

/// 1 行を処理したあとの制御。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 次の行を読む。
    Continue,
    /// シェルを終了する（`exit` ビルトインのみ）。
    Exit,
}

/// シェルの実行状態。REPLループ全体で共有される。
pub struct Shell {
    /// 起動時設定。
    pub config: Config,
    /// ジョブテーブル。バックグラウンドジョブを管理する。
    pub jobs: JobTable,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        let jobs = JobTable::new(config.max_jobs);
        Self { config, jobs }
    }

    /// トークン列を実行する。空行は何もしない。
    ///
    /// `raw` は入力行（改行除去済み）で、バックグラウンドジョブの表示に使う。
    /// ビルトインと通知の出力は `out` に書く。
    pub fn dispatch(&mut self, tokens: &[&str], raw: &str, out: &mut dyn Write) -> Flow {
        let Some(&name) = tokens.first() else {
            return Flow::Continue;
        };
        if let Some(flow) = builtins::try_exec(self, tokens, out) {
            debug!(name, "builtin");
            return flow;
        }
        executor::execute(&mut self.jobs, tokens, raw, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> Shell {
        Shell::new(Config {
            max_jobs: 3,
            ..Config::default()
        })
    }

    #[test]
    fn empty_line_continues() {
        let mut sh = shell();
        let mut out = Vec::new();
        assert_eq!(sh.dispatch(&[], "", &mut out), Flow::Continue);
        assert!(out.is_empty());
    }

    #[test]
    fn exit_stops_the_loop() {
        let mut sh = shell();
        let mut out = Vec::new();
        assert_eq!(sh.dispatch(&["exit"], "exit", &mut out), Flow::Exit);
    }

    #[test]
    fn table_capacity_comes_from_config() {
        assert_eq!(shell().jobs.capacity(), 3);
    }

    #[test]
    fn external_command_is_executed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path_str = path.to_str().unwrap();
        let mut sh = shell();
        let mut out = Vec::new();

        let tokens = ["echo", "hi", ">", path_str];
        assert_eq!(sh.dispatch(&tokens, "echo hi", &mut out), Flow::Continue);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi\n");
    }
}
