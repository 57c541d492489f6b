//! myshell: パイプ・リダイレクト・バックグラウンドジョブに対応した小さなシェル
//!
//! REPLループ: 完了ジョブの通知 → プロンプト表示 → 1 行読み取り → トークン分割 → 実行 → ループ
//!
//! ログは `MYSHELL_LOG`（`tracing_subscriber::EnvFilter` 形式、既定 `warn`）で制御し、stderr に出す。

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use myshell::config::{self, Config};
use myshell::job;
use myshell::parser;
use myshell::reaper;
use myshell::shell::{Flow, Shell};

fn init_logging() {
    let filter = EnvFilter::try_from_env(config::LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let config = Config::from_env();
    debug!(?config, "starting");
    let mut shell = Shell::new(config);

    if let Err(e) = reaper::install(shell.jobs.slots()) {
        eprintln!("myshell: sigaction: {}", e);
        return ExitCode::FAILURE;
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        // プロンプト前に完了ジョブを通知し、スロットを解放する
        job::report_done(&mut shell.jobs, &mut stdout);

        print!("{}", shell.config.prompt);
        let _ = stdout.flush();

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                // EOF (Ctrl+D): 改行を出力して正常終了
                println!();
                return ExitCode::SUCCESS;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "failed to read input");
                eprintln!("myshell: read_line: {}", e);
                return ExitCode::FAILURE;
            }
        }

        let raw = line.split('\n').next().unwrap_or_default();
        let tokens = parser::tokenize(&line);
        if shell.dispatch(&tokens, raw, &mut stdout) == Flow::Exit {
            return ExitCode::SUCCESS;
        }
    }
}
