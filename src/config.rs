//! 起動時設定。環境変数から読み込む。
//!
//! | 変数 | 既定値 | 内容 |
//! |------|--------|------|
//! | `MYSHELL_MAX_JOBS` | `20` | ジョブテーブルの容量（1 以上） |
//! | `MYSHELL_PROMPT` | `-> ` | プロンプト文字列 |
//! | `MYSHELL_LOG` | `warn` | ログフィルタ（`tracing_subscriber::EnvFilter` 形式、`main.rs` で使用） |
//!
//! 不正な値は既定値にフォールバックし、`warn!` で記録する。

use tracing::warn;

/// ジョブテーブルの既定容量。
pub const DEFAULT_MAX_JOBS: usize = 20;
/// 既定のプロンプト。
pub const DEFAULT_PROMPT: &str = "-> ";
/// ログフィルタを読む環境変数名。
pub const LOG_ENV: &str = "MYSHELL_LOG";

const MAX_JOBS_ENV: &str = "MYSHELL_MAX_JOBS";
const PROMPT_ENV: &str = "MYSHELL_PROMPT";

/// シェルの設定値。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// ジョブテーブルのスロット数。
    pub max_jobs: usize,
    /// 入力待ちの前に表示する文字列。
    pub prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// プロセスの環境変数から読み込む。
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// `(名前, 値)` の列から読み込む。未知の変数は無視する。
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                MAX_JOBS_ENV => match value.trim().parse::<usize>() {
                    Ok(n) if n > 0 => config.max_jobs = n,
                    _ => warn!(
                        value,
                        default = DEFAULT_MAX_JOBS,
                        "invalid MYSHELL_MAX_JOBS; using default"
                    ),
                },
                PROMPT_ENV => config.prompt = value.to_string(),
                _ => {}
            }
        }
        config
    }
}
