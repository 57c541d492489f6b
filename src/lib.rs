//! myshell ライブラリ: バイナリ・テスト・ベンチマーク用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`config`] | 起動時設定（`MYSHELL_MAX_JOBS`, `MYSHELL_PROMPT`） |
//! | [`parser`] | トークン分割、`&` / `|` による実行計画、`<` / `>` の解釈 |
//! | [`job`] | 固定長ジョブテーブル（シグナルハンドラと共有する atomic ステータス） |
//! | [`reaper`] | SIGCHLD ハンドラによる子プロセス回収、SIGCHLD の一時保留 |
//! | [`launch`] | 子プロセス側のリダイレクト適用と `execvp` |
//! | [`executor`] | 単一コマンド / 2 段パイプラインの起動、フォアグラウンド待機、ジョブ登録 |
//! | [`builtins`] | ビルトイン（`cd`, `help`, `exit`, `jobs`） |
//! | [`shell`] | シェルの状態とディスパッチ |

pub mod builtins;
pub mod config;
pub mod executor;
pub mod job;
pub mod launch;
pub mod parser;
pub mod reaper;
pub mod shell;
