//! 子プロセス側のリダイレクト適用とプログラム起動（`execvp`）。
//!
//! [`Launch::prepare`] は親プロセスで argv とリダイレクト先の `CString` を組み立てる。
//! [`Launch::exec`] は fork 直後の子プロセスで呼び、ファイルを開いて標準入出力に
//! 付け替えたあとプロセスイメージを置き換える。成功時は戻らないため、
//! 戻り値は `Result<Infallible, LaunchError>` で、`Ok` は構築できない。
//!
//! ## 構成
//!
//! | 型 | 役割 |
//! |-----|------|
//! | [`LaunchError`] | リダイレクト・exec の失敗 |
//! | [`Launch`] | 準備済みの argv とリダイレクト先 |

use std::convert::Infallible;
use std::ffi::CString;
use std::io;

use crate::parser::parse_redirections;

// ── エラー型 ──────────────────────────────────────────────────────

/// 子プロセスの起動失敗。子はこれを報告して終了する。
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// リダイレクトを除くと argv が空。
    #[error("empty command")]
    EmptyCommand,
    /// 引数に NUL バイトが含まれる。
    #[error("{0}: argument contains a NUL byte")]
    InvalidArgument(String),
    /// リダイレクト先ファイルを開けない、または付け替えられない。
    #[error("{path}: {source}")]
    Redirect {
        path: String,
        #[source]
        source: io::Error,
    },
    /// `execvp` の失敗（コマンドが見つからない、実行権限がない等）。
    #[error("{command}: {source}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },
}

impl LaunchError {
    /// 子プロセスの終了ステータス。
    /// 127 = command not found, 126 = permission denied, 1 = その他。
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Exec { source, .. } => match source.raw_os_error() {
                Some(libc::ENOENT) => 127,
                Some(libc::EACCES) => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}

// ── Argv ──────────────────────────────────────────────────────────

/// `execvp` に渡す NULL 終端ポインタ配列。
struct Argv {
    strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl Argv {
    fn from_args(args: &[&str]) -> Result<Self, LaunchError> {
        let strings = args
            .iter()
            .map(|&s| CString::new(s).map_err(|_| LaunchError::InvalidArgument(s.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null()); // NULL 終端
        Ok(Self { strings, ptrs })
    }

    fn program(&self) -> &CString {
        &self.strings[0]
    }
}

fn c_path(path: &str) -> Result<CString, LaunchError> {
    CString::new(path).map_err(|_| LaunchError::InvalidArgument(path.to_string()))
}

// ── Launch ────────────────────────────────────────────────────────

/// 起動準備済みのコマンド。
pub struct Launch {
    argv: Argv,
    input: Option<CString>,
    output: Option<CString>,
}

impl Launch {
    /// argv を解釈し、`<` / `>` を取り除いた起動情報を作る。
    ///
    /// メモリ確保はここで済ませ、fork 後の [`exec`](Self::exec) の成功経路では確保しない。
    pub fn prepare(args: &[&str]) -> Result<Self, LaunchError> {
        let redirs = parse_redirections(args);
        if redirs.argv.is_empty() {
            return Err(LaunchError::EmptyCommand);
        }
        Ok(Self {
            argv: Argv::from_args(redirs.argv)?,
            input: redirs.input.map(c_path).transpose()?,
            output: redirs.output.map(c_path).transpose()?,
        })
    }

    /// リダイレクトを適用してプロセスイメージを置き換える。
    ///
    /// 入力ファイルを先に開くため、入力が開けなければ出力ファイルは作られない。
    /// 戻ってくるのは失敗時だけ。
    pub fn exec(&self) -> Result<Infallible, LaunchError> {
        if let Some(path) = &self.input {
            redirect(path, libc::O_RDONLY, libc::STDIN_FILENO)?;
        }
        if let Some(path) = &self.output {
            redirect(
                path,
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                libc::STDOUT_FILENO,
            )?;
        }

        unsafe {
            libc::execvp(self.argv.program().as_ptr(), self.argv.ptrs.as_ptr());
        }
        Err(LaunchError::Exec {
            command: self.argv.program().to_string_lossy().into_owned(),
            source: io::Error::last_os_error(),
        })
    }
}

/// `path` を開き、`target_fd` に付け替えて元の fd を閉じる。
fn redirect(path: &CString, flags: libc::c_int, target_fd: libc::c_int) -> Result<(), LaunchError> {
    let fail = |source| LaunchError::Redirect {
        path: path.to_string_lossy().into_owned(),
        source,
    };

    let fd = unsafe { libc::open(path.as_ptr(), flags, 0o644 as libc::c_uint) };
    if fd < 0 {
        return Err(fail(io::Error::last_os_error()));
    }
    if fd != target_fd {
        let ret = unsafe { libc::dup2(fd, target_fd) };
        let err = io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        if ret < 0 {
            return Err(fail(err));
        }
    }
    Ok(())
}
