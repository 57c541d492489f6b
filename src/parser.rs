//! トークナイザとコマンドプランナー。
//!
//! 入力行を空白区切りのトークン列（ゼロコピーの `&str`）に分割し、
//! executor が使う [`CommandPlan`] に変換する。
//!
//! ## 対応構文
//!
//! - バックグラウンド実行: 末尾トークンが `&`
//! - パイプライン: 最初の `|` で 2 段に分割（2 つ目以降の `|` は後段の引数のまま）
//! - リダイレクト: `< file`, `> file`（[`parse_redirections`]、子プロセス側で解釈）
//!
//! クォート・エスケープ・変数展開はない。

/// トークン区切り文字（空白、タブ、CR、LF、BEL）。
const DELIMITERS: &[char] = &[' ', '\t', '\r', '\n', '\x07'];

/// 入力行をトークン列に分割する。空トークンは生成しない。
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split(DELIMITERS).filter(|t| !t.is_empty()).collect()
}

// ── プラン ───────────────────────────────────────────────────────────

/// 実行するプロセスの構成。
#[derive(Debug, PartialEq, Eq)]
pub enum Stages<'a> {
    /// 単一コマンド。
    Single(Vec<&'a str>),
    /// `first | second` の 2 段パイプライン。
    Pipe(Vec<&'a str>, Vec<&'a str>),
}

/// 外部コマンド 1 行分の実行計画。
#[derive(Debug, PartialEq, Eq)]
pub struct CommandPlan<'a> {
    /// 末尾に `&` が指定された場合に `true`。
    pub background: bool,
    pub stages: Stages<'a>,
}

/// トークン列を実行計画に変換する。
///
/// 1. 末尾の `&` を取り除いてバックグラウンド指定とする
/// 2. 最初の `|` で前段・後段に分割する
pub fn plan<'a>(tokens: &[&'a str]) -> CommandPlan<'a> {
    let (background, tokens) = match tokens.split_last() {
        Some((&"&", rest)) => (true, rest),
        _ => (false, tokens),
    };

    let stages = match tokens.iter().position(|&t| t == "|") {
        Some(pos) => Stages::Pipe(tokens[..pos].to_vec(), tokens[pos + 1..].to_vec()),
        None => Stages::Single(tokens.to_vec()),
    };

    CommandPlan { background, stages }
}

// ── リダイレクト ─────────────────────────────────────────────────────

/// リダイレクト解釈後のコマンド。
#[derive(Debug, PartialEq, Eq)]
pub struct Redirections<'a, 'b> {
    /// 実行する argv。最初のリダイレクト演算子の手前で切り詰められる。
    pub argv: &'b [&'a str],
    /// `<` の後のパス。
    pub input: Option<&'a str>,
    /// `>` の後のパス。
    pub output: Option<&'a str>,
}

/// argv から `<` / `>` とそのパスを取り出す。
///
/// 走査は 1 回。同じ演算子が複数あれば後のものが有効。
/// 演算子が末尾にありパスがない場合は何も記録しない（argv の切り詰めは行う）。
pub fn parse_redirections<'a, 'b>(args: &'b [&'a str]) -> Redirections<'a, 'b> {
    let mut end = args.len();
    let mut input = None;
    let mut output = None;

    for (i, &arg) in args.iter().enumerate() {
        let slot = match arg {
            "<" => &mut input,
            ">" => &mut output,
            _ => continue,
        };
        end = end.min(i);
        if let Some(&path) = args.get(i + 1) {
            *slot = Some(path);
        }
    }

    Redirections {
        argv: &args[..end],
        input,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(tokenize("ls  -l\t/tmp\n"), vec!["ls", "-l", "/tmp"]);
    }

    #[test]
    fn tokenize_empty_line() {
        assert!(tokenize("   \n").is_empty());
    }

    #[test]
    fn tokenize_keeps_operators_glued() {
        // クォートも演算子分割もしない
        assert_eq!(tokenize("sleep 1&"), vec!["sleep", "1&"]);
    }

    #[test]
    fn plan_single_foreground() {
        let p = plan(&["echo", "hi"]);
        assert!(!p.background);
        assert_eq!(p.stages, Stages::Single(vec!["echo", "hi"]));
    }

    #[test]
    fn plan_trailing_ampersand() {
        let p = plan(&["sleep", "1", "&"]);
        assert!(p.background);
        assert_eq!(p.stages, Stages::Single(vec!["sleep", "1"]));
    }

    #[test]
    fn plan_ampersand_not_trailing() {
        let p = plan(&["echo", "&", "x"]);
        assert!(!p.background);
        assert_eq!(p.stages, Stages::Single(vec!["echo", "&", "x"]));
    }

    #[test]
    fn plan_pipe() {
        let p = plan(&["ls", "|", "wc", "-l", "&"]);
        assert!(p.background);
        assert_eq!(p.stages, Stages::Pipe(vec!["ls"], vec!["wc", "-l"]));
    }

    #[test]
    fn plan_second_pipe_stays_in_second_stage() {
        let p = plan(&["a", "|", "b", "|", "c"]);
        assert_eq!(p.stages, Stages::Pipe(vec!["a"], vec!["b", "|", "c"]));
    }

    #[test]
    fn redirections_none() {
        let args = ["cat", "file"];
        let r = parse_redirections(&args);
        assert_eq!(r.argv, &["cat", "file"]);
        assert_eq!(r.input, None);
        assert_eq!(r.output, None);
    }

    #[test]
    fn redirections_both_any_order() {
        let args = ["sort", ">", "out", "<", "in"];
        let r = parse_redirections(&args);
        assert_eq!(r.argv, &["sort"]);
        assert_eq!(r.input, Some("in"));
        assert_eq!(r.output, Some("out"));
    }

    #[test]
    fn redirections_truncate_trailing_args() {
        let args = ["cat", "<", "in", "extra"];
        let r = parse_redirections(&args);
        assert_eq!(r.argv, &["cat"]);
        assert_eq!(r.input, Some("in"));
    }

    #[test]
    fn redirections_last_wins() {
        let args = ["echo", "x", ">", "a", ">", "b"];
        let r = parse_redirections(&args);
        assert_eq!(r.argv, &["echo", "x"]);
        assert_eq!(r.output, Some("b"));
    }

    #[test]
    fn redirection_without_target() {
        let args = ["echo", "x", ">"];
        let r = parse_redirections(&args);
        assert_eq!(r.argv, &["echo", "x"]);
        assert_eq!(r.output, None);
    }
}
