//! 基于行的文本合并
//!
//! 以本地内容为基准，只应用远程相对本地新增的行；删除一律不应用。
//! 两端结构差异较大时可能出现重复或错位的行，远程删除的行会被保留。

use crate::error::{Result, SyncError};
use similar::{capture_diff_slices, Algorithm, DiffOp};
use tracing::debug;

/// 合并结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub bytes: Vec<u8>,
    /// 插入到本地基准中的行数
    pub insertions: usize,
}

fn decode<'a>(name: &str, side: &str, bytes: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| SyncError::Merge {
        name: name.to_string(),
        message: format!("{} content is not valid UTF-8: {}", side, e),
    })
}

/// 合并本地与远程内容
pub fn merge(name: &str, local: &[u8], remote: &[u8]) -> Result<MergeOutcome> {
    let local_text = decode(name, "local", local)?;
    let remote_text = decode(name, "remote", remote)?;

    let local_lines: Vec<&str> = local_text.split('\n').collect();
    let remote_lines: Vec<&str> = remote_text.split('\n').collect();

    let mut merged = local_lines.clone();
    let mut inserted = 0usize;

    for op in capture_diff_slices(Algorithm::Myers, &local_lines, &remote_lines) {
        let (old_index, new_index, new_len) = match op {
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => (old_index, new_index, new_len),
            // 替换块：新行插在保留的旧行前面
            DiffOp::Replace {
                old_index,
                new_index,
                new_len,
                ..
            } => (old_index, new_index, new_len),
            DiffOp::Equal { .. } | DiffOp::Delete { .. } => continue,
        };

        let at = old_index + inserted;
        let lines = &remote_lines[new_index..new_index + new_len];
        merged.splice(at..at, lines.iter().copied());
        inserted += new_len;
    }

    debug!("合并 {}: 插入 {} 行", name, inserted);

    Ok(MergeOutcome {
        bytes: merged.join("\n").into_bytes(),
        insertions: inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_lines(local: &[&str], remote: &[&str]) -> Vec<String> {
        let outcome = merge("t.md", local.join("\n").as_bytes(), remote.join("\n").as_bytes())
            .unwrap();
        String::from_utf8(outcome.bytes)
            .unwrap()
            .split('\n')
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_insertion_is_applied() {
        assert_eq!(merge_lines(&["a", "b"], &["a", "x", "b"]), vec!["a", "x", "b"]);
    }

    #[test]
    fn test_deletion_is_ignored() {
        assert_eq!(merge_lines(&["a", "b"], &["a"]), vec!["a", "b"]);
    }

    #[test]
    fn test_multiple_insertions_keep_positions() {
        assert_eq!(
            merge_lines(&["a", "c", "e"], &["a", "b", "c", "d", "e", "f"]),
            vec!["a", "b", "c", "d", "e", "f"]
        );
    }

    #[test]
    fn test_replacement_keeps_local_line() {
        let merged = merge_lines(&["a", "b", "c"], &["a", "B", "c"]);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.first().map(String::as_str), Some("a"));
        assert_eq!(merged.last().map(String::as_str), Some("c"));
        assert!(merged.contains(&"b".to_string()));
        assert!(merged.contains(&"B".to_string()));
    }

    #[test]
    fn test_identical_input() {
        let outcome = merge("t.md", b"same\ntext\n", b"same\ntext\n").unwrap();
        assert_eq!(outcome.bytes, b"same\ntext\n");
        assert_eq!(outcome.insertions, 0);
    }

    #[test]
    fn test_insertion_count() {
        let outcome = merge("t.md", b"a\nb", b"x\na\ny\nb").unwrap();
        assert_eq!(outcome.insertions, 2);
        assert_eq!(outcome.bytes, b"x\na\ny\nb");
    }

    #[test]
    fn test_invalid_utf8_is_merge_error() {
        let err = merge("bin.dat", &[0xff, 0xfe], b"ok").unwrap_err();
        assert!(matches!(err, SyncError::Merge { .. }));
        assert!(err.is_io());
        assert!(err.to_string().contains("bin.dat"));
    }
}
