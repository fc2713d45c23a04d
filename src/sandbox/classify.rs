//! 编译输出分类
//!
//! 失败时 stderr 的非空行即错误列表；成功时 stdout 中包含 "warning"（不区分大小写）的行即警告。
//! 警告判定只是子串匹配，可能误收非警告行，保持原样不做更严格的推断。

pub fn error_lines(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

pub fn warning_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.to_lowercase().contains("warning"))
        .map(|line| line.trim().to_string())
        .collect()
}
