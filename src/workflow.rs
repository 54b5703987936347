// The two workflows offered by the service and how each one reads a
// progress snapshot.

use crate::progress::ProgressInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    /// Pair invoices with their screenshots into one PDF.
    Merge,
    /// Pull invoice fields out into a text report.
    Extract,
}

/// What a single progress snapshot means for a given workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Still running. `None` when the server sent no percentage.
    Advance(Option<u8>),
    Done,
    Partial(Vec<String>),
    Failed(String),
    /// Not a status this workflow reacts to.
    Ignore,
}

impl Workflow {
    pub const ALL: [Workflow; 2] = [Workflow::Merge, Workflow::Extract];

    pub fn name(self) -> &'static str {
        match self {
            Workflow::Merge => "merge",
            Workflow::Extract => "extract",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Workflow::Merge => "合并发票与截图",
            Workflow::Extract => "提取发票信息",
        }
    }

    pub fn submit_path(self) -> &'static str {
        match self {
            Workflow::Merge => "/api/merge",
            Workflow::Extract => "/api/extract",
        }
    }

    /// Extension used for the downloaded result when the server does not
    /// name the file.
    pub fn download_extension(self) -> &'static str {
        match self {
            Workflow::Merge => "pdf",
            Workflow::Extract => "txt",
        }
    }

    pub fn classify(self, info: &ProgressInfo) -> Step {
        match (self, info) {
            (Workflow::Merge, ProgressInfo::Uploading { pct }) => Step::Advance(*pct),
            (_, ProgressInfo::Processing { pct }) => Step::Advance(*pct),
            (_, ProgressInfo::Done) => Step::Done,
            (Workflow::Merge, ProgressInfo::Partial { unpaired }) => Step::Partial(unpaired.clone()),
            (_, ProgressInfo::Error { error }) => Step::Failed(error.clone().unwrap_or_default()),
            (Workflow::Extract, ProgressInfo::Uploading { .. })
            | (Workflow::Extract, ProgressInfo::Partial { .. })
            | (_, ProgressInfo::Unknown) => Step::Ignore,
        }
    }

    pub fn empty_selection_message(self) -> &'static str {
        match self {
            Workflow::Merge => "请先选择一个文件夹。",
            Workflow::Extract => "请先选择文件夹。",
        }
    }

    pub fn done_message(self) -> &'static str {
        match self {
            Workflow::Merge => "合并完成，正在下载…",
            Workflow::Extract => "提取完成，正在下载…",
        }
    }

    pub fn failed_message(self, error: &str) -> String {
        match self {
            Workflow::Merge => format!("合并失败：{error}"),
            Workflow::Extract => format!("提取失败：{error}"),
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn partial_message(unpaired: &[String]) -> String {
    let mut text = format!("已合并，但有 {} 个文件未处理，正在下载…", unpaired.len());
    for name in unpaired {
        text.push_str("\n• ");
        text.push_str(name);
    }
    text
}

pub fn submit_failed_message(status_text: &str) -> String {
    format!("上传失败：{status_text}")
}

pub const NETWORK_ERROR_MESSAGE: &str = "网络错误，上传失败。";

pub fn download_failed_message(reason: &str) -> String {
    format!("下载失败：{reason}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_tracks_uploading_and_partial() {
        let merge = Workflow::Merge;
        assert_eq!(
            merge.classify(&ProgressInfo::Uploading { pct: Some(10) }),
            Step::Advance(Some(10))
        );
        assert_eq!(
            merge.classify(&ProgressInfo::Partial {
                unpaired: vec!["a.txt".into()]
            }),
            Step::Partial(vec!["a.txt".into()])
        );
    }

    #[test]
    fn extract_ignores_uploading_and_partial() {
        let extract = Workflow::Extract;
        assert_eq!(
            extract.classify(&ProgressInfo::Uploading { pct: Some(10) }),
            Step::Ignore
        );
        assert_eq!(
            extract.classify(&ProgressInfo::Partial { unpaired: vec![] }),
            Step::Ignore
        );
        assert_eq!(
            extract.classify(&ProgressInfo::Processing { pct: Some(55) }),
            Step::Advance(Some(55))
        );
        assert_eq!(extract.classify(&ProgressInfo::Done), Step::Done);
    }

    #[test]
    fn error_without_text_is_empty() {
        assert_eq!(
            Workflow::Extract.classify(&ProgressInfo::Error { error: None }),
            Step::Failed(String::new())
        );
        assert_eq!(Workflow::Extract.failed_message("x"), "提取失败：x");
    }

    #[test]
    fn partial_message_lists_every_file() {
        let text = partial_message(&["a.txt".into(), "b.txt".into()]);
        assert!(text.starts_with("已合并，但有 2 个文件未处理"));
        assert!(text.contains("• a.txt"));
        assert!(text.contains("• b.txt"));
    }
}
