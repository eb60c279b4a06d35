use std::fmt;

/// ログのカテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// 受信したリクエスト
    Info,
    /// 外部サービスへのリクエスト
    Service,
    /// トランザクションのサマリー
    Summary,
}

impl Category {
    /// すべてのカテゴリ
    pub const ALL: [Category; 3] = [Category::Info, Category::Service, Category::Summary];

    /// ベースパスからの相対的なアクティブファイルのパスを返却する。
    pub fn subpath(&self) -> &'static str {
        match self {
            Category::Info => "info/log.info",
            Category::Service => "service/log.service",
            Category::Summary => "summary/log.sum",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Info => "info",
            Category::Service => "service",
            Category::Summary => "summary",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Category::Info => 0,
            Category::Service => 1,
            Category::Summary => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subpath() {
        assert_eq!("info/log.info", Category::Info.subpath());
        assert_eq!("service/log.service", Category::Service.subpath());
        assert_eq!("summary/log.sum", Category::Summary.subpath());
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, category) in Category::ALL.iter().enumerate() {
            assert_eq!(i, category.index());
        }
    }
}
