//! 翻页控件解析与下一页 URL 计算。
//!
//! 当前页号取列表 URL 的 `page` 查询参数（缺省为 1），
//! 末页号取翻页控件里数字标签的最大值；到达末页即终止。
//! 驱动方用显式循环走页，不用递归。

use std::sync::OnceLock;

use scraper::{Html, Selector};
use url::Url;

/// 计算下一页 URL。返回 None 表示没有下一页。
/// `page` 参数存在则替换，不存在则追加；其余查询参数原样保留。
pub fn next_page_url(url: &Url, document: &Html) -> Option<Url> {
    let last = last_page(document)?;
    let current = current_page(url);
    if current >= last {
        return None;
    }
    Some(with_page_param(url, current + 1))
}

/// 列表 URL 当前的页号；没有 `page` 参数视作第 1 页。
pub fn current_page(url: &Url) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(1)
}

/// 翻页控件声明的末页号：取所有数字标签的最大值。
/// 没有控件或控件里没有数字标签即视为单页。
pub fn last_page(document: &Html) -> Option<u32> {
    document
        .select(sel_page_link())
        .filter_map(|el| el.text().collect::<String>().trim().parse::<u32>().ok())
        .max()
}

fn with_page_param(url: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = url.clone();
    {
        let mut pairs = next.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept);
        pairs.append_pair("page", &page.to_string());
    }
    next
}

fn sel_page_link() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("ul.pagination a").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_PAGES: &str = r#"<html><body>
        <ul class="pagination">
          <li><a href="?page=1">1</a></li>
          <li><a href="?page=2">2</a></li>
          <li><a href="?page=3">3</a></li>
          <li><a href="?page=2">&raquo;</a></li>
        </ul></body></html>"#;

    #[test]
    fn adds_page_param_when_absent() {
        let document = Html::parse_document(THREE_PAGES);
        let url = Url::parse("https://bunkr.sk/a/demo").unwrap();
        let next = next_page_url(&url, &document).unwrap();
        assert_eq!(next.as_str(), "https://bunkr.sk/a/demo?page=2");
    }

    #[test]
    fn replaces_existing_page_param() {
        let document = Html::parse_document(THREE_PAGES);
        let url = Url::parse("https://bunkr.sk/a/demo?sort=date&page=2").unwrap();
        let next = next_page_url(&url, &document).unwrap();
        assert_eq!(next.as_str(), "https://bunkr.sk/a/demo?sort=date&page=3");
    }

    #[test]
    fn stops_at_last_page() {
        let document = Html::parse_document(THREE_PAGES);
        let url = Url::parse("https://bunkr.sk/a/demo?page=3").unwrap();
        assert!(next_page_url(&url, &document).is_none());
    }

    #[test]
    fn no_control_means_single_page() {
        let document = Html::parse_document("<html><body></body></html>");
        let url = Url::parse("https://bunkr.sk/a/demo").unwrap();
        assert!(next_page_url(&url, &document).is_none());
    }

    #[test]
    fn walk_terminates_without_revisiting() {
        // 3 页的列表最多推进 2 次，页号严格递增
        let document = Html::parse_document(THREE_PAGES);
        let mut url = Url::parse("https://bunkr.sk/a/demo").unwrap();
        let mut visited = vec![current_page(&url)];
        while let Some(next) = next_page_url(&url, &document) {
            let page = current_page(&next);
            assert!(!visited.contains(&page));
            visited.push(page);
            url = next;
            assert!(visited.len() <= 3);
        }
        assert_eq!(visited, [1, 2, 3]);
    }
}
