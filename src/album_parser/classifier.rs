//! 站点族与页面形态识别。
//!
//! 只看两类信号：页面标题里的站点标记，以及单文件页特有的结构标记
//! （媒体图标 / lightbox 容器）。识别不了的一律按通用画廊（Cyberdrop）
//! 处理，走最简单的锚点枚举。

use std::sync::OnceLock;

use scraper::{Html, Selector};
use url::Url;

/// 站点族。Bunkr 是主站族（结构级联解析），
/// Cyberdrop 兼作通用画廊族的兜底。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFamily {
    Bunkr,
    Cyberdrop,
}

/// 页面形态：单文件页或多条目相册页。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    SingleFile,
    Album,
}

/// 一次抓取得到的已分类列表页。枚举完即丢弃。
pub struct ListingPage {
    pub family: SiteFamily,
    pub kind: PageKind,
    pub url: Url,
    document: Html,
}

impl ListingPage {
    /// 解析并分类一个列表页。调用方保证抓取已经成功（非 2xx 在抓取层报错）。
    pub fn parse(url: Url, body: &str) -> Self {
        let document = Html::parse_document(body);
        let (family, kind) = classify(&url, &document);
        Self {
            family,
            kind,
            url,
            document,
        }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }
}

fn classify(url: &Url, document: &Html) -> (SiteFamily, PageKind) {
    let title = document
        .select(sel_title())
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();

    let host = url.host_str().unwrap_or_default();
    let is_bunkr = title.contains("Bunkr") || host.contains("bunkr");
    if !is_bunkr {
        return (SiteFamily::Cyberdrop, PageKind::Album);
    }

    // 单文件页的结构标记：媒体图标或 lightbox 容器
    let single = document.select(sel_single_icon()).next().is_some()
        || document.select(sel_lightgallery()).next().is_some();
    let kind = if single {
        PageKind::SingleFile
    } else {
        PageKind::Album
    };
    (SiteFamily::Bunkr, kind)
}

fn sel_title() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("title").unwrap())
}

fn sel_single_icon() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("span.ic-videos").unwrap())
}

fn sel_lightgallery() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("div.lightgallery").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, body: &str) -> ListingPage {
        ListingPage::parse(Url::parse(url).unwrap(), body)
    }

    #[test]
    fn bunkr_album_from_title() {
        let page = page(
            "https://example.org/a/abc",
            "<html><head><title>Album | Bunkr</title></head><body></body></html>",
        );
        assert_eq!(page.family, SiteFamily::Bunkr);
        assert_eq!(page.kind, PageKind::Album);
    }

    #[test]
    fn bunkr_single_file_via_video_icon() {
        let page = page(
            "https://bunkr.sk/f/xyz",
            r#"<html><head><title>clip.mp4 | Bunkr</title></head>
               <body><span class="ic-videos"></span></body></html>"#,
        );
        assert_eq!(page.family, SiteFamily::Bunkr);
        assert_eq!(page.kind, PageKind::SingleFile);
    }

    #[test]
    fn bunkr_single_file_via_lightgallery() {
        let page = page(
            "https://bunkr.sk/f/xyz",
            r#"<html><head><title>pic.jpg | Bunkr</title></head>
               <body><div class="lightgallery"></div></body></html>"#,
        );
        assert_eq!(page.kind, PageKind::SingleFile);
    }

    #[test]
    fn bunkr_host_without_title_marker() {
        let page = page(
            "https://bunkr.ru/a/abc",
            "<html><head><title>whatever</title></head><body></body></html>",
        );
        assert_eq!(page.family, SiteFamily::Bunkr);
    }

    #[test]
    fn unknown_site_falls_back_to_generic_gallery() {
        let page = page(
            "https://cyberdrop.me/a/abc",
            "<html><head><title>Some album</title></head><body></body></html>",
        );
        assert_eq!(page.family, SiteFamily::Cyberdrop);
        assert_eq!(page.kind, PageKind::Album);
    }
}
