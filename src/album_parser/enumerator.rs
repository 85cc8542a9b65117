//! 从列表页提取条目引用与相册显示名。
//!
//! 三种形态各有一套选择器；顺序保持文档序，这里不去重
//! （去重交给账本阶段）。

use std::sync::OnceLock;

use scraper::{ElementRef, Selector};
use time::OffsetDateTime;
use tracing::debug;

use super::classifier::{ListingPage, PageKind, SiteFamily};
use crate::download::models::{ItemRef, parse_upload_time};

const UNKNOWN_NAME: &str = "Unknown";

/// 枚举结果：条目序列 + 相册显示名（未清理，文件系统清理在建目录时做）。
#[derive(Debug)]
pub struct AlbumListing {
    pub name: String,
    pub items: Vec<ItemRef>,
}

pub fn enumerate(page: &ListingPage) -> AlbumListing {
    match (page.family, page.kind) {
        (SiteFamily::Bunkr, PageKind::SingleFile) => single_file(page),
        (SiteFamily::Bunkr, PageKind::Album) => bunkr_album(page),
        (SiteFamily::Cyberdrop, _) => generic_gallery(page),
    }
}

/// 单文件页：条目就是页面本身。
fn single_file(page: &ListingPage) -> AlbumListing {
    let name = first_text(page, sel_heading_large())
        .or_else(|| first_text(page, sel_heading_truncate()))
        .map(|s| clean_heading(&s))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    AlbumListing {
        name,
        items: vec![ItemRef::new(page.url.as_str())],
    }
}

/// Bunkr 相册页：每个条目盒子一个锚点。
fn bunkr_album(page: &ListingPage) -> AlbumListing {
    let mut items = Vec::new();
    for anchor in page.document().select(sel_item_box()) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let mut item = ItemRef::new(href);
        item.uploaded = uploaded_near(anchor);
        items.push(item);
    }

    // 标题元素第二行是文件数，截到第一个换行为止
    let name = first_text(page, sel_heading_truncate())
        .map(|s| clean_heading(&s))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    debug!("相册 \"{}\" 枚举到 {} 个条目", name, items.len());
    AlbumListing { name, items }
}

/// 通用画廊（Cyberdrop）：带 image 类的锚点，href 原样保留。
fn generic_gallery(page: &ListingPage) -> AlbumListing {
    let items = page
        .document()
        .select(sel_image_anchor())
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(ItemRef::new)
        .collect();

    let name = first_text(page, sel_title_heading())
        .map(|s| clean_heading(&s))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    AlbumListing { name, items }
}

/// 条目盒子里（或其父容器里）的上传时刻标注。
fn uploaded_near(anchor: ElementRef<'_>) -> Option<OffsetDateTime> {
    if let Some(found) = date_within(anchor) {
        return Some(found);
    }
    anchor
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(date_within)
}

fn date_within(el: ElementRef<'_>) -> Option<OffsetDateTime> {
    let date_el = el.select(sel_upload_date()).next()?;
    let raw = date_el.text().collect::<String>();
    parse_upload_time(&raw).ok()
}

fn first_text(page: &ListingPage, selector: &Selector) -> Option<String> {
    page.document()
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

fn clean_heading(raw: &str) -> String {
    let first_line = raw.split('\n').next().unwrap_or(raw).trim();
    if first_line.is_empty() {
        UNKNOWN_NAME.to_string()
    } else {
        first_line.to_string()
    }
}

fn sel_item_box() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse(r"a.after\:absolute").unwrap())
}

fn sel_image_anchor() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("a.image").unwrap())
}

fn sel_heading_large() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse(r"h1.text-\[20px\]").unwrap())
}

fn sel_heading_truncate() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("h1.truncate").unwrap())
}

fn sel_title_heading() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("h1#title").unwrap())
}

fn sel_upload_date() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("span.theDate").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn listing(url: &str, body: &str) -> ListingPage {
        ListingPage::parse(Url::parse(url).unwrap(), body)
    }

    #[test]
    fn bunkr_album_items_in_document_order() {
        let page = listing(
            "https://bunkr.sk/a/demo",
            r#"<html><head><title>Demo | Bunkr</title></head><body>
               <h1 class="truncate">Demo Album
12 files</h1>
               <a class="after:absolute" href="/f/first"></a>
               <a class="after:absolute" href="/f/second"></a>
               <a class="after:absolute" href="/f/third"></a>
               </body></html>"#,
        );
        let album = enumerate(&page);
        assert_eq!(album.name, "Demo Album");
        let urls: Vec<_> = album.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, ["/f/first", "/f/second", "/f/third"]);
        assert!(album.items.iter().all(|i| i.size == -1));
    }

    #[test]
    fn bunkr_album_reads_upload_dates() {
        let page = listing(
            "https://bunkr.sk/a/demo",
            r#"<html><head><title>Demo | Bunkr</title></head><body>
               <h1 class="truncate">Demo</h1>
               <div>
                 <a class="after:absolute" href="/f/dated"></a>
                 <span class="theDate">10:20:30 01/06/2024</span>
               </div>
               <div>
                 <a class="after:absolute" href="/f/undated"></a>
               </div>
               </body></html>"#,
        );
        let album = enumerate(&page);
        assert_eq!(album.items.len(), 2);
        let dated = album.items[0].uploaded.unwrap();
        assert_eq!(dated.year(), 2024);
        assert_eq!(dated.hour(), 10);
        assert!(album.items[1].uploaded.is_none());
    }

    #[test]
    fn bunkr_single_file_is_the_page_itself() {
        let page = listing(
            "https://bunkr.sk/f/clip",
            r#"<html><head><title>clip.mp4 | Bunkr</title></head><body>
               <span class="ic-videos"></span>
               <h1 class="text-[20px]">clip.mp4</h1>
               </body></html>"#,
        );
        let album = enumerate(&page);
        assert_eq!(album.name, "clip.mp4");
        assert_eq!(album.items.len(), 1);
        assert_eq!(album.items[0].url, "https://bunkr.sk/f/clip");
    }

    #[test]
    fn single_file_heading_falls_back_to_truncate() {
        let page = listing(
            "https://bunkr.sk/f/clip",
            r#"<html><head><title>x | Bunkr</title></head><body>
               <div class="lightgallery"></div>
               <h1 class="truncate">fallback.jpg</h1>
               </body></html>"#,
        );
        assert_eq!(enumerate(&page).name, "fallback.jpg");
    }

    #[test]
    fn generic_gallery_keeps_hrefs_as_is() {
        let page = listing(
            "https://cyberdrop.me/a/demo",
            r#"<html><head><title>gallery</title></head><body>
               <h1 id="title">My Gallery</h1>
               <a class="image" href="/f/one"></a>
               <a class="image" href="https://cyberdrop.me/f/two"></a>
               </body></html>"#,
        );
        let album = enumerate(&page);
        assert_eq!(album.name, "My Gallery");
        let urls: Vec<_> = album.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, ["/f/one", "https://cyberdrop.me/f/two"]);
    }

    #[test]
    fn missing_heading_yields_unknown() {
        let page = listing(
            "https://bunkr.sk/a/demo",
            r#"<html><head><title>Bunkr</title></head><body>
               <a class="after:absolute" href="/f/x"></a></body></html>"#,
        );
        assert_eq!(enumerate(&page).name, "Unknown");
    }
}
