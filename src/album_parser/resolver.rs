//! 条目直链解析级联。
//!
//! 按可靠性递减的顺序依次尝试：结构化元素 → 加密端点 → 下载跳转页 →
//! 原文提示 → CDN 探测。实现成命名策略表而不是嵌套分支，
//! 站点换 markup 时在表尾追加新策略即可，不动已有策略。

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::classifier::SiteFamily;
use super::obfuscation::{self, ObfuscationEnvelope};
use crate::base_system::context::Config;
use crate::download::models::{ItemRef, ResolvedItem};
use crate::network_parser::network::{FetchError, Session};

const MEDIA_EXTS: [&str; 6] = [".mp4", ".jpg", ".jpeg", ".png", ".gif", ".webm"];
const VIDEO_EXTS: [&str; 3] = [".mp4", ".webm", ".mov"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no download url found for {url}")]
    NoCandidate { url: String },
    #[error("cdn probing blocked with HTTP {status} at {url}")]
    AccessBlocked { url: String, status: u16 },
    #[error("invalid item reference {url}: {source}")]
    BadReference {
        url: String,
        source: url::ParseError,
    },
}

/// 解析一个条目引用，产出直链。失败只影响这个条目，由调用方记录并跳过。
pub fn resolve(
    session: &Session,
    config: &Config,
    family: SiteFamily,
    base: &Url,
    item: &ItemRef,
) -> Result<ResolvedItem, ResolveError> {
    match family {
        SiteFamily::Cyberdrop => resolve_generic(session, base, item),
        SiteFamily::Bunkr => resolve_bunkr(session, config, base, item),
    }
}

/// 通用画廊族：绝对直链原样可用（只改写 CDN 主机名），
/// 相对引用走站点的 JSON API。
fn resolve_generic(
    session: &Session,
    base: &Url,
    item: &ItemRef,
) -> Result<ResolvedItem, ResolveError> {
    if item.url.starts_with("http") {
        return Ok(ResolvedItem {
            url: rewrite_cdn_host(&item.url),
            size: item.size,
            name: item.name.clone(),
        });
    }

    let page_url = join_ref(base, &item.url)?;
    let api_url = page_url.as_str().replace("/f/", "/api/f/");
    let data = session.get_json(&api_url)?;

    let Some(direct) = data.get("url").and_then(Value::as_str).filter(|u| !u.is_empty()) else {
        debug!("JSON 响应里没有 url 字段: {}", api_url);
        return Err(ResolveError::NoCandidate {
            url: page_url.to_string(),
        });
    };
    let name = data
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(ResolvedItem {
        url: rewrite_cdn_host(direct),
        size: -1,
        name,
    })
}

fn resolve_bunkr(
    session: &Session,
    config: &Config,
    base: &Url,
    item: &ItemRef,
) -> Result<ResolvedItem, ResolveError> {
    let page_url = join_ref(base, &item.url)?;
    let fetched = session.get_page(page_url.as_str())?;
    // 站点在多个等价边缘主机之间跳转，后续请求以最终落点为基准
    let final_url = Url::parse(&fetched.final_url).unwrap_or(page_url);
    let page = ItemPage::parse(final_url, fetched.body);

    for (name, strategy) in CASCADE {
        if let Some(mut found) = strategy(&page, session, config)? {
            debug!("策略 {} 命中: {}", name, found.url);
            if found.name.is_none() {
                found.name = page.file_name.clone();
            }
            return Ok(found);
        }
    }

    Err(ResolveError::NoCandidate {
        url: page.url.to_string(),
    })
}

/// 抓取并预处理后的条目页。
struct ItemPage {
    url: Url,
    document: Html,
    raw: String,
    /// `<title>` 以 " | " 截断得到的文件名
    file_name: Option<String>,
}

impl ItemPage {
    fn parse(url: Url, body: String) -> Self {
        let document = Html::parse_document(&body);
        let file_name = document
            .select(sel_title())
            .next()
            .map(|el| el.text().collect::<String>())
            .and_then(|title| {
                let name = title.split(" | ").next().unwrap_or("").trim().to_string();
                (!name.is_empty()).then_some(name)
            });
        Self {
            url,
            document,
            raw: body,
            file_name,
        }
    }

    /// URL 路径的最后一段（条目 slug）。
    fn slug(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
    }
}

type Strategy = fn(&ItemPage, &Session, &Config) -> Result<Option<ResolvedItem>, ResolveError>;

/// 严格有序，先命中先赢。
const CASCADE: &[(&str, Strategy)] = &[
    ("embedded-source", embedded_source),
    ("media-player", media_player),
    ("viewer-image", viewer_image),
    ("encrypted-endpoint", encrypted_endpoint),
    ("download-page", download_page),
    ("size-hint", size_hint),
    ("cdn-probe", cdn_probe),
];

/// (a) 内嵌媒体源：`<source src>`，其次老播放器 `<video id="player" src>`。
fn embedded_source(
    page: &ItemPage,
    _session: &Session,
    _config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    Ok(find_embedded_source(&page.document, &page.url).map(ResolvedItem::new))
}

/// (b) media-player 自定义元素。
fn media_player(
    page: &ItemPage,
    _session: &Session,
    _config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    Ok(first_src(&page.document, sel_media_player(), &page.url).map(ResolvedItem::new))
}

/// (c) 主查看图。
fn viewer_image(
    page: &ItemPage,
    _session: &Session,
    _config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    Ok(first_src(&page.document, sel_viewer_image(), &page.url).map(ResolvedItem::new))
}

/// (d) 页面级加密直链端点：带 slug POST 过去拿信封再解。
/// 信封损坏或请求失败都只算"这条路没走通"，级联继续。
fn encrypted_endpoint(
    page: &ItemPage,
    session: &Session,
    _config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    if !page.raw.contains("/api/vs") {
        return Ok(None);
    }
    let Some(slug) = page.slug() else {
        return Ok(None);
    };

    let endpoint = format!("{}/api/vs", page.url.origin().ascii_serialization());
    let data = match session.post_json(&endpoint, &json!({ "slug": slug })) {
        Ok(data) => data,
        Err(err) => {
            warn!("加密端点请求失败: {}", err);
            return Ok(None);
        }
    };

    let envelope: ObfuscationEnvelope = match serde_json::from_value(data) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!("加密端点响应缺字段: {}", err);
            return Ok(None);
        }
    };

    match obfuscation::decrypt_url(&envelope) {
        Ok(url) => Ok(Some(ResolvedItem::new(url))),
        Err(err) => {
            warn!("信封解码失败: {}", err);
            Ok(None)
        }
    }
}

/// (e) 下载按钮：跳到二级 "get" 页，在那边跑一套缩减级联。
fn download_page(
    page: &ItemPage,
    session: &Session,
    _config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    let Some(href) = page
        .document
        .select(sel_download_btn())
        .next()
        .and_then(valid_href)
    else {
        return Ok(None);
    };
    let Some(target) = absolutize(&page.url, &href) else {
        return Ok(None);
    };

    let fetched = match session.get_page(&target) {
        Ok(fetched) => fetched,
        Err(err) => {
            warn!("下载跳转页抓取失败: {}", err);
            return Ok(None);
        }
    };

    Ok(reduced_cascade(&fetched.body).map(ResolvedItem::new))
}

/// (f) 原文里的调试提示行，可以同时拿到文件名、声明大小和文件 id。
fn size_hint(
    page: &ItemPage,
    _session: &Session,
    config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    let Some(cap) = re_debug_info().captures(&page.raw) else {
        return Ok(None);
    };
    let file_name = cap[1].to_string();
    let Ok(size) = cap[2].parse::<i64>() else {
        return Ok(None);
    };
    let Some(id_cap) = re_file_slug().captures(page.url.path()) else {
        return Ok(None);
    };
    let Some(host) = config.cdn_hosts.first() else {
        return Ok(None);
    };

    Ok(Some(ResolvedItem {
        url: format!("https://{}/{}/{}", host, &id_cap[1], file_name),
        size,
        name: Some(file_name),
    }))
}

/// (g) 兜底：按配置的 CDN 主机顺序探测 slug。
/// 探到反爬拦截（403）立刻放弃整条探测链，不再碰剩下的候选。
fn cdn_probe(
    page: &ItemPage,
    session: &Session,
    config: &Config,
) -> Result<Option<ResolvedItem>, ResolveError> {
    let Some(slug) = page.slug() else {
        return Ok(None);
    };

    for host in &config.cdn_hosts {
        let candidate = format!("https://{}/{}", host, slug);
        match session.probe(&candidate) {
            Ok(status) if status.is_success() => {
                return Ok(Some(ResolvedItem::new(candidate)));
            }
            Ok(status) if status.as_u16() == 403 => {
                return Err(ResolveError::AccessBlocked {
                    url: candidate,
                    status: 403,
                });
            }
            Ok(status) => debug!("CDN 候选 {} 返回 {}", candidate, status.as_u16()),
            Err(err) => debug!("CDN 候选 {} 请求失败: {}", candidate, err),
        }
    }
    Ok(None)
}

// ── 纯解析部分（不发请求，便于测试） ──────────────────────────

fn find_embedded_source(document: &Html, base: &Url) -> Option<String> {
    first_src(document, sel_source(), base).or_else(|| first_src(document, sel_video_player(), base))
}

/// 二级 "get" 页上的缩减级联。
fn reduced_cascade(body: &str) -> Option<String> {
    let document = Html::parse_document(body);

    // 1. 精确 "Download" 文本
    for anchor in document.select(sel_anchor()) {
        if anchor.text().collect::<String>().trim() == "Download" {
            if let Some(href) = valid_href(anchor) {
                return Some(href);
            }
        }
    }

    // 2. 大小写不敏感的 "download"
    for anchor in document.select(sel_anchor()) {
        let text = anchor.text().collect::<String>().trim().to_lowercase();
        if text.contains("download") {
            if let Some(href) = valid_href(anchor) {
                return Some(href);
            }
        }
    }

    // 3. 指向站外的绝对链接
    for anchor in document.select(sel_http_anchor()) {
        if let Some(href) = anchor.value().attr("href") {
            if !href.to_lowercase().contains("bunkr") {
                return Some(href.to_string());
            }
        }
    }

    // 4. 原文 href 正则（已知媒体扩展名）
    if let Some(cap) = re_media_href().captures(body) {
        return Some(cap[1].to_string());
    }

    // 5. 兜底：全文扫 URL，认 cdn 标记或媒体扩展名
    for cap in re_any_url().captures_iter(body) {
        let url = cap[1].trim_end_matches(&['"', '\'', '<'][..]);
        let lower = url.to_lowercase();
        if lower.contains("cdn") || MEDIA_EXTS.iter().any(|ext| lower.contains(ext)) {
            return Some(url.to_string());
        }
    }

    None
}

/// 扩展名驱动的 CDN 主机改写：视频直链有时挂在 cdnN 节点上，
/// 真实文件由对应的 media-filesN 节点提供。
fn rewrite_cdn_host(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let Some(host) = url.host_str().map(str::to_string) else {
        return raw.to_string();
    };

    let path = url.path().to_lowercase();
    if !VIDEO_EXTS.iter().any(|ext| path.ends_with(ext)) {
        return raw.to_string();
    }
    let Some(rest) = host.strip_prefix("cdn") else {
        return raw.to_string();
    };
    let dot = match rest.find('.') {
        Some(dot) => dot,
        None => return raw.to_string(),
    };
    let (suffix, domain) = rest.split_at(dot);
    if !suffix.chars().all(|c| c.is_ascii_digit()) {
        return raw.to_string();
    }

    let new_host = format!("media-files{}{}", suffix, domain);
    if url.set_host(Some(&new_host)).is_err() {
        return raw.to_string();
    }
    url.to_string()
}

fn first_src(document: &Html, selector: &Selector, base: &Url) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("src"))
        .filter(|src| !src.is_empty())
        .and_then(|src| absolutize(base, src))
}

fn valid_href(anchor: ElementRef<'_>) -> Option<String> {
    anchor
        .value()
        .attr("href")
        .filter(|href| !href.is_empty() && *href != "#")
        .map(str::to_string)
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    if href.starts_with("http") {
        Some(href.to_string())
    } else {
        base.join(href).ok().map(|u| u.to_string())
    }
}

fn join_ref(base: &Url, raw: &str) -> Result<Url, ResolveError> {
    let joined = if raw.starts_with("http") {
        Url::parse(raw)
    } else {
        base.join(raw)
    };
    joined.map_err(|source| ResolveError::BadReference {
        url: raw.to_string(),
        source,
    })
}

// ── 选择器与正则缓存 ─────────────────────────────────────────

fn sel_title() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("title").unwrap())
}

fn sel_source() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("source[src]").unwrap())
}

fn sel_video_player() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("video#player[src]").unwrap())
}

fn sel_media_player() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("media-player[src]").unwrap())
}

fn sel_viewer_image() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("img.max-h-full[src]").unwrap())
}

fn sel_download_btn() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("a.ic-download-01").unwrap())
}

fn sel_anchor() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("a").unwrap())
}

fn sel_http_anchor() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse(r#"a[href^="http"]"#).unwrap())
}

fn re_media_href() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| {
        Regex::new(r#"href=['"]([^'"]+\.(?:mp4|jpg|jpeg|png|gif|webm))['"]"#).unwrap()
    })
}

fn re_any_url() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"(https?://[^\s"'<>]+)"#).unwrap())
}

fn re_debug_info() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"Debug: Original=([^,]+), Size=(\d+)").unwrap())
}

fn re_file_slug() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"/f/([a-zA-Z0-9]+)").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(body)
    }

    fn base() -> Url {
        Url::parse("https://bunkr.sk/f/abc123").unwrap()
    }

    #[test]
    fn cascade_order_is_stable() {
        let names: Vec<_> = CASCADE.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            [
                "embedded-source",
                "media-player",
                "viewer-image",
                "encrypted-endpoint",
                "download-page",
                "size-hint",
                "cdn-probe",
            ]
        );
    }

    #[test]
    fn embedded_source_prefers_source_element() {
        let html = doc(
            r#"<video id="player" src="/v/old.mp4"><source src="https://media-files.bunkr.ru/v/clip.mp4"></video>"#,
        );
        assert_eq!(
            find_embedded_source(&html, &base()).unwrap(),
            "https://media-files.bunkr.ru/v/clip.mp4"
        );
    }

    #[test]
    fn embedded_source_falls_back_to_video_player() {
        let html = doc(r#"<video id="player" src="/v/clip.mp4"></video>"#);
        assert_eq!(
            find_embedded_source(&html, &base()).unwrap(),
            "https://bunkr.sk/v/clip.mp4"
        );
    }

    #[test]
    fn viewer_image_src_is_absolutized() {
        let html = doc(r#"<img class="max-h-full" src="/i/photo.jpg">"#);
        assert_eq!(
            first_src(&html, sel_viewer_image(), &base()).unwrap(),
            "https://bunkr.sk/i/photo.jpg"
        );
    }

    #[test]
    fn reduced_cascade_exact_download_text_wins() {
        let body = r#"
            <a href="https://other.host/x.mp4">download here</a>
            <a href="https://cdn9.example/file.mp4">Download</a>"#;
        assert_eq!(
            reduced_cascade(body).unwrap(),
            "https://cdn9.example/file.mp4"
        );
    }

    #[test]
    fn reduced_cascade_case_insensitive_fallback() {
        let body = r#"<a href="https://x.example/f.bin">DOWNLOAD NOW</a>"#;
        assert_eq!(reduced_cascade(body).unwrap(), "https://x.example/f.bin");
    }

    #[test]
    fn reduced_cascade_offsite_link() {
        let body = r#"
            <a href="https://bunkr.sk/faq">FAQ</a>
            <a href="https://files.elsewhere.net/abc">get it</a>"#;
        assert_eq!(
            reduced_cascade(body).unwrap(),
            "https://files.elsewhere.net/abc"
        );
    }

    #[test]
    fn reduced_cascade_media_href_regex() {
        let body = r#"<div data-x="href='https://h.example/v/clip.mp4'"></div>"#;
        assert_eq!(
            reduced_cascade(body).unwrap(),
            "https://h.example/v/clip.mp4"
        );
    }

    #[test]
    fn reduced_cascade_raw_cdn_scan() {
        let body = "nothing structured, but the text mentions https://cdn12.host/whatever plainly";
        assert_eq!(reduced_cascade(body).unwrap(), "https://cdn12.host/whatever");
    }

    #[test]
    fn reduced_cascade_ignores_placeholder_hrefs() {
        let body = r##"<a href="#">Download</a>"##;
        assert!(reduced_cascade(body).is_none());
    }

    #[test]
    fn rewrite_moves_video_to_media_files_host() {
        assert_eq!(
            rewrite_cdn_host("https://cdn.bunkr.ru/v/clip.mp4"),
            "https://media-files.bunkr.ru/v/clip.mp4"
        );
        assert_eq!(
            rewrite_cdn_host("https://cdn4.bunkr.ru/v/clip.webm"),
            "https://media-files4.bunkr.ru/v/clip.webm"
        );
    }

    #[test]
    fn rewrite_leaves_images_and_other_hosts_alone() {
        assert_eq!(
            rewrite_cdn_host("https://cdn.bunkr.ru/i/photo.jpg"),
            "https://cdn.bunkr.ru/i/photo.jpg"
        );
        assert_eq!(
            rewrite_cdn_host("https://media-files.bunkr.ru/v/clip.mp4"),
            "https://media-files.bunkr.ru/v/clip.mp4"
        );
        assert_eq!(rewrite_cdn_host("not a url"), "not a url");
    }

    #[test]
    fn item_page_reads_file_name_from_title() {
        let page = ItemPage::parse(
            base(),
            "<html><head><title>clip.mp4 | Bunkr</title></head><body></body></html>".to_string(),
        );
        assert_eq!(page.file_name.as_deref(), Some("clip.mp4"));
        assert_eq!(page.slug(), Some("abc123"));
    }

    #[test]
    fn debug_info_regex_extracts_name_and_size() {
        let cap = re_debug_info()
            .captures("... Debug: Original=clip.mp4, Size=1048576 ...")
            .unwrap();
        assert_eq!(&cap[1], "clip.mp4");
        assert_eq!(&cap[2], "1048576");
    }
}
