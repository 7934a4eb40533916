//! HTML page extractor for the 599.com live pages.
//!
//! Pages are fetched over HTTP and parsed with `scraper`. A fetched document
//! is cached per open page and reused by extraction calls made within
//! `min_refetch_ms`, so the three extraction calls of one session tick cost
//! a single request.
//!
//! All markup heuristics live in the free `parse_*` functions below so they
//! can be exercised offline against captured fixtures.

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use super::extractor::{PageExtractor, PageHandle};
use crate::config::SourceConfig;
use crate::domain::{EventCandidate, StatusSnapshot};
use crate::error::{Result, WatchError};

pub const EXTRACTOR_VERSION: &str = "html-599/2.8";

const CORNER_KEYWORD: &str = "角球";
const STATUS_WORDS: [&str; 7] = ["上半场", "下半场", "中场", "未开", "完场", "加时", "点球"];
const NOT_STARTED: &str = "未开";
const HALF_TIME: &str = "中场";

static RE_MINUTE_LINE: OnceLock<Regex> = OnceLock::new();
static RE_MINUTE_PREFIX: OnceLock<Regex> = OnceLock::new();
static RE_MINUTE_ANY: OnceLock<Regex> = OnceLock::new();
static RE_SCORE_LINE: OnceLock<Regex> = OnceLock::new();
static RE_SCORE_ANY: OnceLock<Regex> = OnceLock::new();
static RE_KICKOFF: OnceLock<Regex> = OnceLock::new();

fn minute_line() -> &'static Regex {
    RE_MINUTE_LINE.get_or_init(|| Regex::new(r"^\d+\s*['′]\s*$").unwrap())
}

fn minute_prefix() -> &'static Regex {
    RE_MINUTE_PREFIX.get_or_init(|| Regex::new(r"^\d+['′]").unwrap())
}

fn minute_any() -> &'static Regex {
    RE_MINUTE_ANY.get_or_init(|| Regex::new(r"\d+['′]").unwrap())
}

fn score_line() -> &'static Regex {
    RE_SCORE_LINE.get_or_init(|| Regex::new(r"^(\d+)\s*[:：]\s*(\d+)$").unwrap())
}

fn score_any() -> &'static Regex {
    RE_SCORE_ANY.get_or_init(|| Regex::new(r"(\d+)\s*[:：]\s*(\d+)").unwrap())
}

fn kickoff_time() -> &'static Regex {
    RE_KICKOFF.get_or_init(|| Regex::new(r"^\d{1,2}:\d{2}$").unwrap())
}

#[derive(Debug, Clone)]
struct CachedPage {
    url: String,
    fetched_at: Instant,
    body: Arc<String>,
}

/// HTTP-backed [`PageExtractor`]
pub struct HtmlPageExtractor {
    client: reqwest::Client,
    cfg: SourceConfig,
    base: Url,
    pages: DashMap<u64, CachedPage>,
    next_page_id: AtomicU64,
}

impl HtmlPageExtractor {
    /// Build the HTTP client. Failure here means there is no page capability
    /// at all, which callers treat as terminal.
    pub fn new(cfg: SourceConfig) -> Result<Self> {
        let base = Url::parse(&cfg.base_url).map_err(|e| {
            WatchError::BrowserUnavailable(format!("invalid base url {}: {e}", cfg.base_url))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| WatchError::BrowserUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            cfg,
            base,
            pages: DashMap::new(),
            next_page_id: AtomicU64::new(1),
        })
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    async fn page_body(&self, page: &PageHandle) -> Result<Arc<String>> {
        let min_refetch = Duration::from_millis(self.cfg.min_refetch_ms);
        let url = {
            let entry = self
                .pages
                .get(&page.id())
                .ok_or_else(|| WatchError::Navigation {
                    url: page.url().to_string(),
                    reason: "page is not open".to_string(),
                })?;
            if entry.fetched_at.elapsed() < min_refetch {
                return Ok(entry.body.clone());
            }
            entry.url.clone()
        };

        let body = self
            .fetch(&url, Duration::from_millis(self.cfg.request_timeout_ms))
            .await
            .map_err(|e| WatchError::TransientExtraction(format!("refresh {url}: {e}")))?;
        let body = Arc::new(body);

        if let Some(mut entry) = self.pages.get_mut(&page.id()) {
            entry.fetched_at = Instant::now();
            entry.body = body.clone();
        }
        Ok(body)
    }
}

#[async_trait]
impl PageExtractor for HtmlPageExtractor {
    fn version(&self) -> &'static str {
        EXTRACTOR_VERSION
    }

    async fn list_candidates(&self) -> Result<Vec<EventCandidate>> {
        let url = self.cfg.live_url();
        let body = self
            .fetch(&url, Duration::from_millis(self.cfg.list_timeout_ms))
            .await?;
        let candidates = parse_candidates(&body, &self.base);
        debug!("listing page {} yielded {} candidates", url, candidates.len());
        Ok(candidates)
    }

    async fn open_page(&self, url: &str) -> Result<PageHandle> {
        let body = self
            .fetch(url, Duration::from_millis(self.cfg.request_timeout_ms))
            .await
            .map_err(|e| WatchError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let id = self.next_page_id.fetch_add(1, Ordering::Relaxed);
        self.pages.insert(
            id,
            CachedPage {
                url: url.to_string(),
                fetched_at: Instant::now(),
                body: Arc::new(body),
            },
        );
        Ok(PageHandle::new(id, url))
    }

    async fn close_page(&self, page: PageHandle) -> Result<()> {
        if self.pages.remove(&page.id()).is_none() {
            debug!("page {} ({}) was already gone", page.id(), page.url());
        }
        Ok(())
    }

    async fn has_event_area(&self, page: &PageHandle) -> Result<bool> {
        let body = self.page_body(page).await?;
        Ok(parse_has_event_area(&body))
    }

    async fn extract_status(&self, page: &PageHandle) -> Result<StatusSnapshot> {
        let body = self.page_body(page).await?;
        Ok(parse_status(&body))
    }

    async fn extract_all_events(&self, page: &PageHandle) -> Result<Vec<String>> {
        let body = self.page_body(page).await?;
        Ok(parse_all_events(&body))
    }

    async fn extract_corner_events(&self, page: &PageHandle) -> Result<Vec<String>> {
        let body = self.page_body(page).await?;
        Ok(parse_corner_events(&body))
    }
}

// ── Markup heuristics ────────────────────────────────────────────────

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Visible text nodes under `root`, trimmed, in document order
fn text_lines(root: ElementRef<'_>) -> Vec<String> {
    root.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(ElementRef::wrap)
                .map(|p| matches!(p.value().name(), "script" | "style" | "noscript"))
                .unwrap_or(false);
            let text = text.trim();
            if hidden || text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        })
        .collect()
}

/// Minute marker ("37' ") found in the closest enclosing `div`, if any
fn minute_near(el: ElementRef<'_>) -> String {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "div")
        .and_then(|div| {
            let text = element_text(div);
            minute_any().find(&text).map(|m| format!("{} ", m.as_str()))
        })
        .unwrap_or_default()
}

fn is_status_text(text: &str) -> bool {
    STATUS_WORDS.iter().any(|w| text.contains(w)) || minute_line().is_match(text)
}

fn is_score_text(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    score_line().is_match(&compact)
}

fn is_team_text(text: &str) -> bool {
    let len = text.chars().count();
    len > 1
        && len < 30
        && !text.contains("主队")
        && !text.contains("客队")
        && !minute_prefix().is_match(text)
        && !is_score_text(text)
        && !text.contains("HT")
        && !text.contains("动画")
}

/// The first all-digit path segment after `live`
fn event_id_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.split('/')
        .skip_while(|s| *s != "live")
        .skip(1)
        .find(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
}

/// Live-listing rows with a link to their event page
pub fn parse_candidates(body: &str, base: &Url) -> Vec<EventCandidate> {
    let document = Html::parse_document(body);
    let (Some(td_sel), Some(link_sel)) = (selector("td"), selector(r#"a[href*="/live/"]"#)) else {
        return Vec::new();
    };

    let rows: Vec<ElementRef<'_>> = [".match", "tr[data-mid]", "table tr"]
        .iter()
        .filter_map(|css| selector(css))
        .map(|sel| document.select(&sel).collect::<Vec<_>>())
        .find(|rows| !rows.is_empty())
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for row in rows {
        let cells: Vec<String> = row.select(&td_sel).map(element_text).collect();
        if cells.len() < 5 {
            continue;
        }

        let mut status = String::new();
        let mut score = String::new();
        for text in &cells {
            if is_status_text(text) {
                status = text.clone();
            } else if is_score_text(text) {
                score = text.clone();
            }
        }

        let mut href = String::new();
        let mut home = String::new();
        let mut away = String::new();
        for link in row.select(&link_sel) {
            let Some(h) = link.value().attr("href") else {
                continue;
            };
            if h.contains("odds") {
                continue;
            }
            href = h.to_string();
            let label = element_text(link);
            if label.chars().count() > 1 && !is_score_text(&label) {
                if home.is_empty() {
                    home = label;
                } else if away.is_empty() && label != home {
                    away = label;
                }
            }
        }

        if home.is_empty() || away.is_empty() {
            for text in &cells {
                if text.chars().count() > 1
                    && !is_status_text(text)
                    && !is_score_text(text)
                    && !kickoff_time().is_match(text)
                    && text != "VS"
                {
                    if home.is_empty() {
                        home = text.clone();
                    } else if away.is_empty() && *text != home {
                        away = text.clone();
                    }
                }
            }
        }

        if href.is_empty() {
            continue;
        }

        let row_text = cells.join(" ");
        if status.is_empty() {
            if row_text.contains(NOT_STARTED) {
                status = NOT_STARTED.to_string();
            } else if row_text.contains("VS") {
                // fixture row without a clock: not started
                continue;
            }
        }

        let Some(id) = event_id_from_href(&href) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }

        let url = base
            .join(&href)
            .map(String::from)
            .unwrap_or_else(|_| href.clone());

        candidates.push(EventCandidate {
            id,
            url,
            home,
            away,
            score,
            status,
        });
    }

    candidates
}

pub fn parse_has_event_area(body: &str) -> bool {
    let document = Html::parse_document(body);

    for css in [
        r#"img.corner_tips, img[class*="corner"]"#,
        r#"div.live_main, div.data_chart, div[class*="event"], div[class*="live"]"#,
    ] {
        if let Some(sel) = selector(css) {
            if document.select(&sel).next().is_some() {
                return true;
            }
        }
    }

    let text = text_lines(document.root_element()).join("\n");
    (text.contains("主队") && text.contains("客队"))
        || text.contains(CORNER_KEYWORD)
        || text.contains("上半场")
        || text.contains("下半场")
}

pub fn parse_status(body: &str) -> StatusSnapshot {
    let document = Html::parse_document(body);
    let lines = text_lines(document.root_element());
    let mut snap = StatusSnapshot::default();

    if let Some(i) = lines.iter().position(|l| score_line().is_match(l)) {
        snap.score = lines[i].clone();
        if let Some(prev) = lines[i.saturating_sub(5)..i]
            .iter()
            .rev()
            .find(|l| is_team_text(l))
        {
            snap.home = prev.clone();
        }
        if let Some(next) = lines
            .iter()
            .skip(i + 1)
            .take(5)
            .find(|l| is_team_text(l) && **l != snap.home)
        {
            snap.away = next.clone();
        }
    }

    if snap.home.is_empty() || snap.away.is_empty() {
        if let Some(sel) = selector(r#"[class*="team"], [class*="name"]"#) {
            let mut names: Vec<String> = Vec::new();
            for el in document.select(&sel) {
                let first = text_lines(el).into_iter().next().unwrap_or_default();
                if is_team_text(&first) && !score_any().is_match(&first) && !names.contains(&first)
                {
                    names.push(first);
                }
            }
            if names.len() >= 2 {
                if snap.home.is_empty() {
                    snap.home = names[0].clone();
                }
                if snap.away.is_empty() {
                    snap.away = names[1].clone();
                }
            }
        }
    }

    if snap.score.is_empty() {
        snap.score = animation_score(&document, &lines).unwrap_or_default();
    }

    if let Some(minute) = lines.iter().find(|l| minute_line().is_match(l)) {
        snap.status = minute.clone();
    }
    let text = lines.join("\n");
    if snap.status.is_empty() && text.contains(HALF_TIME) {
        snap.status = HALF_TIME.to_string();
    }
    if text.contains("上半场的比赛结束") {
        snap.status = HALF_TIME.to_string();
    }

    snap
}

/// Score shown by the animated live widget
fn animation_score(document: &Html, lines: &[String]) -> Option<String> {
    let from_match = |text: &str| {
        score_any()
            .captures(text)
            .map(|c| format!("{}:{}", &c[1], &c[2]))
    };

    if let Some(sel) = selector(r#"[class*="score"], [class*="Score"]"#) {
        if let Some(score) = document
            .select(&sel)
            .find_map(|el| from_match(element_text(el).as_str()))
        {
            return Some(score);
        }
    }

    lines
        .iter()
        .filter(|l| l.chars().count() < 10)
        .find_map(|l| from_match(l.as_str()))
}

struct Collector {
    seen: HashSet<String>,
    out: Vec<String>,
}

impl Collector {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn push(&mut self, text: String) {
        if self.seen.insert(text.clone()) {
            self.out.push(text);
        }
    }
}

pub fn parse_all_events(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut events = Collector::new();

    if let Some(sel) = selector("img[title]") {
        for img in document.select(&sel) {
            let Some(title) = img.value().attr("title") else {
                continue;
            };
            let len = title.chars().count();
            if len > 3 && len < 100 {
                events.push(format!("{}{}", minute_near(img), title));
            }
        }
    }

    let mut prev_minute = String::new();
    for text in text_lines(document.root_element()) {
        let len = text.chars().count();
        if minute_line().is_match(&text) {
            prev_minute = text;
            continue;
        }
        if !prev_minute.is_empty() && len > 3 && len < 100 {
            if !text.contains("射门") || text.contains('球') {
                events.push(format!("{} {}", prev_minute, text));
            }
            prev_minute.clear();
        } else if minute_prefix().is_match(&text) && len > 5 && len < 150 {
            events.push(text);
            prev_minute.clear();
        }
    }

    events.out
}

pub fn parse_corner_events(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut corners = Collector::new();

    if let Some(sel) = selector(r#"img.corner_tips, img[class*="corner"]"#) {
        for img in document.select(&sel) {
            let Some(title) = img.value().attr("title") else {
                continue;
            };
            if title.contains(CORNER_KEYWORD) {
                corners.push(format!("{}{}", minute_near(img), title));
            }
        }
    }

    let mut prev_minute = String::new();
    for text in text_lines(document.root_element()) {
        if minute_line().is_match(&text) {
            prev_minute = text;
            continue;
        }
        if text.contains(CORNER_KEYWORD) && text.contains("获得") {
            let full = if prev_minute.is_empty() {
                text
            } else {
                format!("{} {}", prev_minute, text)
            };
            if full.chars().count() < 100 {
                corners.push(full);
            }
            prev_minute.clear();
        }
    }

    corners.out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body><table>
          <tr data-mid="1"><td>英超</td><td>35'</td><td><a href="/live/1001/">Alpha FC</a></td>
              <td>1:0</td><td><a href="/live/1001/">Beta United</a></td><td><a href="/live/odds/1001/">odds</a></td></tr>
          <tr data-mid="2"><td>英超</td><td>未开</td><td><a href="/live/1002/">Gamma</a></td>
              <td>VS</td><td><a href="/live/1002/">Delta</a></td></tr>
          <tr data-mid="3"><td>西甲</td><td>20:00</td><td><a href="/live/1003/">Eps</a></td>
              <td>VS</td><td><a href="/live/1003/">Zeta</a></td></tr>
          <tr data-mid="4"><td>short</td><td>row</td></tr>
        </table></body></html>
    "#;

    const MATCH_PAGE: &str = r#"
        <html><body>
          <div class="header"><span>Alpha FC</span><span>1:0</span><span>Beta United</span></div>
          <div class="clock">37'</div>
          <div class="live_main">
            <div class="item"><span>15'</span><img class="corner_tips" title="主队获得角球"></div>
            <div class="item"><span>23'</span><img class="corner_tips" title="客队获得角球"></div>
            <div class="item"><span>30'</span><img src="goal.png" title="Alpha FC 进球"></div>
          </div>
          <script>var x = "99' 主队获得角球";</script>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://www.599.com").unwrap()
    }

    #[test]
    fn test_parse_candidates() {
        let candidates = parse_candidates(LISTING, &base());
        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1002"]);

        let live = &candidates[0];
        assert_eq!(live.url, "https://www.599.com/live/1001/");
        assert_eq!(live.home, "Alpha FC");
        assert_eq!(live.away, "Beta United");
        assert_eq!(live.score, "1:0");
        assert_eq!(live.status, "35'");

        // kept so discovery can apply its not-started filter
        assert_eq!(candidates[1].status, "未开");
    }

    #[test]
    fn test_event_id_from_href() {
        assert_eq!(event_id_from_href("/live/1001/"), Some("1001".into()));
        assert_eq!(event_id_from_href("/live/1001"), Some("1001".into()));
        assert_eq!(event_id_from_href("/live/1001/detail"), Some("1001".into()));
        assert_eq!(event_id_from_href("/live/odds/1001/"), Some("1001".into()));
        assert_eq!(event_id_from_href("/live/1001?tab=anim"), Some("1001".into()));
        assert_eq!(
            event_id_from_href("https://www.599.com/live/1001"),
            Some("1001".into())
        );
        assert_eq!(event_id_from_href("/live/"), None);
        assert_eq!(event_id_from_href("/live/schedule/"), None);
    }

    #[test]
    fn test_event_area_detection() {
        assert!(parse_has_event_area(MATCH_PAGE));
        assert!(!parse_has_event_area(
            "<html><body><p>比赛资料</p></body></html>"
        ));
        assert!(parse_has_event_area(
            "<html><body><p>下半场</p></body></html>"
        ));
    }

    #[test]
    fn test_parse_status() {
        let snap = parse_status(MATCH_PAGE);
        assert_eq!(snap.home, "Alpha FC");
        assert_eq!(snap.away, "Beta United");
        assert_eq!(snap.score, "1:0");
        assert_eq!(snap.status, "37'");
    }

    #[test]
    fn test_parse_status_half_time_and_widget_score() {
        let page = r#"<html><body>
            <div class="scoreBoard">比分 2 ： 1 </div>
            <p>上半场的比赛结束</p>
        </body></html>"#;
        let snap = parse_status(page);
        assert_eq!(snap.score, "2:1");
        assert_eq!(snap.status, "中场");
    }

    #[test]
    fn test_parse_corner_events() {
        let corners = parse_corner_events(MATCH_PAGE);
        assert_eq!(corners, vec!["15' 主队获得角球", "23' 客队获得角球"]);
    }

    #[test]
    fn test_parse_corner_events_from_text() {
        let page = r#"<html><body><ul>
            <li>41'</li><li>主队获得角球</li>
            <li>客队获得第3个角球</li>
        </ul></body></html>"#;
        assert_eq!(
            parse_corner_events(page),
            vec!["41' 主队获得角球", "客队获得第3个角球"]
        );
    }

    #[test]
    fn test_parse_all_events() {
        let events = parse_all_events(MATCH_PAGE);
        assert!(events.contains(&"15' 主队获得角球".to_string()));
        assert!(events.contains(&"23' 客队获得角球".to_string()));
        assert!(events.contains(&"30' Alpha FC 进球".to_string()));
    }
}
