//! Article page parsing.
//!
//! Turns one raw article page into an [`ArticleRecord`]. Title and body are
//! required; author, date and categories are best effort and fall back to
//! whatever the listing page showed next to the link.
//!
//! Boilerplate (navigation, share buttons, related-article widgets, ads) is
//! removed structurally: whole subtrees are skipped by tag name or by class
//! and id tokens, never by matching words in the text.

use crate::error::ParseFailure;
use crate::models::{ArticleRecord, ListingSummary, MONTH_NAMES};
use crate::utils::collapse_whitespace;
use chrono::{DateTime, Datelike, NaiveDate};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector, node::Element};
use tracing::{debug, instrument, warn};
use url::Url;

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| Selector::parse(s).unwrap()).collect()
}

static TITLE: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "h1.entry-title",
        "h1.post-title",
        "h1.article-title",
        "h1.page-title",
        "article h1",
        "h1",
        ".entry-title",
    ])
});

static AUTHOR: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "span.author.vcard",
        ".entry-author",
        ".post-author",
        ".article-author",
        ".author",
        "meta[name=\"author\"]",
    ])
});

static PUBLISHED_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[property=\"article:published_time\"]").unwrap());

static DATE_ATTR: Lazy<Vec<(Selector, &'static str)>> = Lazy::new(|| {
    vec![
        (Selector::parse("time.entry-date.published[datetime]").unwrap(), "datetime"),
        (Selector::parse("time.entry-date[datetime]").unwrap(), "datetime"),
        (Selector::parse("time[datetime]").unwrap(), "datetime"),
    ]
});

static DATE_TEXT: Lazy<Vec<Selector>> =
    Lazy::new(|| selectors(&["time.entry-date", ".entry-date", ".posted-on", "time"]));

static CATEGORY_LINKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        ".cat-links a, .tags-links a, a[rel~=\"category\"], a[rel~=\"tag\"]",
    )
    .unwrap()
});
static CATEGORY_BLOCK: Lazy<Selector> = Lazy::new(|| Selector::parse(".cat-links").unwrap());

static CONTENT_ROOT: Lazy<Vec<Selector>> = Lazy::new(|| selectors(&["article", "main"]));

static BODY: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        ".entry-content",
        ".post-content",
        ".article-content",
        "article",
        "main",
    ])
});

const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe",
    "button", "svg", "template",
];

const BOILERPLATE_TOKENS: &[&str] = &[
    "sharedaddy",
    "sd-sharing-enabled",
    "sharing",
    "share",
    "social",
    "social-share",
    "jp-relatedposts",
    "related",
    "related-posts",
    "yarpp-related",
    "ad",
    "ads",
    "advert",
    "advertisement",
    "banner",
    "widget",
    "navigation",
    "nav-links",
    "post-navigation",
    "comments",
    "comment-respond",
    "entry-footer",
    "entry-meta",
    "screen-reader-text",
];

const BOILERPLATE_PREFIXES: &[&str] = &["ad-", "ads-", "addtoany", "jp-relatedposts", "sharedaddy"];

/// Wrappers that hold the entry's own date and categories. Body extraction
/// drops them; metadata lookups must not.
const ENTRY_META_TAGS: &[&str] = &["header", "footer"];
const ENTRY_META_TOKENS: &[&str] = &["entry-header", "entry-meta", "entry-footer"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre", "table", "tr", "td", "th", "figure", "figcaption", "dd", "dt", "hr",
];

/// Parse one article page.
///
/// `summary` is the metadata the listing page showed for this article, used
/// for author, date and categories when the page itself lacks them.
///
/// # Errors
///
/// Returns [`ParseFailure::MissingTitle`] or [`ParseFailure::MissingBody`]
/// when a required field cannot be extracted. Never returns a record with
/// an empty title or body.
#[instrument(level = "debug", skip_all, fields(url = %source_url))]
pub fn parse_article(
    html: &str,
    source_url: &Url,
    summary: Option<&ListingSummary>,
) -> Result<ArticleRecord, ParseFailure> {
    let document = Html::parse_document(html);

    let title = first_text(&document, &TITLE).ok_or(ParseFailure::MissingTitle)?;
    let body = extract_body(&document).ok_or(ParseFailure::MissingBody)?;

    let author = extract_author(&document)
        .or_else(|| summary.and_then(|s| s.author.clone()))
        .map(|a| strip_byline(&a))
        .filter(|a| !a.is_empty());

    let mut published_date = None;
    let mut raw_dates = date_candidates(&document);
    if let Some(fallback) = summary.and_then(|s| s.date_text.clone()) {
        raw_dates.push(fallback);
    }
    if let Some(date) = raw_dates.iter().find_map(|raw| normalize_date(raw)) {
        published_date = Some(date);
    } else if !raw_dates.is_empty() {
        warn!(url = %source_url, raw = ?raw_dates, "unrecognized publication date");
    }

    let mut categories = extract_categories(&document);
    if categories.is_empty() {
        if let Some(s) = summary {
            categories = s.categories.iter().cloned().unique().collect();
        }
    }

    debug!(
        title = %title,
        author = ?author,
        date = ?published_date,
        categories = categories.len(),
        body_chars = body.chars().count(),
        "parsed article"
    );

    Ok(ArticleRecord {
        title,
        author,
        published_date,
        categories,
        body,
        source_url: source_url.to_string(),
    })
}

/// Collapsed text of an element and all its descendants.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn non_empty_text(element: ElementRef<'_>) -> Option<String> {
    Some(element_text(element)).filter(|t| !t.is_empty())
}

fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors
        .iter()
        .flat_map(|s| document.select(s))
        .find_map(non_empty_text)
}

fn extract_author(document: &Html) -> Option<String> {
    AUTHOR.iter().flat_map(|s| document.select(s)).find_map(|el| {
        match el.value().attr("content") {
            Some(content) => Some(collapse_whitespace(content)).filter(|c| !c.is_empty()),
            None => non_empty_text(el),
        }
    })
}

fn strip_byline(author: &str) -> String {
    let author = author.trim();
    for prefix in ["por ", "by "] {
        if author
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return author[prefix.len()..].trim().to_string();
        }
    }
    author.to_string()
}

fn date_candidates(document: &Html) -> Vec<String> {
    let root = content_root(document);
    let meta = document
        .select(&PUBLISHED_META)
        .filter_map(|el| el.value().attr("content"))
        .map(|v| v.trim().to_string());
    let attrs = DATE_ATTR.iter().flat_map(|(selector, attr)| {
        root.select(selector)
            .filter(|el| !in_foreign_block(*el))
            .filter_map(move |el| el.value().attr(attr))
            .map(|v| v.trim().to_string())
    });
    let texts = DATE_TEXT
        .iter()
        .flat_map(|s| root.select(s))
        .filter(|el| !in_foreign_block(*el))
        .filter_map(non_empty_text);
    meta.chain(attrs)
        .chain(texts)
        .filter(|d| !d.is_empty())
        .unique()
        .collect()
}

fn extract_categories(document: &Html) -> Vec<String> {
    let root = content_root(document);
    let linked: Vec<String> = root
        .select(&CATEGORY_LINKS)
        .filter(|el| !in_foreign_block(*el))
        .map(element_text)
        .filter(|c| !c.is_empty())
        .unique()
        .collect();
    if !linked.is_empty() {
        return linked;
    }
    root.select(&CATEGORY_BLOCK)
        .filter(|el| !in_foreign_block(*el))
        .flat_map(|block| {
            element_text(block)
                .split(',')
                .map(|c| c.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|c| !c.is_empty())
        .unique()
        .collect()
}

/// The entry itself: the first `<article>`, else `<main>`, else the page.
fn content_root(document: &Html) -> ElementRef<'_> {
    CONTENT_ROOT
        .iter()
        .find_map(|s| document.select(s).next())
        .unwrap_or_else(|| document.root_element())
}

/// Whether `element` sits inside a sidebar, comment thread, widget or
/// similar block that does not describe the entry.
fn in_foreign_block(element: ElementRef<'_>) -> bool {
    std::iter::once(*element)
        .chain(element.ancestors())
        .filter_map(ElementRef::wrap)
        .any(|el| {
            let el = el.value();
            is_boilerplate(el)
                && !ENTRY_META_TAGS.contains(&el.name())
                && !el.classes().any(|c| ENTRY_META_TOKENS.contains(&c))
        })
}

fn extract_body(document: &Html) -> Option<String> {
    BODY.iter()
        .flat_map(|s| document.select(s))
        .map(|root| {
            let mut raw = String::new();
            visible_text(root, &mut raw);
            collapse_whitespace(&raw)
        })
        .find(|body| !body.is_empty())
}

fn visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if is_boilerplate(el) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    out.push(' ');
                }
                visible_text(child_el, out);
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn is_boilerplate(el: &Element) -> bool {
    if BOILERPLATE_TAGS.contains(&el.name()) {
        return true;
    }
    el.classes().chain(el.id()).any(|token| {
        let token = token.to_ascii_lowercase();
        BOILERPLATE_TOKENS.contains(&token.as_str())
            || BOILERPLATE_PREFIXES.iter().any(|p| token.starts_with(p))
    })
}

static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})").unwrap());
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:\s+de)?\s+([a-záéíóúñ]+)\.?,?(?:\s+del?)?\s+(\d{4})\b").unwrap()
});
static MONTH_DAY_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})\b").unwrap());
static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

/// Normalize a source date to `<day> de <mes> de <year>`.
///
/// Understands RFC 3339 / ISO dates, Spanish and English long forms and
/// numeric `dd/mm/yyyy`. Returns `None` when nothing yields a valid date.
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw.trim()).map(|d| {
        format!("{} de {} de {}", d.day(), MONTH_NAMES[d.month0() as usize], d.year())
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Some(c) = ISO_PREFIX.captures(raw) {
        return ymd(&c[1], month_from_digits(&c[2])?, &c[3]);
    }
    let from_words = DAY_MONTH_YEAR
        .captures_iter(raw)
        .find_map(|c| ymd(&c[3], month_from_name(&c[2])?, &c[1]))
        .or_else(|| {
            MONTH_DAY_YEAR
                .captures_iter(raw)
                .find_map(|c| ymd(&c[3], month_from_name(&c[1])?, &c[2]))
        });
    if from_words.is_some() {
        return from_words;
    }
    NUMERIC
        .captures(raw)
        .and_then(|c| ymd(&c[3], month_from_digits(&c[2])?, &c[1]))
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_from_digits(s: &str) -> Option<u32> {
    s.parse().ok().filter(|m| (1..=12).contains(m))
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "enero" | "ene" | "january" | "jan" => 1,
        "febrero" | "feb" | "february" => 2,
        "marzo" | "mar" | "march" => 3,
        "abril" | "abr" | "april" | "apr" => 4,
        "mayo" | "may" => 5,
        "junio" | "jun" | "june" => 6,
        "julio" | "jul" | "july" => 7,
        "agosto" | "ago" | "august" | "aug" => 8,
        "septiembre" | "setiembre" | "sep" | "sept" | "september" => 9,
        "octubre" | "oct" | "october" => 10,
        "noviembre" | "nov" | "november" => 11,
        "diciembre" | "dic" | "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}
