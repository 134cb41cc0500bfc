//! 📖 Справочный источник для динамических персон
//!
//! Поиск статьи по имени и получение ее текста. По умолчанию это
//! Wikipedia через MediaWiki API; язык выбирается по имени персоны.
//! "Не найдено", "неоднозначно" и сетевая ошибка различаются типом ошибки.

use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://{locale}.wikipedia.org/w/api.php";
pub const DEFAULT_USER_AGENT: &str = "persona-mind/0.1 (persona knowledge engine)";

/// Выбор языка справочника по имени персоны
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalePolicy {
    pub default_locale: String,
    /// Для имен с любым не-ASCII символом
    pub non_ascii_locale: String,
}

impl Default for LocalePolicy {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            non_ascii_locale: "ar".to_string(),
        }
    }
}

impl LocalePolicy {
    pub fn select(&self, name: &str) -> &str {
        if name.is_ascii() {
            &self.default_locale
        } else {
            &self.non_ascii_locale
        }
    }
}

/// Текст статьи после очистки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub content: String,
}

pub trait ReferenceSource: Send + Sync {
    /// Заголовки статей, лучший первым
    fn search(&self, query: &str, locale: &str, limit: usize) -> Result<Vec<String>>;

    /// Текст статьи; для страниц неоднозначности `Error::ReferenceAmbiguous`
    fn fetch(&self, title: &str, locale: &str) -> Result<Article>;
}

#[derive(Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct PageResponse {
    query: PageQuery,
}

#[derive(Deserialize)]
struct PageQuery {
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    title: String,
    #[serde(default)]
    missing: bool,
    /// Недопустимый заголовок (пустой, с `[]` и т.п.)
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    pageprops: Option<serde_json::Value>,
}

impl Page {
    fn is_disambiguation(&self) -> bool {
        self.pageprops
            .as_ref()
            .is_some_and(|props| props.get("disambiguation").is_some())
    }
}

#[derive(Deserialize)]
struct ParseResponse {
    parse: ParseLinks,
}

#[derive(Deserialize)]
struct ParseLinks {
    links: Vec<Link>,
}

#[derive(Deserialize)]
struct Link {
    ns: i64,
    title: String,
}

/// Что вернул запрос страницы
#[derive(Debug, PartialEq, Eq)]
enum FetchedPage {
    Article(Article),
    /// Страница неоднозначности; варианты нужно запросить отдельно
    Disambiguation(String),
}

fn search_titles(response: SearchResponse) -> Vec<String> {
    response.query.search.into_iter().map(|hit| hit.title).collect()
}

fn read_page(response: PageResponse, requested: &str, cleaner: &ArticleCleaner) -> Result<FetchedPage> {
    let not_found = || Error::ReferenceNotFound(requested.to_string());

    let page = response.query.pages.into_iter().next().ok_or_else(not_found)?;
    if page.missing || page.invalid {
        return Err(not_found());
    }
    if page.is_disambiguation() {
        return Ok(FetchedPage::Disambiguation(page.title));
    }

    let content = cleaner.clean(page.extract.as_deref().unwrap_or_default());
    if content.is_empty() {
        return Err(not_found());
    }
    Ok(FetchedPage::Article(Article {
        title: page.title,
        content,
    }))
}

/// Только статьи основного пространства имен (ns 0), в порядке ответа
fn link_titles(parsed: ParseResponse) -> Vec<String> {
    parsed
        .parse
        .links
        .into_iter()
        .filter(|link| link.ns == 0)
        .map(|link| link.title)
        .collect()
}

/// Убирает разметку заголовков `== Раздел ==` и схлопывает пустые строки
#[derive(Debug, Clone)]
pub struct ArticleCleaner {
    heading: Regex,
    blank_runs: Regex,
}

impl ArticleCleaner {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::ReferenceSource(format!("bad pattern: {e}")))
        };
        Ok(Self {
            heading: compile(r"(?m)^[ \t]*={2,}[^=\n]*={2,}[ \t]*$")?,
            blank_runs: compile(r"\n[ \t]*(?:\n[ \t]*)+")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let without_headings = self.heading.replace_all(text, "");
        let collapsed = self.blank_runs.replace_all(&without_headings, "\n\n");
        collapsed.trim().to_string()
    }
}

/// Клиент MediaWiki API
pub struct WikipediaClient {
    http: Client,
    /// Шаблон адреса API с `{locale}`
    endpoint: String,
    cleaner: ArticleCleaner,
}

impl WikipediaClient {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ReferenceSource(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            cleaner: ArticleCleaner::new()?,
        })
    }

    fn api_url(&self, locale: &str) -> String {
        self.endpoint.replace("{locale}", locale)
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, locale: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.api_url(locale);
        debug!(%url, ?params, "reference request");
        let response = self
            .http
            .get(&url)
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .map_err(|e| Error::ReferenceSource(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ReferenceSource(format!("{url} answered {status}")));
        }
        response
            .json()
            .map_err(|e| Error::ReferenceSource(format!("unexpected response: {e}")))
    }

    fn disambiguation_options(&self, title: &str, locale: &str) -> Result<Vec<String>> {
        let parsed: ParseResponse =
            self.get(locale, &[("action", "parse"), ("page", title), ("prop", "links")])?;
        Ok(link_titles(parsed))
    }
}

impl ReferenceSource for WikipediaClient {
    fn search(&self, query: &str, locale: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let response: SearchResponse = self.get(
            locale,
            &[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("srprop", ""),
            ],
        )?;
        Ok(search_titles(response))
    }

    fn fetch(&self, title: &str, locale: &str) -> Result<Article> {
        let response: PageResponse = self.get(
            locale,
            &[
                ("action", "query"),
                ("prop", "extracts|pageprops"),
                ("ppprop", "disambiguation"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ],
        )?;

        match read_page(response, title, &self.cleaner)? {
            FetchedPage::Article(article) => Ok(article),
            FetchedPage::Disambiguation(page_title) => {
                let options = self.disambiguation_options(&page_title, locale)?;
                Err(Error::ReferenceAmbiguous {
                    title: page_title,
                    options,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_selection() {
        let policy = LocalePolicy::default();
        assert_eq!(policy.select("صلاح الدين"), "ar");
        assert_eq!(policy.select("Marie Curie"), "en");
        assert_eq!(policy.select("Erwin Schrödinger"), "ar");
    }

    #[test]
    fn test_cleaner_strips_headings() {
        let cleaner = ArticleCleaner::new().unwrap();
        let raw = "Intro line.\n\n\n== Early life ==\nBorn in Ulm.\n\n\n\n=== Family ===\n\nHad a sister.\n";
        assert_eq!(
            cleaner.clean(raw),
            "Intro line.\n\nBorn in Ulm.\n\nHad a sister."
        );
    }

    #[test]
    fn test_cleaner_keeps_inline_equals() {
        let cleaner = ArticleCleaner::new().unwrap();
        assert_eq!(cleaner.clean("E = mc2 is famous."), "E = mc2 is famous.");
    }

    #[test]
    fn test_api_url_uses_locale() {
        let client = WikipediaClient::new(DEFAULT_ENDPOINT, DEFAULT_USER_AGENT, Duration::from_secs(5)).unwrap();
        assert_eq!(client.api_url("ar"), "https://ar.wikipedia.org/w/api.php");
    }

    fn page(json: &str) -> Result<FetchedPage> {
        let response: PageResponse = serde_json::from_str(json).unwrap();
        read_page(response, "Albert Einstein", &ArticleCleaner::new().unwrap())
    }

    #[test]
    fn test_read_page_article() {
        let fetched = page(
            r#"{"batchcomplete": true, "query": {
                "redirects": [{"from": "Einstein", "to": "Albert Einstein"}],
                "pages": [{"pageid": 736, "ns": 0, "title": "Albert Einstein",
                           "extract": "Albert Einstein was a physicist.\n\n\n== Life ==\nBorn in Ulm."}]
            }}"#,
        )
        .unwrap();
        assert_eq!(
            fetched,
            FetchedPage::Article(Article {
                title: "Albert Einstein".to_string(),
                content: "Albert Einstein was a physicist.\n\nBorn in Ulm.".to_string(),
            })
        );
    }

    #[test]
    fn test_read_page_not_found_cases() {
        for json in [
            r#"{"query": {"pages": [{"ns": 0, "title": "Albert Einstein", "missing": true}]}}"#,
            r#"{"query": {"pages": [{"title": "[[x]]", "invalidreason": "bad", "invalid": true}]}}"#,
            r#"{"query": {"pages": [{"pageid": 1, "ns": 0, "title": "Albert Einstein", "extract": ""}]}}"#,
            r#"{"query": {"pages": [{"pageid": 1, "ns": 0, "title": "Albert Einstein", "extract": "== Only ==\n"}]}}"#,
            r#"{"query": {"pages": [{"pageid": 1, "ns": 0, "title": "Albert Einstein"}]}}"#,
            r#"{"query": {"pages": []}}"#,
        ] {
            let err = page(json).unwrap_err();
            assert!(
                matches!(err, Error::ReferenceNotFound(ref name) if name == "Albert Einstein"),
                "{json} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_read_page_disambiguation() {
        let fetched = page(
            r#"{"query": {"pages": [{"pageid": 19, "ns": 0, "title": "Mercury",
                "extract": "Mercury may refer to:", "pageprops": {"disambiguation": ""}}]}}"#,
        )
        .unwrap();
        assert_eq!(fetched, FetchedPage::Disambiguation("Mercury".to_string()));
    }

    #[test]
    fn test_link_titles_keep_main_namespace_in_order() {
        let parsed: ParseResponse = serde_json::from_str(
            r#"{"parse": {"title": "Mercury", "pageid": 19, "links": [
                {"ns": 0, "exists": true, "title": "Mercury (planet)"},
                {"ns": 14, "exists": true, "title": "Category:Disambiguation pages"},
                {"ns": 4, "exists": true, "title": "Wikipedia:Disambiguation"},
                {"ns": 0, "exists": true, "title": "Mercury (element)"}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(link_titles(parsed), vec!["Mercury (planet)", "Mercury (element)"]);
    }

    #[test]
    fn test_search_titles_in_rank_order() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"batchcomplete": true, "continue": {"sroffset": 3, "continue": "-||"},
                "query": {"searchinfo": {"totalhits": 120}, "search": [
                    {"ns": 0, "title": "Marie Curie", "pageid": 20408},
                    {"ns": 0, "title": "Pierre Curie", "pageid": 24613}
                ]}}"#,
        )
        .unwrap();
        assert_eq!(search_titles(response), vec!["Marie Curie", "Pierre Curie"]);
    }

    #[test]
    fn test_page_disambiguation_flag() {
        let page: Page = serde_json::from_str(
            r#"{"title": "Mercury", "pageprops": {"disambiguation": ""}}"#,
        )
        .unwrap();
        assert!(page.is_disambiguation());
        assert!(!page.missing);

        let page: Page = serde_json::from_str(r#"{"title": "Nope", "missing": true}"#).unwrap();
        assert!(page.missing);
        assert!(!page.is_disambiguation());
    }
}
