//! Web tools for the agent: Wikipedia, arXiv and DuckDuckGo.
//!
//! Each tool takes a plain search query, returns the top result as a short
//! text block, and truncates it to `tools.max_chars` characters. A query
//! with no hits is not an error; the tool says so in its output.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ToolsConfig;
use docqa_core::agent::{Tool, ToolRegistry};

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn http_client(config: &ToolsConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("docqa/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

async fn get_text(request: reqwest::RequestBuilder, label: &str) -> Result<String> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} request failed", label))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("{} returned {}", label, status);
    }
    Ok(response.text().await?)
}

// ============ Wikipedia ============

pub struct WikipediaTool {
    client: reqwest::Client,
    url: String,
    max_chars: usize,
}

impl WikipediaTool {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.wikipedia_url.clone(),
            max_chars: config.max_chars,
        })
    }
}

fn parse_wikipedia(json: &serde_json::Value) -> Option<String> {
    let pages = json.get("query")?.get("pages")?.as_object()?;
    let page = pages
        .values()
        .min_by_key(|p| p.get("index").and_then(|i| i.as_u64()).unwrap_or(u64::MAX))?;
    let title = page.get("title")?.as_str()?;
    let extract = page.get("extract").and_then(|e| e.as_str()).unwrap_or("");
    Some(format!("Page: {}\nSummary: {}", title, extract.trim()))
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "A wrapper around Wikipedia. Useful for when you need to answer general questions about \
         people, places, companies, facts, historical events, or other subjects. \
         Input should be a search query."
    }

    async fn call(&self, query: &str) -> Result<String> {
        let request = self.client.get(&self.url).query(&[
            ("action", "query"),
            ("format", "json"),
            ("generator", "search"),
            ("gsrsearch", query),
            ("gsrlimit", "1"),
            ("prop", "extracts"),
            ("exintro", "1"),
            ("explaintext", "1"),
        ]);
        let body = get_text(request, "Wikipedia").await?;
        let json: serde_json::Value =
            serde_json::from_str(&body).context("Wikipedia returned invalid JSON")?;

        Ok(match parse_wikipedia(&json) {
            Some(text) => truncate_chars(&text, self.max_chars),
            None => "No good Wikipedia Search Result was found".to_string(),
        })
    }
}

// ============ arXiv ============

pub struct ArxivTool {
    client: reqwest::Client,
    url: String,
    max_chars: usize,
}

impl ArxivTool {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.arxiv_url.clone(),
            max_chars: config.max_chars,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ArxivEntry {
    published: String,
    title: String,
    authors: Vec<String>,
    summary: String,
}

impl ArxivEntry {
    fn render(&self) -> String {
        let published = self.published.get(..10).unwrap_or(&self.published);
        format!(
            "Published: {}\nTitle: {}\nAuthors: {}\nSummary: {}",
            published,
            collapse_whitespace(&self.title),
            self.authors.join(", "),
            collapse_whitespace(&self.summary)
        )
    }
}

/// First `<entry>` of an arXiv Atom feed.
fn parse_arxiv_feed(xml: &str) -> Result<Option<ArxivEntry>> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entry: Option<ArxivEntry> = None;
    let mut field: Option<Vec<u8>> = None;
    let mut in_author = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"entry" => entry = Some(ArxivEntry::default()),
                    b"author" => in_author = true,
                    _ => field = Some(name),
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(current), Some(name)) = (entry.as_mut(), field.as_deref()) {
                    let text = t.unescape().map_err(|e| anyhow::anyhow!("arXiv feed: {}", e))?;
                    match name {
                        b"title" => current.title.push_str(&text),
                        b"summary" => current.summary.push_str(&text),
                        b"published" => current.published.push_str(&text),
                        b"name" if in_author => current.authors.push(text.trim().to_string()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"entry" => return Ok(entry),
                b"author" => in_author = false,
                _ => field = None,
            },
            Ok(Event::Eof) => return Ok(None),
            Err(e) => anyhow::bail!("arXiv feed is not valid XML: {}", e),
            _ => {}
        }
        buf.clear();
    }
}

#[async_trait]
impl Tool for ArxivTool {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn description(&self) -> &str {
        "A wrapper around Arxiv.org. Useful for when you need to answer questions about Physics, \
         Mathematics, Computer Science, Quantitative Biology, Quantitative Finance, Statistics, \
         Electrical Engineering, and Economics from scientific articles on arxiv.org. \
         Input should be a search query."
    }

    async fn call(&self, query: &str) -> Result<String> {
        let search = format!("all:{}", query);
        let request = self.client.get(&self.url).query(&[
            ("search_query", search.as_str()),
            ("start", "0"),
            ("max_results", "1"),
        ]);
        let body = get_text(request, "arXiv").await?;

        Ok(match parse_arxiv_feed(&body)? {
            Some(entry) => truncate_chars(&entry.render(), self.max_chars),
            None => "No good Arxiv Result was found".to_string(),
        })
    }
}

// ============ DuckDuckGo ============

/// General web lookup through the DuckDuckGo Instant Answer API.
pub struct WebSearchTool {
    client: reqwest::Client,
    url: String,
    max_chars: usize,
}

impl WebSearchTool {
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: config.search_url.clone(),
            max_chars: config.max_chars,
        })
    }
}

fn parse_instant_answer(json: &serde_json::Value) -> Option<String> {
    let field = |key: &str| {
        json.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(text) = field("AbstractText").or_else(|| field("Answer")) {
        return Some(text);
    }

    let related: Vec<&str> = json
        .get("RelatedTopics")?
        .as_array()?
        .iter()
        .filter_map(|t| t.get("Text").and_then(|v| v.as_str()))
        .filter(|t| !t.trim().is_empty())
        .take(3)
        .collect();
    if related.is_empty() {
        None
    } else {
        Some(related.join(" "))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "Search"
    }

    fn description(&self) -> &str {
        "A wrapper around DuckDuckGo Search. Useful for when you need to answer questions about \
         current events. Input should be a search query."
    }

    async fn call(&self, query: &str) -> Result<String> {
        let request = self.client.get(&self.url).query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let body = get_text(request, "DuckDuckGo").await?;
        let json: serde_json::Value =
            serde_json::from_str(&body).context("DuckDuckGo returned invalid JSON")?;

        Ok(match parse_instant_answer(&json) {
            Some(text) => truncate_chars(&text, self.max_chars),
            None => "No good DuckDuckGo Search Result was found".to_string(),
        })
    }
}

/// The enabled web tools, in the order the agent sees them.
pub fn build_tools(config: &ToolsConfig) -> Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    if config.wikipedia {
        tools.register(Arc::new(WikipediaTool::new(config)?));
    }
    if config.arxiv {
        tools.register(Arc::new(ArxivTool::new(config)?));
    }
    if config.web_search {
        tools.register(Arc::new(WebSearchTool::new(config)?));
    }
    Ok(tools)
}
