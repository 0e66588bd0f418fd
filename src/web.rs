use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Bodies are cut here; scraping only keeps a short excerpt anyway
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("influencer-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            max_bytes: MAX_RESPONSE_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Fetching {} failed with status {}: {}",
                url,
                status,
                excerpt(&body, 200)
            );
        }

        let capacity = response
            .content_length()
            .map_or(0, |len| (len as usize).min(self.max_bytes));
        let mut bytes = Vec::with_capacity(capacity);
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?
        {
            let room = self.max_bytes - bytes.len();
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                debug!("Body of {} cut at {} bytes", url, self.max_bytes);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchedPage {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// Contents of the first `<title>` element
pub fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = collapse_whitespace(&html[start..end]);
    (!title.is_empty()).then_some(title)
}

/// Visible text with tags, scripts and styles removed
pub fn visible_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        text.push(' ');
        rest = &rest[open..];

        let lower_head: String = rest.chars().take(8).collect::<String>().to_ascii_lowercase();
        let skip_until = if lower_head.starts_with("<script") {
            Some("</script>")
        } else if lower_head.starts_with("<style") {
            Some("</style>")
        } else {
            None
        };

        match skip_until {
            Some(closing) => match rest.to_ascii_lowercase().find(closing) {
                Some(end) => rest = &rest[end + closing.len()..],
                None => rest = "",
            },
            None => match rest.find('>') {
                Some(end) => rest = &rest[end + 1..],
                None => rest = "",
            },
        }
    }
    text.push_str(rest);

    collapse_whitespace(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of `text`
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut clipped: String = text.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><TITLE>  Hello
        World </TITLE><style>body { color: red; }</style></head>
        <body><script>var x = "<b>";</script><h1>Heading</h1><p>Fish &amp; chips</p></body></html>"#;

    #[test]
    fn test_extract_title() {
        assert_eq!(extract_title(PAGE).as_deref(), Some("Hello World"));
        assert_eq!(extract_title("<p>no title</p>"), None);
        assert_eq!(extract_title("<title></title>"), None);
    }

    #[test]
    fn test_visible_text_strips_markup() {
        let text = visible_text(PAGE);
        assert!(text.contains("Heading Fish & chips"));
        assert!(!text.contains("color"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_http_fetcher_reads_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/post", server.uri());
        let page = HttpFetcher::new(Duration::from_secs(5)).unwrap().fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.url, url);
        assert_eq!(extract_title(&page.body).as_deref(), Some("Hello World"));
    }

    #[tokio::test]
    async fn test_http_fetcher_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
            .mount(&server)
            .await;

        let url = format!("{}/gone", server.uri());
        let err = HttpFetcher::new(Duration::from_secs(5)).unwrap().fetch(&url).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("500"), "{}", message);
        assert!(message.contains("backend down"), "{}", message);
    }

    #[tokio::test]
    async fn test_http_fetcher_caps_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let url = format!("{}/huge", server.uri());
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap().with_max_bytes(1024);
        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.body.len(), 1024);

        let exact = HttpFetcher::new(Duration::from_secs(5)).unwrap().with_max_bytes(10_000);
        assert_eq!(exact.fetch(&url).await.unwrap().body.len(), 10_000);
    }
}
