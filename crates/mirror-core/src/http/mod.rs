//! libcurl plumbing shared by the sources, sinks and service clients.
//!
//! Everything here is blocking; callers run on the job's blocking pipeline
//! thread (or inside `spawn_blocking`).

mod headers;

pub use headers::ResponseHeaders;

use std::time::Duration;

use crate::config::HttpConfig;

/// Transfer limits applied to an `Easy` handle.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    /// Hard wall-clock limit; `None` for long transfers guarded by the low-speed limit.
    pub timeout: Option<Duration>,
    /// Abort when throughput stays below `.0` bytes/s for `.1`.
    pub low_speed: Option<(u32, Duration)>,
    pub user_agent: String,
    /// HTTP basic credentials.
    pub credentials: Option<(String, String)>,
}

impl HttpOptions {
    /// Limits for bulk transfers (downloads, uploads).
    pub fn transfer(cfg: &HttpConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            timeout: None,
            low_speed: Some((cfg.low_speed_limit, Duration::from_secs(cfg.low_speed_time_secs))),
            user_agent: cfg.user_agent.clone(),
            credentials: None,
        }
    }

    /// Limits for short API calls (RPC, JSON services, WebDriver).
    pub fn api() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: Some(Duration::from_secs(60)),
            low_speed: None,
            user_agent: format!("mirror/{}", env!("CARGO_PKG_VERSION")),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self::transfer(&HttpConfig::default())
    }
}

/// HTTP method for buffered requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub code: u32,
    pub headers: ResponseHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// New handle for `url` with redirects, timeouts and user agent applied.
pub fn easy_for(url: &str, opts: &HttpOptions) -> Result<curl::easy::Easy, curl::Error> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(opts.connect_timeout)?;
    if let Some(t) = opts.timeout {
        easy.timeout(t)?;
    }
    if let Some((limit, window)) = opts.low_speed {
        easy.low_speed_limit(limit)?;
        easy.low_speed_time(window)?;
    }
    easy.useragent(&opts.user_agent)?;
    if let Some((user, pass)) = &opts.credentials {
        easy.username(user)?;
        easy.password(pass)?;
    }
    Ok(easy)
}

/// Builds a curl header list from `(name, value)` pairs.
pub fn header_list<'a, I>(headers: I) -> Result<curl::easy::List, curl::Error>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut list = curl::easy::List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    Ok(list)
}

/// Runs the transfer on a prepared handle and buffers headers and body.
pub fn perform_buffered(easy: &mut curl::easy::Easy) -> Result<HttpResponse, curl::Error> {
    let mut headers = ResponseHeaders::default();
    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|line| {
            headers.push_line(line);
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }
    let code = easy.response_code()?;
    Ok(HttpResponse {
        code,
        headers,
        body,
    })
}

/// Buffered request with an optional JSON body.
pub fn json_request(
    method: Method,
    url: &str,
    extra_headers: &[(String, String)],
    body: Option<&serde_json::Value>,
    opts: &HttpOptions,
) -> Result<HttpResponse, curl::Error> {
    let mut easy = easy_for(url, opts)?;
    let mut pairs: Vec<(&str, &str)> = extra_headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    pairs.push(("Accept", "application/json"));
    match method {
        Method::Get => {}
        Method::Post => {
            easy.post(true)?;
            let payload = body.map(|b| b.to_string()).unwrap_or_else(|| "{}".to_string());
            easy.post_fields_copy(payload.as_bytes())?;
            pairs.push(("Content-Type", "application/json"));
        }
        Method::Delete => {
            easy.custom_request("DELETE")?;
        }
    }
    easy.http_headers(header_list(pairs)?)?;
    perform_buffered(&mut easy)
}
