//! Minimal W3C WebDriver client (geckodriver, chromedriver, selenium).

use serde_json::{json, Value};

use super::{BrowserDriver, BrowserSession, ElementId};
use crate::config::BrowserConfig;
use crate::error::MirrorError;
use crate::http::{json_request, HttpOptions, HttpResponse, Method};

/// Key of the element reference in W3C responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Clone)]
pub struct WebDriverClient {
    base_url: String,
    headless: bool,
    opts: HttpOptions,
}

impl WebDriverClient {
    pub fn new(base_url: impl Into<String>, headless: bool) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headless,
            opts: HttpOptions::api(),
        }
    }

    pub fn from_config(cfg: &BrowserConfig) -> Self {
        Self::new(cfg.webdriver_url.clone(), cfg.headless)
    }

    fn capabilities(&self) -> Value {
        if !self.headless {
            return json!({ "capabilities": { "alwaysMatch": {} } });
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": { "args": ["--headless=new", "--no-sandbox"] },
                    "moz:firefoxOptions": { "args": ["-headless"] }
                }
            }
        })
    }
}

/// `value` of a WebDriver reply, or the W3C error it carries.
fn unwrap_value(resp: &HttpResponse) -> Result<Value, MirrorError> {
    let mut body: Value = serde_json::from_slice(&resp.body).map_err(|e| {
        MirrorError::remote(format!("webdriver HTTP {}: bad reply: {}", resp.code, e))
    })?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(MirrorError::remote(format!("webdriver {}: {}", error, message)));
    }
    if !resp.is_success() {
        return Err(MirrorError::remote(format!("webdriver returned HTTP {}", resp.code)));
    }
    Ok(value)
}

fn is_no_such_element(resp: &HttpResponse) -> bool {
    serde_json::from_slice::<Value>(&resp.body)
        .ok()
        .and_then(|b| b.pointer("/value/error").and_then(Value::as_str).map(|e| e == "no such element"))
        .unwrap_or(false)
}

impl BrowserDriver for WebDriverClient {
    fn open_session(&self) -> Result<Box<dyn BrowserSession>, MirrorError> {
        let url = format!("{}/session", self.base_url);
        let resp = json_request(Method::Post, &url, &[], Some(&self.capabilities()), &self.opts)
            .map_err(MirrorError::transport)?;
        let value = unwrap_value(&resp)?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| MirrorError::remote("webdriver new session reply has no sessionId"))?;
        tracing::debug!(session = id, "webdriver session opened");
        Ok(Box::new(WebDriverSession {
            session_url: format!("{}/session/{}", self.base_url, id),
            opts: self.opts.clone(),
            closed: false,
        }))
    }
}

struct WebDriverSession {
    session_url: String,
    opts: HttpOptions,
    closed: bool,
}

impl WebDriverSession {
    fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<HttpResponse, MirrorError> {
        let url = format!("{}{}", self.session_url, path);
        json_request(method, &url, &[], body.as_ref(), &self.opts).map_err(MirrorError::transport)
    }

    fn element_path(element: &ElementId, rest: &str) -> String {
        format!("/element/{}{}", element.0, rest)
    }
}

impl BrowserSession for WebDriverSession {
    fn navigate(&mut self, url: &str) -> Result<(), MirrorError> {
        let resp = self.call(Method::Post, "/url", Some(json!({ "url": url })))?;
        unwrap_value(&resp).map(|_| ())
    }

    fn find(&mut self, selector: &str) -> Result<Option<ElementId>, MirrorError> {
        let resp = self.call(
            Method::Post,
            "/element",
            Some(json!({ "using": "css selector", "value": selector })),
        )?;
        if is_no_such_element(&resp) {
            return Ok(None);
        }
        let value = unwrap_value(&resp)?;
        let id = value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| MirrorError::remote("webdriver find element reply has no element reference"))?;
        Ok(Some(ElementId(id.to_string())))
    }

    fn send_keys(&mut self, element: &ElementId, text: &str) -> Result<(), MirrorError> {
        let resp = self.call(
            Method::Post,
            &Self::element_path(element, "/value"),
            Some(json!({ "text": text })),
        )?;
        unwrap_value(&resp).map(|_| ())
    }

    fn click(&mut self, element: &ElementId) -> Result<(), MirrorError> {
        let resp = self.call(Method::Post, &Self::element_path(element, "/click"), Some(json!({})))?;
        unwrap_value(&resp).map(|_| ())
    }

    fn attribute(&mut self, element: &ElementId, name: &str) -> Result<Option<String>, MirrorError> {
        let resp = self.call(
            Method::Get,
            &Self::element_path(element, &format!("/attribute/{}", name)),
            None,
        )?;
        Ok(unwrap_value(&resp)?.as_str().map(str::to_string))
    }

    fn text(&mut self, element: &ElementId) -> Result<String, MirrorError> {
        let resp = self.call(Method::Get, &Self::element_path(element, "/text"), None)?;
        Ok(unwrap_value(&resp)?.as_str().unwrap_or_default().to_string())
    }

    fn close(&mut self) -> Result<(), MirrorError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let resp = self.call(Method::Delete, "", None)?;
        unwrap_value(&resp).map(|_| ())?;
        tracing::debug!(session = %self.session_url, "webdriver session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseHeaders;

    fn resp(code: u32, body: &str) -> HttpResponse {
        HttpResponse {
            code,
            headers: ResponseHeaders::default(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn value_and_errors() {
        assert_eq!(
            unwrap_value(&resp(200, r#"{"value": {"sessionId": "s1", "capabilities": {}}}"#)).unwrap()["sessionId"],
            "s1"
        );
        assert_eq!(unwrap_value(&resp(200, r#"{"value": null}"#)).unwrap(), Value::Null);
        let err = unwrap_value(&resp(
            500,
            r#"{"value": {"error": "session not created", "message": "no browser", "stacktrace": ""}}"#,
        ))
        .unwrap_err();
        assert_eq!(
            err,
            MirrorError::RemoteService("webdriver session not created: no browser".into())
        );
    }

    #[test]
    fn missing_element_is_detected() {
        assert!(is_no_such_element(&resp(
            404,
            r#"{"value": {"error": "no such element", "message": "Unable to locate element"}}"#
        )));
        assert!(!is_no_such_element(&resp(200, r#"{"value": {}}"#)));
    }

    #[test]
    fn headless_capabilities() {
        let caps = WebDriverClient::new("http://127.0.0.1:4444/", true).capabilities();
        assert_eq!(
            caps.pointer("/capabilities/alwaysMatch/moz:firefoxOptions/args/0").unwrap(),
            "-headless"
        );
        let client = WebDriverClient::new("http://127.0.0.1:4444/", false);
        assert_eq!(client.base_url, "http://127.0.0.1:4444");
        assert!(client.capabilities()["capabilities"]["alwaysMatch"]
            .as_object()
            .unwrap()
            .is_empty());
    }
}
