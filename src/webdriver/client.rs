//! WebDriver HTTP client
//!
//! One [`WebDriverClient`] owns one WebDriver session. Every command is a
//! JSON request whose response carries its payload under `value`; failures
//! come back as `{"value": {"error", "message"}}` and are mapped onto
//! [`Error::WebDriver`] with the W3C error code preserved.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::browser::{BrowserSession, DialogResponse, ElementId, ElementState, Selector};
use crate::common::{truncate_for_message, Error, Result};

use super::types::*;

/// Picks an `<option>` by value, falling back to its visible label
const SELECT_OPTION_SCRIPT: &str = r#"
const select = arguments[0];
const wanted = arguments[1];
const options = Array.from(select.options || []);
const option = options.find(o => o.value === wanted) || options.find(o => o.label === wanted || o.text.trim() === wanted);
if (!option) { throw new Error('No option with value or label ' + JSON.stringify(wanted)); }
option.selected = true;
select.dispatchEvent(new Event('input', { bubbles: true }));
select.dispatchEvent(new Event('change', { bubbles: true }));
"#;

/// Client bound to one WebDriver session
pub struct WebDriverClient {
    http: reqwest::Client,
    /// Session URL: `<endpoint>/session/<id>`
    session_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Open a new session on `endpoint`
    pub async fn create_session(
        http: reqwest::Client,
        endpoint: &str,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/');
        let request = NewSessionRequest {
            capabilities: CapabilitiesRequest {
                always_match: capabilities,
            },
        };
        let body = serde_json::to_value(&request)?;
        tracing::debug!(%endpoint, capabilities = %body, "creating WebDriver session");

        let value: NewSessionValue =
            send(&http, Method::POST, &format!("{}/session", endpoint), "new session", Some(body))
                .await
                .map_err(|e| match e {
                    Error::WebDriver { code, message, .. } => {
                        Error::SessionFailed(format!("{}: {}", code, message))
                    }
                    other => other,
                })?;

        tracing::debug!(session = %value.session_id, "WebDriver session created");
        Ok(Self {
            http,
            session_url: format!("{}/session/{}", endpoint, value.session_id),
            session_id: value.session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Size the browser window
    pub async fn set_window_rect(&self, width: u32, height: u32) -> Result<()> {
        let _: Value = self
            .command(Method::POST, "/window/rect", "set window rect", Some(json!({ "width": width, "height": height })))
            .await?;
        Ok(())
    }

    async fn command<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        name: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.http, method, &url, name, body).await
    }

    /// Command whose payload is ignored (`null` on success)
    async fn execute(&self, method: Method, path: &str, name: &str, body: Option<Value>) -> Result<()> {
        let _: Value = self.command(method, path, name, body).await?;
        Ok(())
    }

    async fn element_get<T: DeserializeOwned>(&self, element: &ElementId, what: &str) -> Result<T> {
        self.command(
            Method::GET,
            &format!("/element/{}/{}", element.0, what),
            what,
            None,
        )
        .await
    }
}

/// Send one request and unwrap the `value` envelope
async fn send<T: DeserializeOwned>(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    name: &str,
    body: Option<Value>,
) -> Result<T> {
    let mut request = http.request(method.clone(), url);
    // POST bodies are mandatory in WebDriver, even when empty
    if let Some(body) = &body {
        request = request.json(body);
    } else if method == Method::POST {
        request = request.json(&json!({}));
    }
    tracing::trace!(%method, %url, "WebDriver >>>");

    let response = request
        .send()
        .await
        .map_err(|e| Error::DriverUnreachable(format!("{} {}: {}", method, url, e)))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::DriverUnreachable(format!("{} {}: {}", method, url, e)))?;
    tracing::trace!(%status, body = %truncate_for_message(&text, 500), "WebDriver <<<");

    if !status.is_success() {
        return Err(match serde_json::from_str::<Envelope<ErrorValue>>(&text) {
            Ok(env) => map_error(name, env.value),
            Err(_) => Error::Protocol(format!(
                "{} returned HTTP {}: {}",
                name,
                status,
                truncate_for_message(&text, 200)
            )),
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
        Error::Protocol(format!("Unexpected response to {}: {}", name, e))
    })?;
    Ok(envelope.value)
}

fn map_error(command: &str, error: ErrorValue) -> Error {
    let message = error.message.lines().next().unwrap_or_default().to_string();
    match error.error.as_str() {
        "javascript error" => Error::Script(message),
        code => Error::webdriver(command, code, &message),
    }
}

fn element_ref(element: &ElementId) -> Value {
    let mut reference = serde_json::Map::new();
    reference.insert(ELEMENT_KEY.to_string(), Value::String(element.0.clone()));
    Value::Object(reference)
}

fn element_id(value: &Value) -> Result<ElementId> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementId(id.to_string()))
        .ok_or_else(|| Error::Protocol(format!("Expected element reference, got {}", value)))
}

#[async_trait]
impl BrowserSession for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.execute(Method::POST, "/url", "navigate", Some(json!({ "url": url })))
            .await
    }

    async fn back(&self) -> Result<()> {
        self.execute(Method::POST, "/back", "back", None).await
    }

    async fn refresh(&self) -> Result<()> {
        self.execute(Method::POST, "/refresh", "refresh", None).await
    }

    async fn current_url(&self) -> Result<String> {
        self.command(Method::GET, "/url", "get url", None).await
    }

    async fn title(&self) -> Result<String> {
        self.command(Method::GET, "/title", "get title", None).await
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementId>> {
        let (using, value) = selector.locator();
        let found: Vec<Value> = self
            .command(
                Method::POST,
                "/elements",
                "find elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;
        found.iter().map(element_id).collect()
    }

    async fn element_state(&self, element: &ElementId) -> Result<ElementState> {
        let displayed: bool = self.element_get(element, "displayed").await?;
        let enabled: bool = self.element_get(element, "enabled").await?;
        let selected: bool = self.element_get(element, "selected").await?;
        let text: String = self.element_get(element, "text").await?;
        let value: Value = self.element_get(element, "property/value").await?;

        Ok(ElementState {
            displayed,
            enabled,
            selected,
            text,
            value: match value {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            },
        })
    }

    async fn element_attribute(&self, element: &ElementId, name: &str) -> Result<Option<String>> {
        self.element_get(element, &format!("attribute/{}", name)).await
    }

    async fn click(&self, element: &ElementId) -> Result<()> {
        self.execute(Method::POST, &format!("/element/{}/click", element.0), "click", None)
            .await
    }

    async fn clear(&self, element: &ElementId) -> Result<()> {
        self.execute(Method::POST, &format!("/element/{}/clear", element.0), "clear", None)
            .await
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()> {
        self.execute(
            Method::POST,
            &format!("/element/{}/value", element.0),
            "send keys",
            Some(json!({ "text": text })),
        )
        .await
    }

    async fn select_option(&self, element: &ElementId, value: &str) -> Result<()> {
        self.execute_script(SELECT_OPTION_SCRIPT, vec![element_ref(element), Value::from(value)])
            .await?;
        Ok(())
    }

    async fn dialog_text(&self) -> Result<Option<String>> {
        match self.command::<String>(Method::GET, "/alert/text", "get alert text", None).await {
            Ok(text) => Ok(Some(text)),
            Err(Error::WebDriver { code, .. }) if code == "no such alert" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn respond_to_dialog(&self, response: &DialogResponse) -> Result<()> {
        match response {
            DialogResponse::Accept { prompt_text } => {
                if let Some(text) = prompt_text {
                    self.execute(Method::POST, "/alert/text", "send alert text", Some(json!({ "text": text })))
                        .await?;
                }
                self.execute(Method::POST, "/alert/accept", "accept alert", None).await
            }
            DialogResponse::Dismiss => {
                self.execute(Method::POST, "/alert/dismiss", "dismiss alert", None).await
            }
        }
    }

    async fn window_handles(&self) -> Result<Vec<String>> {
        self.command(Method::GET, "/window/handles", "get window handles", None).await
    }

    async fn switch_to_window(&self, handle: &str) -> Result<()> {
        self.execute(Method::POST, "/window", "switch to window", Some(json!({ "handle": handle })))
            .await
    }

    async fn close_window(&self) -> Result<()> {
        let _remaining: Vec<String> = self.command(Method::DELETE, "/window", "close window", None).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let encoded: String = self.command(Method::GET, "/screenshot", "screenshot", None).await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::Protocol(format!("Screenshot is not valid base64: {}", e)))
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            "execute script",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(session = %self.session_id, "closing WebDriver session");
        send::<Value>(&self.http, Method::DELETE, &self.session_url, "delete session", None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id_parsing() {
        let value = element_ref(&ElementId("abc-123".to_string()));
        assert_eq!(element_id(&value).unwrap(), ElementId("abc-123".to_string()));
        assert!(matches!(element_id(&json!({"ELEMENT": "x"})), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_error_mapping() {
        let err = map_error(
            "click",
            ErrorValue {
                error: "element click intercepted".to_string(),
                message: "Element <a> is not clickable at point (10, 10)\n  (Session info: chrome=120)".to_string(),
            },
        );
        match err {
            Error::WebDriver { command, code, message } => {
                assert_eq!(command, "click");
                assert_eq!(code, "element click intercepted");
                assert!(!message.contains("Session info"));
            }
            other => panic!("unexpected {other}"),
        }

        let err = map_error(
            "execute script",
            ErrorValue {
                error: "javascript error".to_string(),
                message: "boom".to_string(),
            },
        );
        assert!(matches!(err, Error::Script(m) if m == "boom"));
    }

    #[test]
    fn test_element_ref_round_trip() {
        let element = ElementId("e1".to_string());
        assert_eq!(element_id(&element_ref(&element)).unwrap(), element);
    }
}
