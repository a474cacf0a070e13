//! Browser-side silent SSO script.
//!
//! The script checks `document.cookie` for the auth cookie and, if missing,
//! loads the validation URL in a hidden iframe. It exposes
//! `window.__cookiegateReady`, a promise that resolves when the cookie is
//! already present, when the iframe posts the completion message, or after
//! the timeout, whichever comes first. It never blocks the page forever.

use std::time::Duration;

/// Fail-open deadline for the iframe flow.
pub const SSO_TIMEOUT: Duration = Duration::from_secs(15);

/// Parameters of the rendered script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoScript {
    pub validation_url: String,
    pub validation_query: Option<String>,
    pub cookie_name: String,
    pub completion_message: String,
    pub timeout: Duration,
}

impl SsoScript {
    /// Script for `validation_url` that waits for `cookie_name` or for the
    /// iframe to post `completion_message`.
    pub fn new(
        validation_url: impl Into<String>,
        cookie_name: impl Into<String>,
        completion_message: impl Into<String>,
    ) -> Self {
        Self {
            validation_url: validation_url.into(),
            validation_query: None,
            cookie_name: cookie_name.into(),
            completion_message: completion_message.into(),
            timeout: SSO_TIMEOUT,
        }
    }

    /// Validation URL with the optional query appended.
    pub fn iframe_url(&self) -> String {
        match self.validation_query.as_deref().map(|q| q.trim_start_matches(['?', '&'])) {
            Some(query) if !query.is_empty() => {
                let separator = if self.validation_url.contains('?') { '&' } else { '?' };
                format!("{}{}{}", self.validation_url, separator, query)
            }
            _ => self.validation_url.clone(),
        }
    }

    pub fn render(&self) -> String {
        render(self)
    }
}

const TEMPLATE: &str = r#"(function () {
  var validationUrl = __VALIDATION_URL__;
  var cookieName = __COOKIE_NAME__;
  var completionMessage = __COMPLETION_MESSAGE__;
  var timeoutMs = __TIMEOUT_MS__;

  function hasAuthCookie() {
    return document.cookie.split(';').some(function (part) {
      return part.trim().indexOf(cookieName + '=') === 0;
    });
  }

  window.__cookiegateReady = new Promise(function (resolve) {
    if (hasAuthCookie()) {
      resolve();
      return;
    }

    var settled = false;
    var iframe = document.createElement('iframe');
    var timer = null;

    function finish() {
      if (settled) return;
      settled = true;
      window.removeEventListener('message', onMessage);
      if (timer !== null) clearTimeout(timer);
      if (iframe.parentNode) iframe.parentNode.removeChild(iframe);
      resolve();
    }

    function onMessage(event) {
      if (event.data === completionMessage) finish();
    }

    window.addEventListener('message', onMessage);
    timer = setTimeout(finish, timeoutMs);

    iframe.style.display = 'none';
    iframe.setAttribute('aria-hidden', 'true');
    iframe.src = validationUrl;
    (document.body || document.documentElement).appendChild(iframe);
  });
})();
"#;

/// Render the script with every value embedded as a JS string literal.
pub fn render(script: &SsoScript) -> String {
    TEMPLATE
        .replace("__VALIDATION_URL__", &js_string(&script.iframe_url()))
        .replace("__COOKIE_NAME__", &js_string(&script.cookie_name))
        .replace("__COMPLETION_MESSAGE__", &js_string(&script.completion_message))
        .replace("__TIMEOUT_MS__", &script.timeout.as_millis().to_string())
}

/// JSON string literal, with `</` broken up so it is safe inline in HTML.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iframe_url_appends_query() {
        let mut script = SsoScript::new(
            "https://dev.example.com/auth/validate",
            "myToken",
            "myToken-set",
        );
        assert_eq!(script.iframe_url(), "https://dev.example.com/auth/validate");

        script.validation_query = Some("silent=true".to_string());
        assert_eq!(
            script.iframe_url(),
            "https://dev.example.com/auth/validate?silent=true"
        );

        script.validation_url = "https://dev.example.com/auth?x=1".to_string();
        script.validation_query = Some("?silent=true".to_string());
        assert_eq!(
            script.iframe_url(),
            "https://dev.example.com/auth?x=1&silent=true"
        );
    }

    #[test]
    fn test_render_embeds_parameters() {
        let script = SsoScript {
            validation_url: "https://dev.example.com/validate".to_string(),
            validation_query: Some("prompt=none".to_string()),
            cookie_name: "sid".to_string(),
            completion_message: "sid-ready".to_string(),
            timeout: SSO_TIMEOUT,
        };
        let js = script.render();

        assert!(js.contains(r#"var validationUrl = "https://dev.example.com/validate?prompt=none";"#));
        assert!(js.contains(r#"var cookieName = "sid";"#));
        assert!(js.contains(r#"var completionMessage = "sid-ready";"#));
        assert!(js.contains("var timeoutMs = 15000;"));
        assert!(!js.contains("__VALIDATION_URL__"));
        assert!(!js.contains("__TIMEOUT_MS__"));
        assert!(js.contains("window.__cookiegateReady"));
    }

    #[test]
    fn test_new_uses_given_names() {
        let script = SsoScript::new("/validate", "myToken", "myToken-set");
        assert_eq!(script.timeout, SSO_TIMEOUT);
        assert!(script.validation_query.is_none());

        let js = script.render();
        assert!(js.contains(r#"var cookieName = "myToken";"#));
        assert!(js.contains(r#"var completionMessage = "myToken-set";"#));
    }

    #[test]
    fn test_values_are_escaped() {
        let script = SsoScript::new("/v", "a\"b</script>", "done");
        let js = script.render();
        assert!(js.contains(r#"var cookieName = "a\"b<\/script>";"#));
    }
}
