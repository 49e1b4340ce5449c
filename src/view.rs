use tracing::warn;

use crate::snapshot::{
    ConfigSnapshot, ParamError, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_NAME, DEFAULT_TEMPERATURE,
    MAX_TOKENS_KEY, TEMPERATURE_KEY,
};

/// Seconds between client-side page reloads
pub const PAGE_REFRESH_SECS: u64 = 5;

/// The values shown on the HTML page
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigView {
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: i64,
}

impl Default for ConfigView {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ConfigView {
    /// Start from the defaults and take every value the snapshot actually provides
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let mut view = Self::default();

        if !snapshot.model_name().is_empty() {
            view.model_name = snapshot.model_name().to_string();
        }
        if let Some(temperature) = usable(TEMPERATURE_KEY, snapshot.temperature()) {
            view.temperature = temperature;
        }
        if let Some(max_tokens) = usable(MAX_TOKENS_KEY, snapshot.max_tokens()) {
            view.max_tokens = max_tokens;
        }

        view
    }

    pub fn render_html(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <title>Configuration State</title>
    <style>
        body {{
            font-family: Arial, sans-serif;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f5f5f5;
        }}
        .config-container {{
            background-color: white;
            padding: 20px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        .config-item {{
            margin-bottom: 15px;
            padding: 10px;
            border-bottom: 1px solid #eee;
        }}
        .config-label {{
            font-weight: bold;
            color: #333;
            margin-bottom: 5px;
        }}
        .config-value {{
            color: #666;
            font-family: monospace;
            background-color: #f8f9fa;
            padding: 5px;
            border-radius: 4px;
        }}
        h1 {{
            color: #2c3e50;
            margin-bottom: 20px;
        }}
        .last-updated {{
            color: #666;
            font-size: 0.9em;
            text-align: right;
            margin-top: 20px;
        }}
    </style>
</head>
<body>
    <div class="config-container">
        <h1>Configuration State</h1>
        <div class="config-item">
            <div class="config-label">Model Name:</div>
            <div class="config-value">{model_name}</div>
        </div>
        <div class="config-item">
            <div class="config-label">Temperature:</div>
            <div class="config-value">{temperature}</div>
        </div>
        <div class="config-item">
            <div class="config-label">Max Tokens:</div>
            <div class="config-value">{max_tokens}</div>
        </div>
        <div class="last-updated">
            Auto-refreshes every {refresh_secs} seconds
        </div>
        <script>
            setTimeout(function() {{
                window.location.reload();
            }}, {refresh_millis});
        </script>
    </div>
</body>
</html>
"#,
            model_name = escape_html(&self.model_name),
            temperature = self.temperature,
            max_tokens = self.max_tokens,
            refresh_secs = PAGE_REFRESH_SECS,
            refresh_millis = PAGE_REFRESH_SECS * 1000,
        )
    }
}

/// Missing values fall back silently; values of the wrong type fall back with a warning
fn usable<T>(key: &str, value: Result<T, ParamError>) -> Option<T> {
    match value {
        Ok(value) => Some(value),
        Err(ParamError::Missing(_)) => None,
        Err(e) => {
            warn!("Ignoring parameter '{}': {}", key, e);
            None
        }
    }
}

/// Escape text for inclusion in HTML element content
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
