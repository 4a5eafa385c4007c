//! Locally rendered pages.
//!
//! Only authorization errors without a trusted redirect target end up here;
//! everything else is delivered to the client's redirect URI.

const STYLES: &str = r#"
body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
    background: #f4f5f9;
    color: #1c1f40;
    display: flex;
    justify-content: center;
    align-items: center;
    min-height: 100vh;
    margin: 0;
}
.card {
    background: #fff;
    border: 1px solid #e1e3ee;
    border-radius: 12px;
    padding: 2rem;
    max-width: 420px;
    text-align: center;
}
.error-title { font-size: 1.25rem; font-weight: 600; margin-bottom: 0.75rem; }
.error-description { color: #495057; margin-bottom: 1rem; }
.error-code { font-family: monospace; font-size: 0.8rem; color: #868e96; }
"#;

fn html_page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{STYLES}</style>\n</head>\n<body>\n{content}\n</body>\n</html>\n",
        html_escape(title)
    )
}

/// Renders the authorization error page.
pub fn render_error_page(error_code: &str, error_description: &str) -> String {
    let mut content = String::with_capacity(512);
    content.push_str("<div class=\"card\">\n");
    content.push_str("<div class=\"error-title\">Authorization Error</div>\n");
    content.push_str("<div class=\"error-description\">");
    content.push_str(&html_escape(error_description));
    content.push_str("</div>\n<div class=\"error-code\">");
    content.push_str(&html_escape(error_code));
    content.push_str("</div>\n</div>");
    html_page("Error", &content)
}

/// Simple HTML escaping to prevent XSS.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
