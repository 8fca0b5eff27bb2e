// src/alert/template.rs

//! Pure message rendering: substitutes `{{placeholder}}` tokens in a
//! template's title/body with values from structured table data (spec.md
//! section 4.G step 2 "Render message from template").

use crate::model::AlertTemplate;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

/// Renders `template` against `table_data`. Placeholders with no matching
/// key are left untouched rather than erroring — operators can tell a
/// missing binding apart from an empty one.
pub fn render(template: &AlertTemplate, table_data: &HashMap<String, String>) -> RenderedMessage {
    RenderedMessage {
        title: substitute(&template.title, table_data),
        body: substitute(&template.body, table_data),
    }
}

/// Renders raw content with no template: title/body pass through
/// unchanged (spec.md section 4.G step 2 "or raw content if no template").
pub fn render_raw(title: &str, content: &str) -> RenderedMessage {
    RenderedMessage {
        title: title.to_string(),
        body: content.to_string(),
    }
}

fn substitute(text: &str, table_data: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let key = after[..end].trim();
            match table_data.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("{{");
                    out.push_str(key);
                    out.push_str("}}");
                }
            }
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditFields, DisplayFormat};

    fn template(title: &str, body: &str) -> AlertTemplate {
        AlertTemplate {
            template_id: "tpl1".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            display_format: DisplayFormat::Text,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let mut data = HashMap::new();
        data.insert("service".to_string(), "checkout".to_string());
        let rendered = render(&template("{{service}} alert", "body: {{service}} down"), &data);
        assert_eq!(rendered.title, "checkout alert");
        assert_eq!(rendered.body, "body: checkout down");
    }

    #[test]
    fn leaves_unknown_placeholder_untouched() {
        let rendered = render(&template("{{missing}}", ""), &HashMap::new());
        assert_eq!(rendered.title, "{{missing}}");
    }

    #[test]
    fn raw_content_passes_through() {
        let rendered = render_raw("t", "c");
        assert_eq!(rendered.title, "t");
        assert_eq!(rendered.body, "c");
    }
}
