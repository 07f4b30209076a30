//! Outreach message template - fills lead fields into a reply body

use crate::model::Lead;

/// Message used when no template is configured or the configured one is unusable
pub const DEFAULT_MESSAGE: &str = "Hi {username}! I noticed your post and wanted to offer some help.

We provide Personal Care Assistant and Homemaker Companion services, including \
hourly visits, overnight care, live-in care and 12-hour shifts. Our caregivers can \
help with bathing, meals, medication reminders and companionship.

If it would be useful, feel free to reach out with any questions. Wishing you and your family the best.";

/// Renders reply messages for leads
#[derive(Debug, Clone)]
pub struct OutreachTemplate {
    template: Option<String>,
}

impl OutreachTemplate {
    pub fn new(template: Option<String>) -> Self {
        let template = template.filter(|t| !t.trim().is_empty());
        Self { template }
    }

    /// Check that the configured template only uses known placeholders
    pub fn validate(&self) -> Result<(), String> {
        match &self.template {
            Some(template) => render(template, &PlaceholderProbe).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Render the message for a lead, falling back to the default message
    pub fn render(&self, lead: &Lead) -> String {
        if let Some(template) = &self.template {
            match render(template, lead) {
                Ok(message) => return message,
                Err(error) => {
                    tracing::warn!(error = %error, "Invalid outreach template, using default message");
                }
            }
        }
        render(DEFAULT_MESSAGE, lead).unwrap_or_else(|_| DEFAULT_MESSAGE.to_string())
    }
}

impl Default for OutreachTemplate {
    fn default() -> Self {
        Self::new(None)
    }
}

trait Placeholders {
    fn value(&self, key: &str) -> Option<String>;
}

impl Placeholders for Lead {
    fn value(&self, key: &str) -> Option<String> {
        let value = match key {
            "title" if self.title.trim().is_empty() => "your post".to_string(),
            "title" => self.title.clone(),
            "username" if self.author.trim().is_empty() => "there".to_string(),
            "username" => self.author.clone(),
            "score" => self.score.to_string(),
            "post_url" => self.url.clone(),
            _ => return None,
        };
        Some(value)
    }
}

struct PlaceholderProbe;

impl Placeholders for PlaceholderProbe {
    fn value(&self, key: &str) -> Option<String> {
        matches!(key, "title" | "username" | "score" | "post_url").then(String::new)
    }
}

/// Substitute `{name}` placeholders; `{{` and `}}` are literal braces
fn render(template: &str, values: &dyn Placeholders) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(|c| c == '{' || c == '}') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            out.push('{');
            rest = after;
            continue;
        }
        if let Some(after) = tail.strip_prefix("}}") {
            out.push('}');
            rest = after;
            continue;
        }
        if tail.starts_with('}') {
            return Err("Unmatched '}' in template".to_string());
        }

        let end = tail
            .find('}')
            .ok_or_else(|| "Unclosed '{' in template".to_string())?;
        let key = &tail[1..end];
        let value = values
            .value(key)
            .ok_or_else(|| format!("Unknown placeholder: {{{}}}", key))?;
        out.push_str(&value);
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
