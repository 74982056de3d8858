//! Outbound webhook notifications
//!
//! Signal lists are forwarded as a single embed payload (title,
//! description, per-symbol fields, thumbnail, footer) POSTed as JSON to a
//! configured URL. An empty list sends nothing; failures are logged by the
//! caller and never abort a scan.

use anyhow::Result;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Embed payload shape expected by the messaging webhook
#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub author_name: Option<String>,
    pub author_icon_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub footer_text: Option<String>,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            color: 0xFF0000,
            author_name: None,
            author_icon_url: None,
            thumbnail_url: None,
            footer_text: None,
            fields: Vec::new(),
        }
    }

    /// One field per flagged symbol
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for symbol in symbols {
            self.fields.push(EmbedField {
                name: "Signal".to_string(),
                value: symbol.as_ref().to_string(),
                inline: false,
            });
        }
        self
    }

    pub fn footer(mut self, text: &str) -> Self {
        self.footer_text = Some(text.to_string());
        self
    }

    /// Wire payload: `{"embeds": [...]}` with nested author/thumbnail/footer
    pub fn payload(&self) -> Value {
        let mut embed = json!({
            "title": self.title,
            "description": self.description,
            "color": self.color,
            "fields": self.fields.iter().map(|f| json!({
                "name": f.name,
                "value": f.value,
                "inline": f.inline,
            })).collect::<Vec<_>>(),
        });

        if let Some(name) = &self.author_name {
            embed["author"] = json!({ "name": name });
            if let Some(icon) = &self.author_icon_url {
                embed["author"]["icon_url"] = json!(icon);
            }
        }
        if let Some(url) = &self.thumbnail_url {
            embed["thumbnail"] = json!({ "url": url });
        }
        if let Some(text) = &self.footer_text {
            embed["footer"] = json!({ "text": text });
        }

        json!({ "embeds": [embed] })
    }
}

/// Webhook client; the URL comes from configuration, never from code
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            url: url.to_string(),
        }
    }

    /// Post one embed. Empty field lists are skipped entirely.
    pub async fn send(&self, embed: &Embed) -> Result<()> {
        if embed.fields.is_empty() {
            debug!("No signals to send, skipping webhook post");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.url)
            .json(&embed.payload())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {}: {}", status, body);
        }

        info!(fields = embed.fields.len(), "Webhook notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_has_embed_shape() {
        let embed = Embed::new("4H", "Grid candidates")
            .with_symbols(["BTCUSDT", "ETHUSDT"])
            .footer("scanner");

        let payload = embed.payload();
        let embeds = payload["embeds"].as_array().unwrap();
        assert_eq!(embeds.len(), 1);

        let e = &embeds[0];
        assert_eq!(e["title"], "4H");
        assert_eq!(e["description"], "Grid candidates");
        assert_eq!(e["fields"].as_array().unwrap().len(), 2);
        assert_eq!(e["fields"][0]["value"], "BTCUSDT");
        assert_eq!(e["fields"][0]["inline"], false);
        assert_eq!(e["footer"]["text"], "scanner");
        assert!(e.get("thumbnail").is_none());
    }

    #[test]
    fn author_nests_icon() {
        let mut embed = Embed::new("t", "d");
        embed.author_name = Some("scanner".to_string());
        embed.author_icon_url = Some("https://example.com/icon.png".to_string());

        let payload = embed.payload();
        let author = &payload["embeds"][0]["author"];
        assert_eq!(author["name"], "scanner");
        assert_eq!(author["icon_url"], "https://example.com/icon.png");
    }
}
