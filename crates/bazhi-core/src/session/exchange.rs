//! One persisted consultation round trip.

use crate::error::{GuruError, Result};
use serde::{Deserialize, Serialize};

/// A completed question/answer exchange in both languages.
///
/// Field names mirror the deployed document schema, so records written by
/// earlier clients load unchanged. An exchange only exists once all three
/// pipeline calls have succeeded; partially translated rounds are never
/// constructed, cached or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageExchange {
    /// Timestamp when the exchange completed (ISO 8601 format).
    pub timestamp: String,
    /// The user's question as typed.
    #[serde(rename = "userMessage_EN")]
    pub user_text_en: String,
    /// The question translated for the guru.
    #[serde(rename = "userMessage_ZH")]
    pub user_text_zh: String,
    /// The guru's native answer.
    #[serde(rename = "guruResponse_ZH")]
    pub reply_text_zh: String,
    /// The answer translated back for display.
    #[serde(rename = "guruResponse_EN")]
    pub reply_text_en: String,
}

impl MessageExchange {
    /// Builds an exchange stamped with the current time.
    pub fn new(
        user_text_en: impl Into<String>,
        user_text_zh: impl Into<String>,
        reply_text_zh: impl Into<String>,
        reply_text_en: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_text_en: user_text_en.into(),
            user_text_zh: user_text_zh.into(),
            reply_text_zh: reply_text_zh.into(),
            reply_text_en: reply_text_en.into(),
        }
    }

    /// All four text fields must be non-empty before the exchange may be
    /// appended anywhere.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("userMessage_EN", &self.user_text_en),
            ("userMessage_ZH", &self.user_text_zh),
            ("guruResponse_ZH", &self.reply_text_zh),
            ("guruResponse_EN", &self.reply_text_en),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(GuruError::internal(format!(
                    "exchange field {name} is empty"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_exchange_is_valid_and_stamped() {
        let exchange = MessageExchange::new("How is my year?", "我的年运如何？", "运势平稳。", "Your year is steady.");
        assert!(exchange.validate().is_ok());
        assert!(!exchange.timestamp.is_empty());
    }

    #[test]
    fn empty_field_fails_validation() {
        let exchange = MessageExchange::new("question", "问题", "  ", "answer");
        assert!(exchange.validate().is_err());
    }

    #[test]
    fn serde_uses_deployed_field_names() {
        let exchange = MessageExchange {
            timestamp: "2024-06-01T00:00:00Z".into(),
            user_text_en: "q".into(),
            user_text_zh: "问".into(),
            reply_text_zh: "答".into(),
            reply_text_en: "a".into(),
        };
        let json = serde_json::to_value(&exchange).unwrap();
        assert_eq!(json["userMessage_EN"], "q");
        assert_eq!(json["userMessage_ZH"], "问");
        assert_eq!(json["guruResponse_ZH"], "答");
        assert_eq!(json["guruResponse_EN"], "a");
    }
}
