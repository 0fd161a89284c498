//! Chat-completion wire types and normalization of the model's answer.

use engine::{Amount, Category, ExtractionError, ExtractionResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub temperature: f32,
    pub response_format: ResponseFormat,
    pub messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
pub(crate) struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl ResponseFormat {
    pub(crate) fn json_object() -> Self {
        Self {
            kind: "json_object",
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice.
    pub(crate) fn into_content(self) -> Result<String, ExtractionError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ExtractionError::InvalidResponse("no choice in response".to_string()))
    }
}

/// Error body of the chat-completion API, `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorBody {
    pub(crate) fn message(self) -> String {
        self.error.message
    }
}

/// The answer the model is asked to produce. Every field is loose because
/// models do not always respect the requested types.
#[derive(Debug, Deserialize)]
struct RawExpense {
    #[serde(default)]
    product_name: Value,
    #[serde(default)]
    amount: Value,
    #[serde(default)]
    category: Value,
    #[serde(default)]
    roast: Value,
}

/// Normalizes the model's message content into an [`ExtractionResult`].
///
/// - Markdown code fences around the object are ignored.
/// - `null`, empty strings and the string `"null"` are missing values.
/// - `amount` may be a number or a decimal string; non-positive or
///   unparsable amounts are missing.
/// - `category` is matched case-insensitively; unknown names become
///   [`Category::Other`].
///
/// Content that is not a JSON object is an [`ExtractionError::InvalidResponse`].
pub fn parse_content(content: &str) -> Result<ExtractionResult, ExtractionError> {
    let raw: RawExpense = serde_json::from_str(strip_fences(content)).map_err(|err| {
        ExtractionError::InvalidResponse(format!("content is not an expense object: {err}"))
    })?;

    Ok(ExtractionResult {
        description: text(&raw.product_name),
        amount: amount(&raw.amount),
        category: text(&raw.category)
            .map(|name| Category::try_from(name.as_str()).unwrap_or(Category::Other)),
        annotation: text(&raw.roast),
    })
}

fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json).
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    }
}

fn amount(value: &Value) -> Option<Amount> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Amount::from_major),
        Value::String(_) => text(value).and_then(|s| s.parse().ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_answer() {
        let result = parse_content(
            r#"{"product_name": "Starbucks", "amount": 6.50, "category": "Food", "roast": "Intervention time."}"#,
        )
        .unwrap();

        assert_eq!(
            result,
            ExtractionResult {
                description: Some("Starbucks".to_string()),
                amount: Amount::from_cents(650),
                category: Some(Category::Food),
                annotation: Some("Intervention time.".to_string()),
            }
        );
    }

    #[test]
    fn not_an_expense() {
        let result = parse_content(
            r#"{"product_name": null, "amount": null, "category": null, "roast": "null"}"#,
        )
        .unwrap();
        assert_eq!(result, ExtractionResult::empty());

        assert_eq!(parse_content("{}").unwrap(), ExtractionResult::empty());
    }

    #[test]
    fn fenced_answer() {
        let content = "```json\n{\"product_name\": \"Uber\", \"amount\": 25, \"category\": \"Transportation\", \"roast\": \"Bougie.\"}\n```";
        let result = parse_content(content).unwrap();

        assert!(result.clone().complete().is_some());
        assert_eq!(result.amount, Amount::from_cents(2500));
        assert_eq!(result.category, Some(Category::Transportation));
    }

    #[test]
    fn string_amounts() {
        let result = parse_content(r#"{"amount": "$12,50"}"#).unwrap();
        assert_eq!(result.amount, Amount::from_cents(1250));

        let result = parse_content(r#"{"amount": "fifteen"}"#).unwrap();
        assert_eq!(result.amount, None);
    }

    #[test]
    fn non_positive_amount_is_missing() {
        for content in [r#"{"amount": 0}"#, r#"{"amount": -3}"#, r#"{"amount": "0.00"}"#] {
            assert_eq!(parse_content(content).unwrap().amount, None, "{content}");
        }
    }

    #[test]
    fn categories_are_normalized() {
        let result = parse_content(r#"{"category": "medical/healthcare"}"#).unwrap();
        assert_eq!(result.category, Some(Category::MedicalHealthcare));

        let result = parse_content(r#"{"category": "Groceries"}"#).unwrap();
        assert_eq!(result.category, Some(Category::Other));

        let result = parse_content(r#"{"category": ""}"#).unwrap();
        assert_eq!(result.category, None);
    }

    #[test]
    fn invalid_content() {
        for content in ["I think this is an expense", "42", "\"Food\"", ""] {
            assert!(
                matches!(
                    parse_content(content),
                    Err(ExtractionError::InvalidResponse(_))
                ),
                "{content}"
            );
        }
    }

    #[test]
    fn first_choice_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_content().unwrap(), "{}");

        let response: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(response.into_content().is_err());
    }
}
