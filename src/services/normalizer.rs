//! Turns free-form model output into nutrition values.
//!
//! Models wrap their JSON in prose or markdown fences often enough that the
//! answer is scraped: the first balanced `{...}` block is cut out and parsed
//! strictly. Only `name` and `calories` are required; absent macros read as 0.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNutrition {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("no JSON object found in response")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' has an invalid value")]
    InvalidField(&'static str),
}

/// Parses a provider answer. Pure: the same input always gives the same output.
pub fn normalize(raw: &str) -> Result<ParsedNutrition, NormalizeError> {
    let json = extract_json_object(raw).ok_or(NormalizeError::NoJsonObject)?;

    let value: Value =
        serde_json::from_str(json).map_err(|e| NormalizeError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(NormalizeError::NoJsonObject)?;

    let name = match object.get("name") {
        None | Some(Value::Null) => return Err(NormalizeError::MissingField("name")),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(_) => return Err(NormalizeError::InvalidField("name")),
    };

    let calories = match object.get("calories") {
        None | Some(Value::Null) => return Err(NormalizeError::MissingField("calories")),
        Some(v) => quantity(v).ok_or(NormalizeError::InvalidField("calories"))?,
    };

    Ok(ParsedNutrition {
        name,
        calories,
        protein: optional_quantity(object, "protein"),
        carbs: optional_quantity(object, "carbs"),
        fat: optional_quantity(object, "fat"),
    })
}

/// First top-level brace-delimited block of `text`, braces inside JSON
/// strings ignored. `None` if there is no `{` or it never closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // Braces and quotes are ASCII, so byte offsets stay on char boundaries.
    for (offset, byte) in text[start..].bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

fn optional_quantity(object: &Map<String, Value>, field: &str) -> f64 {
    object.get(field).and_then(quantity).unwrap_or(0.0)
}

/// Non-negative finite number, from a JSON number or a numeric-looking
/// string such as `"95"`, `"1,250"` or `"12 g"`.
fn quantity(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_numeric_text(s)?,
        _ => return None,
    };

    (n.is_finite() && n >= 0.0).then_some(n)
}

fn parse_numeric_text(s: &str) -> Option<f64> {
    let number = s
        .trim()
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
        .replace(',', "");

    if number.is_empty() {
        return None;
    }
    number.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_surrounded_by_prose() {
        let raw = "Sure! Here is the analysis: {\"name\":\"Apple\",\"calories\":95,\"protein\":0,\"carbs\":25,\"fat\":0}  Hope that helps!";
        let parsed = normalize(raw).unwrap();

        assert_eq!(
            parsed,
            ParsedNutrition {
                name: "Apple".to_string(),
                calories: 95.0,
                protein: 0.0,
                carbs: 25.0,
                fat: 0.0,
            }
        );
    }

    #[test]
    fn test_markdown_code_fence() {
        let raw = "```json\n{\n  \"name\": \"Pepperoni Pizza\",\n  \"calories\": 285,\n  \"protein\": 12,\n  \"carbs\": 36,\n  \"fat\": 10\n}\n```";
        let parsed = normalize(raw).unwrap();

        assert_eq!(parsed.name, "Pepperoni Pizza");
        assert_eq!(parsed.fat, 10.0);
    }

    #[test]
    fn test_trailing_commentary_with_braces() {
        let raw = r#"{"name": "Oatmeal", "calories": 150} Note: values are estimates {roughly}."#;
        assert_eq!(extract_json_object(raw), Some(r#"{"name": "Oatmeal", "calories": 150}"#));
        assert_eq!(normalize(raw).unwrap().calories, 150.0);
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"{"name": "Curly {fries} \"deluxe\"", "calories": 320}"#;
        let parsed = normalize(raw).unwrap();

        assert_eq!(parsed.name, "Curly {fries} \"deluxe\"");
        assert_eq!(parsed.calories, 320.0);
    }

    #[test]
    fn test_missing_macros_default_to_zero() {
        let parsed = normalize(r#"{"name": "Black coffee", "calories": 2}"#).unwrap();

        assert_eq!(parsed.protein, 0.0);
        assert_eq!(parsed.carbs, 0.0);
        assert_eq!(parsed.fat, 0.0);
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let parsed = normalize(r#"{"name": "Lasagna", "calories": "1,250 kcal", "protein": "45 g", "fat": null}"#).unwrap();

        assert_eq!(parsed.calories, 1250.0);
        assert_eq!(parsed.protein, 45.0);
        assert_eq!(parsed.fat, 0.0);
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(
            normalize(r#"{"calories": 100}"#),
            Err(NormalizeError::MissingField("name"))
        );
        assert_eq!(
            normalize(r#"{"name": "Soup"}"#),
            Err(NormalizeError::MissingField("calories"))
        );
        assert_eq!(
            normalize(r#"{"name": "Soup", "calories": "a lot"}"#),
            Err(NormalizeError::InvalidField("calories"))
        );
        assert_eq!(
            normalize(r#"{"name": "Soup", "calories": -40}"#),
            Err(NormalizeError::InvalidField("calories"))
        );
        assert_eq!(
            normalize(r#"{"name": 42, "calories": 40}"#),
            Err(NormalizeError::InvalidField("name"))
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert_eq!(normalize("I cannot identify this image."), Err(NormalizeError::NoJsonObject));
        assert_eq!(normalize("{ this is not json"), Err(NormalizeError::NoJsonObject));
        assert!(matches!(normalize("{name: Apple}"), Err(NormalizeError::InvalidJson(_))));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = "Result:\n```\n{\"name\":\"Avocado Toast\",\"calories\":220,\"protein\":6,\"carbs\":20,\"fat\":18}\n```";

        assert_eq!(normalize(raw), normalize(raw));
    }
}
