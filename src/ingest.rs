//! Pull a diagnostic path out of an analyser's text response
//!
//! Transcript analysers are asked for JSON but tend to wrap it in prose or a
//! markdown fence. Extraction tries, in order: the whole response, the first
//! ```` ```json ```` fenced block, then the first balanced `{...}` span.

use regex::Regex;
use thiserror::Error;

use crate::convert::DiagnosticPath;

lazy_static::lazy_static! {
    static ref FENCED_JSON: Regex =
        Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").expect("fence pattern compiles");
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("response contains no JSON object")]
    NoJson,
    #[error("response JSON is not a diagnostic path: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// First balanced `{...}` span, ignoring braces inside string literals
pub fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse an analyser response into a path
pub fn path_from_response(response: &str) -> Result<DiagnosticPath, IngestError> {
    let trimmed = response.trim();
    if let Ok(path) = serde_json::from_str::<DiagnosticPath>(trimmed) {
        return Ok(path);
    }

    if let Some(body) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1)) {
        tracing::debug!("using fenced JSON block from response");
        return Ok(serde_json::from_str(body.as_str().trim())?);
    }

    match first_object(trimmed) {
        Some(object) => {
            tracing::debug!(len = object.len(), "using first JSON object in response");
            Ok(serde_json::from_str(object)?)
        }
        None => Err(IngestError::NoJson),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIFI: &str = r#"{"problem": "wifi", "steps": [{"step": 1, "question": "Wifi on?", "answer": "yes"}], "solution": "Restart router"}"#;

    #[test]
    fn test_bare_json() {
        let path = path_from_response(WIFI).unwrap();
        assert_eq!(path.problem, "wifi");
        assert_eq!(path.steps.len(), 1);
    }

    #[test]
    fn test_fenced_block() {
        let response = format!(
            "Here is the diagnostic path:\n\n```json\n{}\n```\n\nLet me know if you need more.",
            WIFI
        );
        let path = path_from_response(&response).unwrap();
        assert_eq!(path.solution, "Restart router");
    }

    #[test]
    fn test_object_inside_prose() {
        let response = format!("Sure! {} Hope that helps.", WIFI);
        let path = path_from_response(&response).unwrap();
        assert_eq!(path.steps[0].question, "Wifi on?");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"noise {"problem": "odd {brace", "steps": []} trailing }"#;
        assert_eq!(
            first_object(text),
            Some(r#"{"problem": "odd {brace", "steps": []}"#)
        );
    }

    #[test]
    fn test_no_json() {
        assert!(matches!(
            path_from_response("I could not find a diagnosis."),
            Err(IngestError::NoJson)
        ));
        assert!(first_object("{ never closed").is_none());
    }

    #[test]
    fn test_wrong_shape() {
        assert!(matches!(
            path_from_response(r#"{"steps": "not a list"}"#),
            Err(IngestError::Invalid(_))
        ));
    }
}
