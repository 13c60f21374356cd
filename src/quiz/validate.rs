//! Decode-then-validate pipeline for model-produced quiz JSON

use super::{QuizError, QuizQuestion};
use crate::prompts::{QUIZ_OPTION_COUNT, QUIZ_QUESTION_COUNT};
use serde_json::{Map, Value};

/// Strip code fences, parse, fall back to the outermost `[...]` span, then
/// check every question's shape.
pub(super) fn parse_questions(raw: &str) -> Result<Vec<QuizQuestion>, QuizError> {
    let value = decode(raw)?;
    let Value::Array(items) = value else {
        return Err(QuizError::Shape {
            index: None,
            reason: "expected a JSON array".to_string(),
        });
    };
    if items.len() != QUIZ_QUESTION_COUNT {
        return Err(QuizError::Shape {
            index: None,
            reason: format!(
                "expected {QUIZ_QUESTION_COUNT} questions, got {}",
                items.len()
            ),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            check_question(item).map_err(|reason| QuizError::Shape {
                index: Some(index),
                reason,
            })
        })
        .zip(1u32..)
        .map(|(question, id)| question.map(|q| QuizQuestion { id, ..q }))
        .collect()
}

fn decode(raw: &str) -> Result<Value, QuizError> {
    let cleaned = strip_fences(raw);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => Ok(value),
        Err(first) => {
            let span = bracketed_span(raw).ok_or_else(|| QuizError::Parse(first.to_string()))?;
            serde_json::from_str(span).map_err(|e| QuizError::Parse(e.to_string()))
        }
    }
}

/// Remove a leading ```` ```json ```` or ```` ``` ```` fence and its closing
/// marker. Fences inside the payload are left alone.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// From the first `[` to the last `]`, inclusive
fn bracketed_span(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    raw.get(start..=end)
}

fn check_question(item: &Value) -> Result<QuizQuestion, String> {
    let object = item.as_object().ok_or("expected an object")?;

    let prompt = non_empty_string(object, "question")?;
    let explanation = non_empty_string(object, "explanation")?;

    let options = object
        .get("options")
        .and_then(Value::as_array)
        .ok_or("missing options array")?;
    let options: Vec<String> = options
        .iter()
        .map(|o| o.as_str().map(str::to_string).ok_or("options must be strings"))
        .collect::<Result<_, _>>()?;
    let options: [String; QUIZ_OPTION_COUNT] = options.try_into().map_err(|v: Vec<String>| {
        format!("expected {QUIZ_OPTION_COUNT} options, got {}", v.len())
    })?;

    let correct_option = object
        .get("correctAnswer")
        .and_then(Value::as_u64)
        .ok_or("correctAnswer must be a non-negative integer")?;
    let correct_option = usize::try_from(correct_option)
        .ok()
        .filter(|&i| i < QUIZ_OPTION_COUNT)
        .ok_or_else(|| format!("correctAnswer {correct_option} out of range 0-3"))?;

    Ok(QuizQuestion {
        id: 0,
        prompt,
        options,
        correct_option,
        explanation,
    })
}

fn non_empty_string(object: &Map<String, Value>, key: &str) -> Result<String, String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing or empty {key}"))
}
