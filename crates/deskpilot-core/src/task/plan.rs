//! Plans and typed step actions
//!
//! Planners hand back loosely-typed steps (`action` + a JSON parameter map).
//! [`StepAction::decode`] turns each one into a typed variant right before it
//! runs, failing with `UnsupportedStep` or `InvalidParameters` instead of
//! guessing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::desktop::{KeyModifier, MouseButton, ScrollDirection};
use crate::error::{Error, Result};

/// Ordered steps produced by a planner for one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Planner's reading of the screen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(rename = "plan", alias = "steps", default)]
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a planner response
    ///
    /// Text around the outermost JSON object (prose, code fences) is ignored.
    pub fn from_json(response: &str) -> Result<Self> {
        let body = match (response.find('{'), response.rfind('}')) {
            (Some(start), Some(end)) if start < end => &response[start..=end],
            _ => return Err(Error::Planning("response contains no JSON object".to_string())),
        };
        serde_json::from_str(body).map_err(|e| Error::Planning(format!("invalid plan: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// One untyped plan entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl PlanStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            step: None,
            action: action.into(),
            description: String::new(),
            parameters: Map::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn decode(&self) -> Result<StepAction> {
        StepAction::decode(&self.action, &self.parameters)
    }
}

/// A decoded, strongly-typed step
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Grab a screenshot; `None` uses the configured display
    Capture { display: Option<u32> },
    Click { x: i32, y: i32, button: MouseButton },
    Type { text: String, delay_ms: u64 },
    Key { key: String, modifiers: Vec<KeyModifier> },
    Wait { duration_ms: u64 },
    Analyze,
    Scroll { x: i32, y: i32, direction: ScrollDirection, amount: u32 },
    Drag { from: (i32, i32), to: (i32, i32) },
    Launch { path: String, args: Vec<String> },
}

const DEFAULT_TYPE_DELAY_MS: u64 = 50;
const DEFAULT_WAIT_MS: u64 = 1000;
const DEFAULT_SCROLL_AMOUNT: u32 = 3;

impl StepAction {
    /// Decode a plan step's action kind and parameters
    pub fn decode(kind: &str, params: &Map<String, Value>) -> Result<Self> {
        let p = Params { action: kind, map: params };
        let action = match kind {
            "capture" => Self::Capture {
                display: p.int("display")?.map(|d| p.narrow("display", d)).transpose()?,
            },
            "click" => Self::Click {
                x: p.coord(&["x"])?,
                y: p.coord(&["y"])?,
                button: p.keyword("button")?.unwrap_or_default(),
            },
            "type" => Self::Type {
                text: p.required_string("text")?,
                delay_ms: p.millis("delay", DEFAULT_TYPE_DELAY_MS)?,
            },
            "key" => Self::Key {
                key: p.required_string("key")?,
                modifiers: p.keyword_list("modifiers")?,
            },
            "wait" => Self::Wait {
                duration_ms: p.millis("duration", DEFAULT_WAIT_MS)?,
            },
            "analyze" => Self::Analyze,
            "scroll" => Self::Scroll {
                x: p.coord(&["x"])?,
                y: p.coord(&["y"])?,
                direction: p
                    .keyword("direction")?
                    .ok_or_else(|| p.missing("direction"))?,
                amount: match p.int("amount")? {
                    Some(amount) => p.narrow("amount", amount)?,
                    None => DEFAULT_SCROLL_AMOUNT,
                },
            },
            "drag" => Self::Drag {
                from: (p.coord(&["from_x", "fromX"])?, p.coord(&["from_y", "fromY"])?),
                to: (p.coord(&["to_x", "toX"])?, p.coord(&["to_y", "toY"])?),
            },
            "launch" => Self::Launch {
                path: p.required_string("path")?,
                args: p.string_list("args")?,
            },
            other => return Err(Error::UnsupportedStep(other.to_string())),
        };
        Ok(action)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Capture { .. } => "capture",
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Key { .. } => "key",
            Self::Wait { .. } => "wait",
            Self::Analyze => "analyze",
            Self::Scroll { .. } => "scroll",
            Self::Drag { .. } => "drag",
            Self::Launch { .. } => "launch",
        }
    }
}

/// Typed views over a step's parameter map
struct Params<'a> {
    action: &'a str,
    map: &'a Map<String, Value>,
}

impl Params<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, key: &str, expected: &str, got: &Value) -> Error {
        Error::invalid_params(self.action, format!("`{}` must be {}, got {}", key, expected, got))
    }

    fn missing(&self, key: &str) -> Error {
        Error::invalid_params(self.action, format!("missing `{}`", key))
    }

    /// Integer parameter; whole-valued JSON floats are accepted
    fn int(&self, key: &str) -> Result<Option<i64>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        if let Some(n) = value.as_i64() {
            return Ok(Some(n));
        }
        match value.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                Ok(Some(f as i64))
            }
            _ => Err(self.invalid(key, "an integer", value)),
        }
    }

    fn narrow<T: TryFrom<i64>>(&self, key: &str, n: i64) -> Result<T> {
        T::try_from(n)
            .map_err(|_| Error::invalid_params(self.action, format!("`{}` out of range: {}", key, n)))
    }

    /// Required coordinate, looked up under any of `keys`
    fn coord(&self, keys: &[&str]) -> Result<i32> {
        for key in keys {
            if let Some(n) = self.int(key)? {
                return self.narrow(key, n);
            }
        }
        Err(self.missing(keys[0]))
    }

    fn millis(&self, key: &str, default: u64) -> Result<u64> {
        match self.int(key)? {
            Some(n) => self.narrow(key, n),
            None => Ok(default),
        }
    }

    fn required_string(&self, key: &str) -> Result<String> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.invalid(key, "a string", other)),
            None => Err(self.missing(key)),
        }
    }

    fn string_list(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.invalid(key, "a list of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.invalid(key, "a list of strings", other)),
        }
    }

    /// Case-insensitive keyword parsed into an enum
    fn keyword<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => self.parse_keyword(key, s).map(Some),
            Some(other) => Err(self.invalid(key, "a string", other)),
        }
    }

    fn keyword_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        self.string_list(key)?
            .iter()
            .map(|s| self.parse_keyword(key, s))
            .collect()
    }

    fn parse_keyword<T: DeserializeOwned>(&self, key: &str, s: &str) -> Result<T> {
        serde_json::from_value(Value::String(s.to_ascii_lowercase())).map_err(|_| {
            Error::invalid_params(self.action, format!("unknown `{}` value: {}", key, s))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let empty = Map::new();
        assert_eq!(StepAction::decode("wait", &empty).unwrap(), StepAction::Wait { duration_ms: 1000 });
        assert_eq!(
            StepAction::decode("type", &params(json!({"text": "hi"}))).unwrap(),
            StepAction::Type { text: "hi".into(), delay_ms: 50 }
        );
        assert_eq!(
            StepAction::decode("click", &params(json!({"x": 3, "y": 4}))).unwrap(),
            StepAction::Click { x: 3, y: 4, button: MouseButton::Left }
        );
    }

    #[test]
    fn test_whole_floats_accepted() {
        let action = StepAction::decode("click", &params(json!({"x": 120.0, "y": 45.0, "button": "Right"})))
            .unwrap();
        assert_eq!(action, StepAction::Click { x: 120, y: 45, button: MouseButton::Right });
    }

    #[test]
    fn test_wrong_shapes_rejected() {
        let cases = [
            ("click", json!({"x": "10", "y": 5})),
            ("click", json!({"x": 10.5, "y": 5})),
            ("click", json!({"y": 5})),
            ("wait", json!({"duration": -1})),
            ("key", json!({"key": "c", "modifiers": "ctrl"})),
            ("key", json!({"key": "c", "modifiers": ["hyper"]})),
            ("type", json!({"text": 42})),
        ];
        for (kind, value) in cases {
            let err = StepAction::decode(kind, &params(value.clone())).unwrap_err();
            assert!(
                matches!(err, Error::InvalidParameters { .. }),
                "{} {} gave {:?}",
                kind,
                value,
                err
            );
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = StepAction::decode("teleport", &Map::new()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedStep(kind) if kind == "teleport"));
    }

    #[test]
    fn test_key_modifiers_keep_order() {
        let action =
            StepAction::decode("key", &params(json!({"key": "t", "modifiers": ["Shift", "control"]})))
                .unwrap();
        assert_eq!(
            action,
            StepAction::Key { key: "t".into(), modifiers: vec![KeyModifier::Shift, KeyModifier::Ctrl] }
        );
    }

    #[test]
    fn test_drag_accepts_camel_case() {
        let action = StepAction::decode(
            "drag",
            &params(json!({"fromX": 1, "fromY": 2, "to_x": 3, "toY": 4})),
        )
        .unwrap();
        assert_eq!(action, StepAction::Drag { from: (1, 2), to: (3, 4) });
    }

    #[test]
    fn test_plan_from_response_text() {
        let response = r#"Here is the plan:
```json
{"analysis": "desktop is idle", "plan": [
  {"step": 1, "action": "capture", "description": "Take screenshot", "parameters": {}},
  {"step": 2, "action": "wait", "parameters": {"duration": 10}}
]}
```"#;
        let plan = Plan::from_json(response).unwrap();
        assert_eq!(plan.analysis.as_deref(), Some("desktop is idle"));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[1].decode().unwrap(), StepAction::Wait { duration_ms: 10 });
    }

    #[test]
    fn test_plan_from_garbage() {
        assert!(matches!(Plan::from_json("no idea"), Err(Error::Planning(_))));
        assert!(matches!(Plan::from_json("{\"plan\": 3}"), Err(Error::Planning(_))));
    }
}
