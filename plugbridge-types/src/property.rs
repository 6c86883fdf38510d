//! Plugin-declared UI properties shown in the property panel.
//!
//! The property type is a closed tagged union. Every operation that depends
//! on the type (validation, assignment, value extraction) is a single
//! exhaustive match, so adding a kind is a compile error until it is handled
//! everywhere.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One property a plugin declared on its block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockProperty {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

/// Typed property payload, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertyKind {
    Text {
        #[serde(default)]
        value: String,
    },
    Boolean {
        #[serde(default)]
        value: bool,
    },
    Color {
        #[serde(default = "default_color")]
        value: String,
    },
    Number {
        #[serde(default)]
        value: f64,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        step: Option<f64>,
    },
    Select {
        #[serde(default)]
        value: String,
        options: Vec<SelectOption>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    #[serde(default)]
    pub label: String,
}

fn default_color() -> String {
    "#000000".to_string()
}

impl BlockProperty {
    /// Parses and validates one declaration coming from plugin code.
    pub fn from_declaration(declaration: JsonValue) -> Result<Self, Error> {
        let key = declaration
            .get("key")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let property: Self =
            serde_json::from_value(declaration).map_err(|e| Error::InvalidProperty {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        property.validate()?;
        Ok(property)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.key.is_empty() {
            return Err(self.invalid("key is required"));
        }
        match &self.kind {
            PropertyKind::Text { .. } | PropertyKind::Boolean { .. } => Ok(()),
            PropertyKind::Color { value } => {
                if is_hex_color(value) {
                    Ok(())
                } else {
                    Err(self.invalid(format!("'{value}' is not a #rgb or #rrggbb color")))
                }
            }
            PropertyKind::Number {
                value,
                min,
                max,
                step,
            } => {
                if !value.is_finite() {
                    return Err(self.invalid("value must be finite"));
                }
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return Err(self.invalid(format!("min {min} exceeds max {max}")));
                    }
                }
                if step.is_some_and(|s| !(s > 0.0 && s.is_finite())) {
                    return Err(self.invalid("step must be positive"));
                }
                check_range(*value, *min, *max).map_err(|reason| self.invalid(reason))
            }
            PropertyKind::Select { value, options } => {
                if options.is_empty() {
                    return Err(self.invalid("select needs at least one option"));
                }
                if !value.is_empty() && !options.iter().any(|o| &o.value == value) {
                    return Err(self.invalid(format!("'{value}' is not one of the options")));
                }
                Ok(())
            }
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidProperty {
            key: self.key.clone(),
            reason: reason.into(),
        }
    }

    /// Replaces the current value, enforcing the property's type and range.
    pub fn assign(&mut self, value: &JsonValue) -> Result<(), Error> {
        let key = self.key.clone();
        let mismatch = |expected: &str| Error::InvalidProperty {
            key: key.clone(),
            reason: format!("expected {expected}, got {value}"),
        };
        match &mut self.kind {
            PropertyKind::Text { value: current } => {
                *current = value.as_str().ok_or_else(|| mismatch("a string"))?.to_string();
            }
            PropertyKind::Boolean { value: current } => {
                *current = value.as_bool().ok_or_else(|| mismatch("a boolean"))?;
            }
            PropertyKind::Color { value: current } => {
                let color = value
                    .as_str()
                    .filter(|c| is_hex_color(c))
                    .ok_or_else(|| mismatch("a #rrggbb color"))?;
                *current = color.to_string();
            }
            PropertyKind::Number {
                value: current,
                min,
                max,
                ..
            } => {
                let number = value
                    .as_f64()
                    .filter(|n| n.is_finite())
                    .ok_or_else(|| mismatch("a finite number"))?;
                check_range(number, *min, *max).map_err(|reason| Error::InvalidProperty {
                    key: key.clone(),
                    reason,
                })?;
                *current = number;
            }
            PropertyKind::Select {
                value: current,
                options,
            } => {
                let choice = value
                    .as_str()
                    .filter(|c| options.iter().any(|o| o.value == *c))
                    .ok_or_else(|| mismatch("one of the select options"))?;
                *current = choice.to_string();
            }
        }
        Ok(())
    }

    pub fn value(&self) -> JsonValue {
        self.kind.value()
    }

    /// Host-side view of this property, as handed to plugin code.
    pub fn to_view(&self) -> JsonValue {
        let mut view = serde_json::Map::new();
        view.insert("key".into(), JsonValue::String(self.key.clone()));
        view.insert("label".into(), JsonValue::String(self.label.clone()));
        view.insert("type".into(), JsonValue::String(self.kind.type_name().into()));
        view.insert("value".into(), self.kind.value());
        if let PropertyKind::Select { options, .. } = &self.kind {
            let options = options
                .iter()
                .map(|o| JsonValue::String(o.value.clone()))
                .collect();
            view.insert("options".into(), JsonValue::Array(options));
        }
        JsonValue::Object(view)
    }
}

impl PropertyKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Boolean { .. } => "boolean",
            Self::Color { .. } => "color",
            Self::Number { .. } => "number",
            Self::Select { .. } => "select",
        }
    }

    pub fn value(&self) -> JsonValue {
        match self {
            Self::Text { value } | Self::Color { value } | Self::Select { value, .. } => {
                JsonValue::String(value.clone())
            }
            Self::Boolean { value } => JsonValue::Bool(*value),
            Self::Number { value, .. } => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
        }
    }
}

fn check_range(value: f64, min: Option<f64>, max: Option<f64>) -> Result<(), String> {
    if min.is_some_and(|min| value < min) || max.is_some_and(|max| value > max) {
        return Err(format!(
            "{value} is outside [{}, {}]",
            min.map_or("-inf".to_string(), |m| m.to_string()),
            max.map_or("inf".to_string(), |m| m.to_string()),
        ));
    }
    Ok(())
}

fn is_hex_color(candidate: &str) -> bool {
    let Some(hex) = candidate.strip_prefix('#') else {
        return false;
    };
    (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#A0b1C2"));
        assert!(!is_hex_color("fff"));
        assert!(!is_hex_color("#ggg"));
        assert!(!is_hex_color("#ffff"));
    }

    #[test]
    fn number_declaration_accepts_integer_json() {
        let prop = BlockProperty::from_declaration(json!({
            "key": "size", "type": "number", "value": 3, "min": 1, "max": 5
        }))
        .unwrap();
        assert_eq!(prop.value(), json!(3.0));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = BlockProperty::from_declaration(json!({"key": "x", "type": "slider"}));
        assert!(err.is_err());
    }
}
