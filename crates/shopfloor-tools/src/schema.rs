//! Static parameter specifications.
//!
//! Each tool declares its parameters as a table of [`ParamSpec`]s. The
//! table drives three things: the JSON schema published by `GET /tools`,
//! the structural validation run before a handler, and the list of entity
//! references checked against the store.

use serde_json::{Map, Value, json};
use shopfloor_core::{Error, Result};
use shopfloor_store::Collection;

/// JSON type of a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// JSON string.
    String,
    /// JSON integer.
    Integer,
    /// Any JSON number.
    Number,
    /// JSON boolean.
    Boolean,
}

impl ParamKind {
    /// JSON schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: &'static str,
    /// Expected JSON type.
    pub kind: ParamKind,
    /// Whether callers must supply it.
    pub required: bool,
    /// Description for tool listings.
    pub description: &'static str,
    /// Value used when the caller omits the parameter.
    pub default: Option<Value>,
    /// Collection the value must identify an entity in.
    pub references: Option<Collection>,
    /// Inclusive integer bounds.
    pub range: Option<(i64, i64)>,
    /// Allowed string values.
    pub choices: Option<&'static [&'static str]>,
}

impl ParamSpec {
    fn new(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            default: None,
            references: None,
            range: None,
            choices: None,
        }
    }

    /// Optional string parameter.
    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    /// Optional integer parameter.
    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Default applied when omitted.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// The value must be the id of an existing entity in `collection`.
    pub fn references(mut self, collection: Collection) -> Self {
        self.references = Some(collection);
        self
    }

    /// Inclusive integer bounds.
    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Lower integer bound only.
    pub fn at_least(self, min: i64) -> Self {
        self.range(min, i64::MAX)
    }

    /// Restrict a string to a fixed set of values.
    pub fn one_of(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = Some(choices);
        self
    }

    fn to_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.kind.as_str()));
        prop.insert("description".into(), json!(self.description));
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        if let Some((min, max)) = self.range {
            prop.insert("minimum".into(), json!(min));
            if max < i64::MAX {
                prop.insert("maximum".into(), json!(max));
            }
        }
        if let Some(choices) = self.choices {
            prop.insert("enum".into(), json!(choices));
        }
        if let Some(collection) = &self.references {
            prop.insert("x-references".into(), json!(collection.to_string()));
        }
        Value::Object(prop)
    }
}

/// JSON schema object for a parameter table.
pub fn json_schema(params: &[ParamSpec]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.to_string(), p.to_schema()))
        .collect();
    let required: Vec<&str> = params.iter().filter(|p| p.required).map(|p| p.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Structurally validate `args` against `params`.
///
/// `null` is accepted as "no arguments". Returns the argument object with
/// defaults filled in. Fails with a validation error on unknown names,
/// missing required parameters, wrong JSON types, or out-of-range values.
pub fn validate(params: &[ParamSpec], args: Value) -> Result<Value> {
    let mut args = match args {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(Error::validation(format!(
                "parameters must be a JSON object, got {}",
                type_name(&other)
            )));
        }
    };

    if let Some(unknown) = args.keys().find(|k| !params.iter().any(|p| p.name == k.as_str())) {
        return Err(Error::validation(format!("unknown parameter '{unknown}'")));
    }

    for spec in params {
        let supplied = args.get(spec.name).filter(|v| !v.is_null());
        let Some(value) = supplied else {
            if spec.required {
                return Err(Error::validation(format!(
                    "missing required parameter '{}'",
                    spec.name
                )));
            }
            match &spec.default {
                Some(default) => {
                    args.insert(spec.name.to_string(), default.clone());
                }
                None => {
                    args.remove(spec.name);
                }
            }
            continue;
        };

        if !spec.kind.accepts(value) {
            return Err(Error::validation(format!(
                "parameter '{}' must be {}, got {}",
                spec.name,
                spec.kind.as_str(),
                type_name(value)
            )));
        }
        if let (Some((min, max)), Some(n)) = (spec.range, value.as_i64()) {
            if n < min || n > max {
                let bound = if max == i64::MAX {
                    format!("at least {min}")
                } else {
                    format!("between {min} and {max}")
                };
                return Err(Error::validation(format!(
                    "parameter '{}' must be {bound}, got {n}",
                    spec.name
                )));
            }
        }
        if let (Some(choices), Some(s)) = (spec.choices, value.as_str()) {
            if !choices.contains(&s) {
                return Err(Error::validation(format!(
                    "parameter '{}' must be one of {}, got '{s}'",
                    spec.name,
                    choices.join(", ")
                )));
            }
        }
    }

    Ok(Value::Object(args))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_core::ErrorKind;
    use shopfloor_store::document::MACHINES;

    fn params() -> Vec<ParamSpec> {
        vec![
            ParamSpec::string("machine_id", "Machine").required().references(MACHINES),
            ParamSpec::string("priority", "Priority").default_value(json!("MEDIUM")),
            ParamSpec::integer("quantity", "Units").range(1, 1000),
            ParamSpec::string("search_in", "Scope").one_of(&["all", "title"]),
        ]
    }

    #[test]
    fn test_defaults_filled() {
        let out = validate(&params(), json!({"machine_id": "GB001"})).unwrap();
        assert_eq!(out, json!({"machine_id": "GB001", "priority": "MEDIUM"}));
    }

    #[test]
    fn test_null_optional_removed() {
        let out = validate(&params(), json!({"machine_id": "GB001", "quantity": null})).unwrap();
        assert!(out.get("quantity").is_none());
    }

    #[test]
    fn test_missing_required() {
        let err = validate(&params(), Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(err.to_string().contains("machine_id"));
    }

    #[test]
    fn test_wrong_type() {
        let err = validate(&params(), json!({"machine_id": 7})).unwrap_err();
        assert!(err.to_string().contains("must be string, got integer"));
        let err = validate(&params(), json!({"machine_id": "GB001", "quantity": 2.5})).unwrap_err();
        assert!(err.to_string().contains("must be integer, got number"));
    }

    #[test]
    fn test_out_of_range_and_choices() {
        assert!(validate(&params(), json!({"machine_id": "GB001", "quantity": 0})).is_err());
        assert!(validate(&params(), json!({"machine_id": "GB001", "quantity": 1000})).is_ok());
        assert!(validate(&params(), json!({"machine_id": "GB001", "search_in": "body"})).is_err());
    }

    #[test]
    fn test_unknown_parameter_and_non_object() {
        assert!(validate(&params(), json!({"machine_id": "GB001", "colour": "red"})).is_err());
        assert!(validate(&params(), json!(["GB001"])).is_err());
    }

    #[test]
    fn test_json_schema_shape() {
        let schema = json_schema(&params());
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["required"], json!(["machine_id"]));
        assert_eq!(schema["properties"]["priority"]["default"], json!("MEDIUM"));
        assert_eq!(schema["properties"]["quantity"]["minimum"], json!(1));
        assert_eq!(schema["properties"]["machine_id"]["x-references"], json!("factory.machines"));
    }
}
