use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::ValidationError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern compiles")
});

/// Named string variables substituted into a contract's user template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptVars(BTreeMap<String, String>);

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Absent values render as blank text.
    pub fn with_opt(self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.with(key, value.unwrap_or_default())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for `key`, or the empty string.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    /// Whether `key` holds non-blank text.
    pub fn has_text(&self, key: &str) -> bool {
        !self.text(key).trim().is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PromptVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A schema-constrained prompt: instructions, a user template and the
/// JSON schema the reply must satisfy.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptContract {
    pub name: String,
    pub system_prompt: String,
    pub user_template: String,
    pub response_schema: Value,
}

impl PromptContract {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        user_template: impl Into<String>,
        response_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            user_template: user_template.into(),
            response_schema,
        }
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.response_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_schema(&self) -> bool {
        self.response_schema.as_object().is_some_and(|schema| !schema.is_empty())
    }

    /// Structured-output hint sent alongside the request.
    pub fn response_format(&self) -> Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "schema": self.response_schema,
            },
        })
    }

    /// Substitute `{name}` placeholders. Unknown names render blank; `{{`
    /// and `}}` are literal braces.
    pub fn render_user_prompt(&self, vars: &PromptVars) -> String {
        PLACEHOLDER
            .replace_all(&self.user_template, |caps: &Captures<'_>| match caps.get(1) {
                Some(name) => vars.text(name.as_str()).to_owned(),
                None if &caps[0] == "{{" => "{".to_owned(),
                None => "}".to_owned(),
            })
            .into_owned()
    }

    /// Character cost of the system prompt plus the rendered user prompt.
    pub fn rendered_chars(&self, vars: &PromptVars) -> usize {
        self.system_prompt.chars().count() + self.render_user_prompt(vars).chars().count()
    }

    pub fn validate(&self, payload: &Map<String, Value>) -> Result<(), ValidationError> {
        let required = self.required_fields();

        let missing: Vec<String> = required
            .iter()
            .filter(|field| !payload.contains_key(**field))
            .map(|field| (*field).to_owned())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let blank: Vec<String> = required
            .iter()
            .filter(|field| {
                payload
                    .get(**field)
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.trim().is_empty())
            })
            .map(|field| (*field).to_owned())
            .collect();
        if !blank.is_empty() {
            return Err(ValidationError::BlankFields(blank));
        }

        Ok(())
    }
}
