//! Object model: entities and their typed properties, loaded from TOML.
//!
//! ```toml
//! [entities.Note]
//! title = "string"
//! pinned = "boolean"
//! ```

use crate::error::ModelError;
use crate::store::Properties;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    Json,
}

impl PropertyType {
    fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (PropertyType::Json, _) => true,
            (PropertyType::String, Value::String(_)) => true,
            (PropertyType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (PropertyType::Float, Value::Number(_)) => true,
            (PropertyType::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
            PropertyType::Boolean => "boolean",
            PropertyType::Json => "json",
        };
        f.write_str(name)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub entities: BTreeMap<String, BTreeMap<String, PropertyType>>,
}

impl Model {
    pub fn from_toml_str(source: &str) -> Result<Self, ModelError> {
        let model: Model = toml::from_str(source).map_err(|e| ModelError::Parse(e.to_string()))?;
        if model.entities.is_empty() {
            return Err(ModelError::Parse("model defines no entities".to_string()));
        }
        Ok(model)
    }

    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let source = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn has_entity(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    fn entity(&self, entity: &str) -> Result<&BTreeMap<String, PropertyType>, ModelError> {
        self.entities
            .get(entity)
            .ok_or_else(|| ModelError::UnknownEntity(entity.to_string()))
    }

    pub fn check_entity(&self, entity: &str) -> Result<(), ModelError> {
        self.entity(entity).map(|_| ())
    }

    pub fn check_value(&self, entity: &str, property: &str, value: &Value) -> Result<(), ModelError> {
        let expected = self
            .entity(entity)?
            .get(property)
            .ok_or_else(|| ModelError::UnknownProperty {
                entity: entity.to_string(),
                property: property.to_string(),
            })?;
        if expected.accepts(value) {
            Ok(())
        } else {
            Err(ModelError::TypeMismatch {
                entity: entity.to_string(),
                property: property.to_string(),
                expected: expected.to_string(),
                found: kind_of(value).to_string(),
            })
        }
    }

    pub fn check_properties(&self, entity: &str, properties: &Properties) -> Result<(), ModelError> {
        self.check_entity(entity)?;
        for (property, value) in properties {
            self.check_value(entity, property, value)?;
        }
        Ok(())
    }

    /// Hex blake3 digest of the canonical JSON form. Stores remember it so a
    /// store is never opened against a different schema.
    pub fn fingerprint(&self) -> String {
        // BTreeMap keeps the serialization order stable.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(blake3::hash(&canonical).as_bytes())
    }
}
