use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::item::ATTRIBUTES;

/// `set A=:a, B=:b` over the catalogued fields of a request body.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    /// `(attribute, placeholder)` in catalogue order.
    pub assignments: Vec<(&'static str, &'static str)>,
    pub values: BTreeMap<String, Value>,
}

impl UpdateExpression {
    pub fn from_body(body: &Map<String, Value>) -> Self {
        let mut assignments = Vec::new();
        let mut values = BTreeMap::new();
        for attribute in &ATTRIBUTES {
            if let Some(value) = body.get(attribute.api_name) {
                assignments.push((attribute.table_name, attribute.placeholder));
                values.insert(attribute.placeholder.to_string(), value.clone());
            }
        }
        Self {
            assignments,
            values,
        }
    }

    pub fn expression(&self) -> String {
        let assignments: Vec<String> = self
            .assignments
            .iter()
            .map(|(attribute, placeholder)| format!("{attribute}={placeholder}"))
            .collect();
        format!("set {}", assignments.join(", "))
    }

    /// New attribute values, keyed by attribute name.
    pub fn updated_attributes(&self) -> BTreeMap<String, Value> {
        self.assignments
            .iter()
            .filter_map(|(attribute, placeholder)| {
                self.values
                    .get(*placeholder)
                    .map(|value| (attribute.to_string(), value.clone()))
            })
            .collect()
    }
}
