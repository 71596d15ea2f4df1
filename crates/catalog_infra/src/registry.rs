//! Named parameters shared between independently deployed stacks.
//!
//! A stack publishes a value under a key; any later stack reads it back by
//! key. Reads never hold a typed reference to the publishing stack: they are
//! rendered as SSM-backed template parameters and resolved by the engine at
//! deploy time. The registry only remembers who wrote and who read each key
//! so that the app can check that readers are ordered after writers.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SynthError};
use crate::intrinsic;
use crate::stack::Stack;
use crate::template::TemplateParameter;

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedParameter {
    pub key: String,
    pub value: Value,
    pub publisher: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRead {
    pub key: String,
    pub reader: String,
}

#[derive(Debug, Default, Clone)]
pub struct ParameterRegistry {
    published: BTreeMap<String, PublishedParameter>,
    reads: Vec<ParameterRead>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as the single writer of `key`.
    pub fn publish(&mut self, publisher: &str, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if let Some(existing) = self.published.get(&key) {
            return Err(SynthError::DuplicatePublisher {
                key,
                publisher: existing.publisher.clone(),
            });
        }
        debug!(key = %key, publisher = %publisher, "published parameter");
        self.published.insert(
            key.clone(),
            PublishedParameter {
                key,
                value,
                publisher: publisher.to_string(),
            },
        );
        Ok(())
    }

    /// Read `key` from inside `reader`, declaring the template parameter
    /// `logical_id` that resolves it at deploy time.
    ///
    /// External keys that no stack of this app publishes are allowed here;
    /// use [`ParameterRegistry::read_published`] when the key must come from
    /// a sibling stack.
    pub fn read_external(reader: &mut Stack, key: &str, logical_id: &str) -> Result<Value> {
        reader.add_parameter(logical_id, TemplateParameter::ssm_string(key))?;
        Ok(intrinsic::reference(logical_id))
    }

    pub fn read_published(
        &mut self,
        reader: &mut Stack,
        key: &str,
        logical_id: &str,
    ) -> Result<Value> {
        let value = Self::read_external(reader, key, logical_id)?;
        self.reads.push(ParameterRead {
            key: key.to_string(),
            reader: reader.name().to_string(),
        });
        Ok(value)
    }

    pub fn get(&self, key: &str) -> Option<&PublishedParameter> {
        self.published.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.published.keys()
    }

    pub fn reads(&self) -> &[ParameterRead] {
        &self.reads
    }
}
