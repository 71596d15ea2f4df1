use std::collections::BTreeSet;

use tracing::debug;

use crate::config::DeployEnv;
use crate::error::{Result, SynthError};
use crate::template::{Resource, Template, TemplateParameter};

/// A named, independently deployable unit of declared infrastructure.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: DeployEnv,
    template: Template,
    dependencies: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, description: impl Into<String>, env: DeployEnv) -> Self {
        Self {
            name: name.into(),
            env,
            template: Template::new(Some(description.into())),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.template.description.as_deref()
    }

    pub fn env(&self) -> &DeployEnv {
        &self.env
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn add_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: Resource,
    ) -> Result<()> {
        let logical_id = logical_id.into();
        if self.template.resources.contains_key(&logical_id) {
            return Err(SynthError::DuplicateLogicalId {
                stack: self.name.clone(),
                logical_id,
            });
        }
        debug!(
            stack = %self.name,
            logical_id = %logical_id,
            resource_type = %resource.resource_type,
            "declared resource"
        );
        self.template.resources.insert(logical_id, resource);
        Ok(())
    }

    pub fn add_parameter(
        &mut self,
        logical_id: impl Into<String>,
        parameter: TemplateParameter,
    ) -> Result<()> {
        let logical_id = logical_id.into();
        if self.template.parameters.contains_key(&logical_id) {
            return Err(SynthError::DuplicateTemplateParameter {
                stack: self.name.clone(),
                logical_id,
            });
        }
        self.template.parameters.insert(logical_id, parameter);
        Ok(())
    }

    /// Declare that this stack must be deployed after `stack_name`.
    pub fn add_dependency(&mut self, stack_name: impl Into<String>) {
        self.dependencies.insert(stack_name.into());
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.template.resources.get(logical_id)
    }

    pub fn resource_mut(&mut self, logical_id: &str) -> Option<&mut Resource> {
        self.template.resources.get_mut(logical_id)
    }
}
