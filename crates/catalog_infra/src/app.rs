//! The app: an ordered set of stacks plus the parameter registry they share.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, info_span};

use crate::api::{declare_api, unsigned_routes, ApiProps};
use crate::config::{AppSettings, DeployEnv};
use crate::error::{Result, SynthError};
use crate::monitoring::{declare_monitoring, MonitoringProps};
use crate::pipeline::{declare_pipeline, PipelineProps};
use crate::registry::ParameterRegistry;
use crate::stack::Stack;
use crate::table::{declare_table, TableProps};

pub const TABLE_STACK: &str = "TableStack";
pub const API_STACK: &str = "ApiStack";
pub const MONITORING_STACK: &str = "MonitoringStack";
pub const PIPELINE_STACK: &str = "PipelineStack";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Default)]
pub struct App {
    stacks: Vec<Stack>,
    registry: ParameterRegistry,
}

/// Stack entry of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStack {
    pub name: String,
    pub description: Option<String>,
    pub env: DeployEnv,
    /// Template file, relative to the output directory.
    pub template: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub stacks: Vec<ManifestStack>,
    pub deploy_order: Vec<String>,
}

/// What [`App::synth`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub out_dir: PathBuf,
    pub manifest: Manifest,
}

impl Assembly {
    pub fn template_path(&self, stack_name: &str) -> PathBuf {
        self.out_dir.join(template_file_name(stack_name))
    }
}

pub fn template_file_name(stack_name: &str) -> String {
    format!("{stack_name}.template.json")
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry_mut(&mut self) -> &mut ParameterRegistry {
        &mut self.registry
    }

    pub fn add_stack(&mut self, stack: Stack) -> Result<()> {
        if self.stack(stack.name()).is_some() {
            return Err(SynthError::DuplicateStack(stack.name().to_string()));
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.iter().find(|stack| stack.name() == name)
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// Stack names ordered so that every stack follows its dependencies.
    /// Ties keep declaration order.
    pub fn deploy_order(&self) -> Result<Vec<&str>> {
        for stack in &self.stacks {
            if let Some(unknown) = stack
                .dependencies()
                .iter()
                .find(|dependency| self.stack(dependency).is_none())
            {
                return Err(SynthError::UnknownStack(unknown.clone()));
            }
        }

        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.stacks.len());
        while order.len() < self.stacks.len() {
            let next = self.stacks.iter().find(|stack| {
                !placed.contains(stack.name())
                    && stack
                        .dependencies()
                        .iter()
                        .all(|dependency| placed.contains(dependency.as_str()))
            });
            let Some(next) = next else {
                let stuck = self
                    .stacks
                    .iter()
                    .find(|stack| !placed.contains(stack.name()))
                    .map(|stack| stack.name().to_string())
                    .unwrap_or_default();
                return Err(SynthError::DependencyCycle(stuck));
            };
            placed.insert(next.name());
            order.push(next.name());
        }
        Ok(order)
    }

    /// True when `from` is ordered after `to` through its dependency chain.
    fn depends_on(&self, from: &str, to: &str) -> bool {
        let mut pending = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name) {
                continue;
            }
            let Some(stack) = self.stack(name) else {
                continue;
            };
            for dependency in stack.dependencies() {
                if dependency == to {
                    return true;
                }
                pending.push(dependency);
            }
        }
        false
    }

    pub fn validate(&self) -> Result<()> {
        self.deploy_order()?;

        for read in self.registry.reads() {
            let publisher = self
                .registry
                .get(&read.key)
                .ok_or_else(|| SynthError::UnknownParameter {
                    key: read.key.clone(),
                    reader: read.reader.clone(),
                })?;
            if publisher.publisher != read.reader
                && !self.depends_on(&read.reader, &publisher.publisher)
            {
                return Err(SynthError::UnorderedParameterRead {
                    key: read.key.clone(),
                    reader: read.reader.clone(),
                    publisher: publisher.publisher.clone(),
                });
            }
        }

        for stack in &self.stacks {
            if let Some(route_key) = unsigned_routes(stack).into_iter().next() {
                return Err(SynthError::UnsignedRoute {
                    stack: stack.name().to_string(),
                    route_key,
                });
            }
        }
        Ok(())
    }

    /// Validate, then write one template per stack and `manifest.json`.
    pub fn synth(&self, out_dir: &Path) -> Result<Assembly> {
        let _span = info_span!("synth", out_dir = %out_dir.display()).entered();
        self.validate()?;
        fs::create_dir_all(out_dir)?;

        let mut stacks = Vec::with_capacity(self.stacks.len());
        for stack in &self.stacks {
            let file_name = template_file_name(stack.name());
            fs::write(out_dir.join(&file_name), stack.template().to_json_pretty()?)?;
            info!(
                stack = %stack.name(),
                resources = stack.template().resources.len(),
                template = %file_name,
                "wrote template"
            );
            stacks.push(ManifestStack {
                name: stack.name().to_string(),
                description: stack.description().map(str::to_string),
                env: stack.env().clone(),
                template: file_name,
                dependencies: stack.dependencies().iter().cloned().collect(),
            });
        }

        let manifest = Manifest {
            stacks,
            deploy_order: self
                .deploy_order()?
                .into_iter()
                .map(str::to_string)
                .collect(),
        };
        fs::write(
            out_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        info!(order = ?manifest.deploy_order, "wrote manifest");

        Ok(Assembly {
            out_dir: out_dir.to_path_buf(),
            manifest,
        })
    }

    /// Parameter keys grouped by the stack that publishes them.
    pub fn published_keys(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut keys: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for key in self.registry.keys() {
            if let Some(parameter) = self.registry.get(key) {
                keys.entry(parameter.publisher.as_str())
                    .or_default()
                    .push(key.as_str());
            }
        }
        keys
    }
}

/// Build the four application stacks.
///
/// `layer_dir` is the shared utility layer source; it is staged under
/// `out_dir` so that the Api template can point at it.
pub fn compose(settings: &AppSettings, layer_dir: &Path, out_dir: &Path) -> Result<App> {
    let mut app = App::new();
    let env = &settings.env;

    let mut table_stack = Stack::new(
        TABLE_STACK,
        "Stack for DynamoDB table storing album items",
        env.clone(),
    );
    let table = declare_table(
        &mut table_stack,
        &TableProps {
            table_name: settings.table_name.clone(),
        },
    )?;
    app.add_stack(table_stack)?;

    let mut api_stack = Stack::new(
        API_STACK,
        "Stack for the HTTP API and its Lambda integrations",
        env.clone(),
    );
    declare_api(
        &mut api_stack,
        app.registry_mut(),
        &ApiProps {
            api_name: settings.api_name.clone(),
            api_description: settings.api_description.clone(),
            table_name: table.table_name.clone(),
            layer_source: layer_dir.to_path_buf(),
            assembly_root: out_dir.to_path_buf(),
        },
    )?;
    app.add_stack(api_stack)?;

    let mut monitoring_stack = Stack::new(
        MONITORING_STACK,
        "Stack for API and table alarms and the dashboard",
        env.clone(),
    );
    monitoring_stack.add_dependency(API_STACK);
    declare_monitoring(
        &mut monitoring_stack,
        app.registry_mut(),
        &MonitoringProps {
            api_name: settings.api_name.clone(),
            table_name: table.table_name,
        },
    )?;
    app.add_stack(monitoring_stack)?;

    let mut pipeline_stack = Stack::new(
        PIPELINE_STACK,
        "Stack for the CI/CD pipeline deploying the app stacks",
        env.clone(),
    );
    declare_pipeline(
        &mut pipeline_stack,
        &PipelineProps {
            pipeline_name: settings.pipeline_name(),
            env: env.clone(),
            repository: settings.repository.clone(),
            stack_names: vec![
                TABLE_STACK.to_string(),
                API_STACK.to_string(),
                MONITORING_STACK.to_string(),
            ],
        },
    )?;
    app.add_stack(pipeline_stack)?;

    info!(stacks = app.stacks().len(), "composed app");
    Ok(app)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::Resource;

    fn env() -> DeployEnv {
        DeployEnv::new("123456789012", "us-east-1")
    }

    fn stack(name: &str, dependencies: &[&str]) -> Stack {
        let mut stack = Stack::new(name, name, env());
        for dependency in dependencies {
            stack.add_dependency(*dependency);
        }
        stack
    }

    #[test]
    fn deploy_order_follows_dependencies_then_declaration() {
        let mut app = App::new();
        app.add_stack(stack("Monitoring", &["Api"])).expect("add");
        app.add_stack(stack("Table", &[])).expect("add");
        app.add_stack(stack("Api", &[])).expect("add");

        assert_eq!(
            app.deploy_order().expect("acyclic"),
            vec!["Table", "Api", "Monitoring"]
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut app = App::new();
        app.add_stack(stack("A", &["B"])).expect("add");
        app.add_stack(stack("B", &["A"])).expect("add");
        assert!(matches!(
            app.deploy_order(),
            Err(SynthError::DependencyCycle(_))
        ));
    }

    #[test]
    fn unknown_dependencies_are_rejected() {
        let mut app = App::new();
        app.add_stack(stack("A", &["Missing"])).expect("add");
        assert!(matches!(
            app.deploy_order(),
            Err(SynthError::UnknownStack(ref name)) if name == "Missing"
        ));
    }

    #[test]
    fn duplicate_stacks_are_rejected() {
        let mut app = App::new();
        app.add_stack(stack("A", &[])).expect("add");
        assert!(matches!(
            app.add_stack(stack("A", &[])),
            Err(SynthError::DuplicateStack(_))
        ));
    }

    #[test]
    fn reader_must_depend_on_publisher() {
        let mut app = App::new();
        app.registry_mut()
            .publish("Api", "/app/API_ID", json!({ "Ref": "HttpApi" }))
            .expect("publish");
        let mut reader = stack("Monitoring", &[]);
        app.registry_mut()
            .read_published(&mut reader, "/app/API_ID", "ApiId")
            .expect("read");
        app.add_stack(stack("Api", &[])).expect("add");
        app.add_stack(reader).expect("add");

        assert!(matches!(
            app.validate(),
            Err(SynthError::UnorderedParameterRead { ref publisher, .. }) if publisher == "Api"
        ));
    }

    #[test]
    fn transitive_dependencies_order_reads() {
        let mut app = App::new();
        app.registry_mut()
            .publish("Api", "/app/API_ID", json!("id"))
            .expect("publish");
        let mut reader = stack("Dashboards", &["Monitoring"]);
        app.registry_mut()
            .read_published(&mut reader, "/app/API_ID", "ApiId")
            .expect("read");
        app.add_stack(stack("Api", &[])).expect("add");
        app.add_stack(stack("Monitoring", &["Api"])).expect("add");
        app.add_stack(reader).expect("add");

        app.validate().expect("reader is ordered after publisher");
    }

    #[test]
    fn reads_of_unpublished_keys_are_rejected() {
        let mut app = App::new();
        let mut reader = stack("Monitoring", &[]);
        app.registry_mut()
            .read_published(&mut reader, "/app/API_ID", "ApiId")
            .expect("read");
        app.add_stack(reader).expect("add");

        assert!(matches!(
            app.validate(),
            Err(SynthError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn unsigned_routes_block_validation() {
        let mut app = App::new();
        let mut api = stack("Api", &[]);
        api.add_resource(
            "OpenRoute",
            Resource::new(
                "AWS::ApiGatewayV2::Route",
                json!({ "RouteKey": "GET /open", "AuthorizationType": "NONE" }),
            ),
        )
        .expect("declare");
        app.add_stack(api).expect("add");

        assert!(matches!(
            app.validate(),
            Err(SynthError::UnsignedRoute { ref route_key, .. }) if route_key == "GET /open"
        ));
    }
}
