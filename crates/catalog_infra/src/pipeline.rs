//! Source → DeployApp pipeline that redeploys the app stacks and then runs
//! the live integration suite against them.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::info;

use crate::config::{DeployEnv, RepositorySettings};
use crate::error::{Result, SynthError};
use crate::intrinsic::{get_att, join, reference};
use crate::registry::ParameterRegistry;
use crate::stack::Stack;
use crate::template::Resource;

pub const PIPELINE_LOGICAL_ID: &str = "Pipeline";
pub const BUILD_ROLE_LOGICAL_ID: &str = "BuildRole";
pub const PIPELINE_ROLE_LOGICAL_ID: &str = "PipelineRole";
pub const ARTIFACT_BUCKET_LOGICAL_ID: &str = "ArtifactsBucket";
pub const DEPLOY_PROJECT_LOGICAL_ID: &str = "CodeBuildDeployProject";
pub const TEST_PROJECT_LOGICAL_ID: &str = "CodeBuildTestsProject";
pub const CONNECTION_PARAMETER_LOGICAL_ID: &str = "GithubConnectionArn";
pub const BUILD_IMAGE: &str = "aws/codebuild/standard:5.0";
const SOURCE_ARTIFACT: &str = "SourceArtifact";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Source,
    Build,
    Test,
}

impl ActionKind {
    pub fn category(self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Build => "Build",
            Self::Test => "Test",
        }
    }

    fn provider(self) -> &'static str {
        match self {
            Self::Source => "CodeStarSourceConnection",
            Self::Build | Self::Test => "CodeBuild",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineAction {
    pub name: String,
    pub kind: ActionKind,
    pub run_order: u32,
    pub configuration: Value,
    pub input_artifacts: Vec<String>,
    pub output_artifacts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStage {
    pub name: String,
    pub actions: Vec<PipelineAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    pub stages: Vec<PipelineStage>,
}

impl PipelineSpec {
    /// Check the ordering guarantees the execution engine relies on.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.stages.first() else {
            return Err(invalid("a pipeline needs at least one stage"));
        };
        if first.actions.is_empty() || first.actions.iter().any(|a| a.kind != ActionKind::Source) {
            return Err(invalid("the first stage must contain only source actions"));
        }

        let mut stage_names = BTreeSet::new();
        let mut produced: BTreeSet<&str> = BTreeSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() || !stage_names.insert(stage.name.as_str()) {
                return Err(invalid(format!(
                    "stage name '{}' must be unique and non-empty",
                    stage.name
                )));
            }
            if stage.actions.is_empty() {
                return Err(invalid(format!("stage '{}' has no actions", stage.name)));
            }

            for action in &stage.actions {
                if action.run_order == 0 {
                    return Err(invalid(format!(
                        "action '{}' needs a run order of at least 1",
                        action.name
                    )));
                }
                if index > 0 && action.kind == ActionKind::Source {
                    return Err(invalid(format!(
                        "source action '{}' outside the first stage",
                        action.name
                    )));
                }
                if let Some(missing) = action
                    .input_artifacts
                    .iter()
                    .find(|artifact| !produced.contains(artifact.as_str()))
                {
                    return Err(invalid(format!(
                        "action '{}' consumes '{missing}' before any earlier stage produces it",
                        action.name
                    )));
                }
            }

            let last_build = stage
                .actions
                .iter()
                .filter(|a| a.kind == ActionKind::Build)
                .map(|a| a.run_order)
                .max();
            let first_test = stage
                .actions
                .iter()
                .filter(|a| a.kind == ActionKind::Test)
                .map(|a| a.run_order)
                .min();
            if let (Some(last_build), Some(first_test)) = (last_build, first_test) {
                if first_test <= last_build {
                    return Err(invalid(format!(
                        "stage '{}' runs a test action before its build actions finish",
                        stage.name
                    )));
                }
            }

            let outputs = stage.actions.iter().flat_map(|a| &a.output_artifacts);
            produced.extend(outputs.map(String::as_str));
        }
        Ok(())
    }

    /// Action names grouped into the waves the engine runs them in: stage by
    /// stage, then by ascending run order within a stage.
    pub fn execution_waves(&self) -> Vec<Vec<&str>> {
        let mut waves = Vec::new();
        for stage in &self.stages {
            let mut by_order: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
            for action in &stage.actions {
                by_order
                    .entry(action.run_order)
                    .or_default()
                    .push(&action.name);
            }
            waves.extend(by_order.into_values());
        }
        waves
    }

    fn to_cloudformation(&self) -> Value {
        Value::Array(
            self.stages
                .iter()
                .map(|stage| {
                    let actions: Vec<Value> = stage
                        .actions
                        .iter()
                        .map(|action| {
                            json!({
                                "Name": action.name,
                                "ActionTypeId": {
                                    "Category": action.kind.category(),
                                    "Owner": "AWS",
                                    "Provider": action.kind.provider(),
                                    "Version": "1",
                                },
                                "Configuration": action.configuration,
                                "InputArtifacts": artifacts(&action.input_artifacts),
                                "OutputArtifacts": artifacts(&action.output_artifacts),
                                "RunOrder": action.run_order,
                            })
                        })
                        .collect();
                    json!({ "Name": stage.name, "Actions": actions })
                })
                .collect(),
        )
    }
}

fn artifacts(names: &[String]) -> Value {
    Value::Array(names.iter().map(|name| json!({ "Name": name })).collect())
}

fn invalid(message: impl Into<String>) -> SynthError {
    SynthError::InvalidPipeline(message.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineProps {
    pub pipeline_name: String,
    pub env: DeployEnv,
    pub repository: RepositorySettings,
    /// Stacks the deploy action redeploys, in order.
    pub stack_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDeclaration {
    pub spec: PipelineSpec,
    pub deploy_command: String,
}

pub fn deploy_command(stack_names: &[String]) -> String {
    format!(
        "cargo xtask deploy {} --require-approval never",
        stack_names.join(" ")
    )
}

fn build_spec(install: &[&str], build: &[String]) -> Value {
    json!({
        "version": "0.2",
        "phases": {
            "install": { "commands": install },
            "build": { "commands": build },
        }
    })
}

const LIVE_TEST_COMMAND: &str =
    "cargo test -p catalog_api --features live-tests --test live_endpoints";

const TOOLCHAIN_INSTALL: [&str; 2] = [
    "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y --profile minimal",
    ". \"$HOME/.cargo/env\"",
];

pub fn declare_pipeline(stack: &mut Stack, props: &PipelineProps) -> Result<PipelineDeclaration> {
    let connection_arn = ParameterRegistry::read_external(
        stack,
        &props.repository.connection_parameter,
        CONNECTION_PARAMETER_LOGICAL_ID,
    )?;

    stack.add_resource(
        ARTIFACT_BUCKET_LOGICAL_ID,
        Resource::new("AWS::S3::Bucket", json!({})),
    )?;

    stack.add_resource(
        BUILD_ROLE_LOGICAL_ID,
        service_role("codebuild.amazonaws.com"),
    )?;
    // TODO(pipeline): scope the build role to the deploy and test actions;
    // it currently holds every action on every resource.
    stack.add_resource(
        format!("{BUILD_ROLE_LOGICAL_ID}DefaultPolicy"),
        inline_policy(
            &format!("{BUILD_ROLE_LOGICAL_ID}DefaultPolicy"),
            BUILD_ROLE_LOGICAL_ID,
            vec![json!({ "Effect": "Allow", "Action": "*", "Resource": "*" })],
        ),
    )?;

    let deploy_command = deploy_command(&props.stack_names);
    let mut deploy_install: Vec<&str> = TOOLCHAIN_INSTALL.to_vec();
    deploy_install.push("cargo fetch");
    stack.add_resource(
        DEPLOY_PROJECT_LOGICAL_ID,
        build_project(
            build_spec(&deploy_install, &[deploy_command.clone()]),
            true,
            vec![
                plaintext("AWS_ACCOUNT", json!(props.env.account)),
                plaintext("AWS_REGIONS", json!(props.env.region)),
                plaintext("ASSET_BUCKET", reference(ARTIFACT_BUCKET_LOGICAL_ID)),
                plaintext("REPO_OWNER", json!(props.repository.owner)),
                plaintext("REPO_NAME", json!(props.repository.name)),
            ],
        ),
    )?;

    let mut test_install: Vec<&str> = TOOLCHAIN_INSTALL.to_vec();
    test_install.push("cargo fetch --manifest-path crates/catalog_api/Cargo.toml");
    stack.add_resource(
        TEST_PROJECT_LOGICAL_ID,
        build_project(
            build_spec(&test_install, &[LIVE_TEST_COMMAND.to_string()]),
            false,
            Vec::new(),
        ),
    )?;

    stack.add_resource(
        PIPELINE_ROLE_LOGICAL_ID,
        service_role("codepipeline.amazonaws.com"),
    )?;
    stack.add_resource(
        format!("{PIPELINE_ROLE_LOGICAL_ID}DefaultPolicy"),
        inline_policy(
            &format!("{PIPELINE_ROLE_LOGICAL_ID}DefaultPolicy"),
            PIPELINE_ROLE_LOGICAL_ID,
            vec![
                json!({
                    "Effect": "Allow",
                    "Action": [
                        "s3:GetObject*",
                        "s3:GetBucket*",
                        "s3:List*",
                        "s3:PutObject*"
                    ],
                    "Resource": [
                        get_att(ARTIFACT_BUCKET_LOGICAL_ID, "Arn"),
                        join(
                            "",
                            vec![get_att(ARTIFACT_BUCKET_LOGICAL_ID, "Arn"), json!("/*")]
                        ),
                    ]
                }),
                json!({
                    "Effect": "Allow",
                    "Action": [
                        "codebuild:BatchGetBuilds",
                        "codebuild:StartBuild",
                        "codebuild:StopBuild"
                    ],
                    "Resource": [
                        get_att(DEPLOY_PROJECT_LOGICAL_ID, "Arn"),
                        get_att(TEST_PROJECT_LOGICAL_ID, "Arn"),
                    ]
                }),
                json!({
                    "Effect": "Allow",
                    "Action": "codestar-connections:UseConnection",
                    "Resource": connection_arn.clone(),
                }),
            ],
        ),
    )?;

    let spec = PipelineSpec {
        stages: vec![
            PipelineStage {
                name: "Source".to_string(),
                actions: vec![PipelineAction {
                    name: "GithubSource".to_string(),
                    kind: ActionKind::Source,
                    run_order: 1,
                    configuration: json!({
                        "ConnectionArn": connection_arn,
                        "FullRepositoryId": props.repository.full_repository_id(),
                        "BranchName": props.repository.branch,
                    }),
                    input_artifacts: Vec::new(),
                    output_artifacts: vec![SOURCE_ARTIFACT.to_string()],
                }],
            },
            PipelineStage {
                name: "DeployApp".to_string(),
                actions: vec![
                    PipelineAction {
                        name: "DeployStacks".to_string(),
                        kind: ActionKind::Build,
                        run_order: 1,
                        configuration: json!({
                            "ProjectName": reference(DEPLOY_PROJECT_LOGICAL_ID)
                        }),
                        input_artifacts: vec![SOURCE_ARTIFACT.to_string()],
                        output_artifacts: Vec::new(),
                    },
                    PipelineAction {
                        name: "RunIntegrationTests".to_string(),
                        kind: ActionKind::Test,
                        run_order: 2,
                        configuration: json!({
                            "ProjectName": reference(TEST_PROJECT_LOGICAL_ID)
                        }),
                        input_artifacts: vec![SOURCE_ARTIFACT.to_string()],
                        output_artifacts: Vec::new(),
                    },
                ],
            },
        ],
    };
    spec.validate()?;

    stack.add_resource(
        PIPELINE_LOGICAL_ID,
        Resource::new(
            "AWS::CodePipeline::Pipeline",
            json!({
                "Name": props.pipeline_name,
                "RoleArn": get_att(PIPELINE_ROLE_LOGICAL_ID, "Arn"),
                "ArtifactStore": {
                    "Type": "S3",
                    "Location": reference(ARTIFACT_BUCKET_LOGICAL_ID),
                },
                "Stages": spec.to_cloudformation(),
            }),
        )
        .depends_on(format!("{PIPELINE_ROLE_LOGICAL_ID}DefaultPolicy"))
        .depends_on(PIPELINE_ROLE_LOGICAL_ID),
    )?;

    info!(
        stack = %stack.name(),
        pipeline = %props.pipeline_name,
        targets = ?props.stack_names,
        "declared deployment pipeline"
    );

    Ok(PipelineDeclaration {
        spec,
        deploy_command,
    })
}

fn service_role(service: &str) -> Resource {
    Resource::new(
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": service },
                    "Action": "sts:AssumeRole"
                }]
            }
        }),
    )
}

fn inline_policy(name: &str, role_logical_id: &str, statements: Vec<Value>) -> Resource {
    Resource::new(
        "AWS::IAM::Policy",
        json!({
            "PolicyName": name,
            "Roles": [reference(role_logical_id)],
            "PolicyDocument": { "Version": "2012-10-17", "Statement": statements },
        }),
    )
}

fn plaintext(name: &str, value: Value) -> Value {
    json!({ "Name": name, "Type": "PLAINTEXT", "Value": value })
}

fn build_project(build_spec: Value, privileged: bool, variables: Vec<Value>) -> Resource {
    Resource::new(
        "AWS::CodeBuild::Project",
        json!({
            "Source": { "Type": "CODEPIPELINE", "BuildSpec": build_spec.to_string() },
            "Artifacts": { "Type": "CODEPIPELINE" },
            "ServiceRole": get_att(BUILD_ROLE_LOGICAL_ID, "Arn"),
            "Environment": {
                "Type": "LINUX_CONTAINER",
                "ComputeType": "BUILD_GENERAL1_SMALL",
                "Image": BUILD_IMAGE,
                "PrivilegedMode": privileged,
                "EnvironmentVariables": variables,
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> PipelineProps {
        PipelineProps {
            pipeline_name: "app_name_api-Pipeline".to_string(),
            env: DeployEnv::new("123", "us-east-1"),
            repository: RepositorySettings::new("acme", "catalog"),
            stack_names: vec![
                "TableStack".to_string(),
                "ApiStack".to_string(),
                "MonitoringStack".to_string(),
            ],
        }
    }

    fn declare() -> (Stack, PipelineDeclaration) {
        let mut stack = Stack::new(
            "PipelineStack",
            "Pipeline",
            DeployEnv::new("123", "us-east-1"),
        );
        let declaration = declare_pipeline(&mut stack, &props()).expect("pipeline should declare");
        (stack, declaration)
    }

    fn action(name: &str, kind: ActionKind, run_order: u32) -> PipelineAction {
        PipelineAction {
            name: name.to_string(),
            kind,
            run_order,
            configuration: json!({}),
            input_artifacts: Vec::new(),
            output_artifacts: Vec::new(),
        }
    }

    #[test]
    fn source_runs_before_deploy_before_tests() {
        let (_, declaration) = declare();
        assert_eq!(
            declaration.spec.execution_waves(),
            vec![
                vec!["GithubSource"],
                vec!["DeployStacks"],
                vec!["RunIntegrationTests"],
            ]
        );
    }

    #[test]
    fn deploy_command_targets_named_stacks_without_approval() {
        let (stack, declaration) = declare();
        assert_eq!(
            declaration.deploy_command,
            "cargo xtask deploy TableStack ApiStack MonitoringStack --require-approval never"
        );
        let project = stack
            .resource(DEPLOY_PROJECT_LOGICAL_ID)
            .expect("deploy project");
        let build_spec: Value = serde_json::from_str(
            project.properties["Source"]["BuildSpec"]
                .as_str()
                .expect("buildspec string"),
        )
        .expect("buildspec json");
        assert_eq!(
            build_spec["phases"]["build"]["commands"][0],
            json!(declaration.deploy_command)
        );
        let variables = project.properties["Environment"]["EnvironmentVariables"]
            .as_array()
            .expect("variables");
        assert_eq!(variables[0]["Name"], "AWS_ACCOUNT");
        assert_eq!(variables[0]["Value"], "123");
        assert_eq!(variables[1]["Name"], "AWS_REGIONS");
        assert_eq!(variables[1]["Value"], "us-east-1");
    }

    #[test]
    fn source_reads_connection_from_parameter_on_main() {
        let (stack, _) = declare();
        assert_eq!(
            stack.template().parameters[CONNECTION_PARAMETER_LOGICAL_ID]
                .default
                .as_deref(),
            Some("Github-Connection")
        );
        let pipeline = stack.resource(PIPELINE_LOGICAL_ID).expect("pipeline");
        let source = &pipeline.properties["Stages"][0]["Actions"][0];
        assert_eq!(source["Configuration"]["BranchName"], "main");
        assert_eq!(source["Configuration"]["FullRepositoryId"], "acme/catalog");
        assert_eq!(
            source["Configuration"]["ConnectionArn"],
            json!({ "Ref": CONNECTION_PARAMETER_LOGICAL_ID })
        );
    }

    #[test]
    fn build_role_is_unrestricted_placeholder() {
        let (stack, _) = declare();
        let policy = stack
            .resource("BuildRoleDefaultPolicy")
            .expect("build policy");
        assert_eq!(
            policy.properties["PolicyDocument"]["Statement"],
            json!([{ "Effect": "Allow", "Action": "*", "Resource": "*" }])
        );
    }

    #[test]
    fn rejects_tests_running_alongside_deploy() {
        let spec = PipelineSpec {
            stages: vec![
                PipelineStage {
                    name: "Source".to_string(),
                    actions: vec![action("Checkout", ActionKind::Source, 1)],
                },
                PipelineStage {
                    name: "DeployApp".to_string(),
                    actions: vec![
                        action("Deploy", ActionKind::Build, 1),
                        action("Test", ActionKind::Test, 1),
                    ],
                },
            ],
        };
        assert!(matches!(
            spec.validate(),
            Err(SynthError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn rejects_pipelines_not_starting_with_source() {
        let spec = PipelineSpec {
            stages: vec![PipelineStage {
                name: "DeployApp".to_string(),
                actions: vec![action("Deploy", ActionKind::Build, 1)],
            }],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn rejects_inputs_nobody_produced_yet() {
        let mut deploy = action("Deploy", ActionKind::Build, 1);
        deploy.input_artifacts = vec!["SourceArtifact".to_string()];
        let spec = PipelineSpec {
            stages: vec![
                PipelineStage {
                    name: "Source".to_string(),
                    actions: vec![action("Checkout", ActionKind::Source, 1)],
                },
                PipelineStage {
                    name: "DeployApp".to_string(),
                    actions: vec![deploy],
                },
            ],
        };
        assert!(spec.validate().is_err());
    }
}
