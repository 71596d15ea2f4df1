//! HTTP API declaration: routes, compute units, shared layer, published
//! parameters.
//!
//! Routes are first declared with the HTTP API default authorization
//! (`NONE`) and then patched to signed requests by
//! [`enforce_signed_requests`]. Synthesis checks the patch with
//! [`unsigned_routes`] and refuses to emit a template that still carries an
//! unauthenticated route.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use crate::assets::{stage_directory, StagedAsset};
use crate::error::{Result, SynthError};
use crate::intrinsic::{self, get_att, join, reference};
use crate::naming::{api_id_parameter_key, api_url_parameter_key, table_resource_arns};
use crate::registry::ParameterRegistry;
use crate::stack::Stack;
use crate::template::Resource;

pub const HTTP_API_LOGICAL_ID: &str = "HttpApiGateway";
pub const DEFAULT_STAGE_LOGICAL_ID: &str = "HttpApiGatewayDefaultStage";
pub const LAYER_LOGICAL_ID: &str = "LambdaUtilsLayer";
pub const URL_PARAMETER_LOGICAL_ID: &str = "ApiUrlParameter";
pub const ID_PARAMETER_LOGICAL_ID: &str = "ApiIdParameter";
pub const LAYER_STAGING_DIR: &str = "assets/utils_layer";
pub const LAMBDA_RUNTIME: &str = "provided.al2023";
pub const LAMBDA_HANDLER: &str = "bootstrap";
const ROUTE_RESOURCE_TYPE: &str = "AWS::ApiGatewayV2::Route";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableAction {
    PutItem,
    UpdateItem,
    GetItem,
    Query,
    DeleteItem,
}

impl TableAction {
    pub fn iam_action(self) -> &'static str {
        match self {
            Self::PutItem => "dynamodb:PutItem",
            Self::UpdateItem => "dynamodb:UpdateItem",
            Self::GetItem => "dynamodb:GetItem",
            Self::Query => "dynamodb:Query",
            Self::DeleteItem => "dynamodb:DeleteItem",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationType {
    None,
    AwsIam,
}

impl AuthorizationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AwsIam => "AWS_IAM",
        }
    }
}

/// An HTTP path/method bound to a compute unit with its table permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub path: String,
    pub method: HttpMethod,
    pub function_name: String,
    pub route_logical_id: String,
    pub actions: Vec<TableAction>,
    pub authorization: AuthorizationType,
}

impl RouteBinding {
    pub fn route_key(&self) -> String {
        format!("{} {}", self.method.as_str(), self.path)
    }
}

struct ComputeUnit {
    function_name: &'static str,
    asset: &'static str,
    method: HttpMethod,
    path: &'static str,
    actions: &'static [TableAction],
}

const COMPUTE_UNITS: [ComputeUnit; 4] = [
    ComputeUnit {
        function_name: "CreateItemLambda",
        asset: "create_item",
        method: HttpMethod::Post,
        path: "/item",
        actions: &[TableAction::PutItem],
    },
    ComputeUnit {
        function_name: "UpdateItemLambda",
        asset: "update_item",
        method: HttpMethod::Patch,
        path: "/item",
        actions: &[TableAction::UpdateItem],
    },
    ComputeUnit {
        function_name: "GetItemLambda",
        asset: "get_item",
        method: HttpMethod::Get,
        path: "/item/{album_name}",
        actions: &[TableAction::GetItem, TableAction::Query],
    },
    ComputeUnit {
        function_name: "DeleteItemLambda",
        asset: "delete_item",
        method: HttpMethod::Delete,
        path: "/item/{album_name}",
        actions: &[TableAction::DeleteItem],
    },
];

/// Binary names of the compute units, as packaged under `assets/<name>.zip`
/// by `cargo xtask package`.
pub fn compute_unit_assets() -> impl Iterator<Item = &'static str> {
    COMPUTE_UNITS.iter().map(|unit| unit.asset)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiProps {
    pub api_name: String,
    pub api_description: Option<String>,
    pub table_name: String,
    /// Directory shipped as the shared utility layer.
    pub layer_source: PathBuf,
    /// Assembly output directory the layer is staged into.
    pub assembly_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDeclaration {
    pub api_logical_id: String,
    pub routes: Vec<RouteBinding>,
    pub url_parameter_key: String,
    pub id_parameter_key: String,
    pub layer: StagedAsset,
}

pub fn declare_api(
    stack: &mut Stack,
    registry: &mut ParameterRegistry,
    props: &ApiProps,
) -> Result<ApiDeclaration> {
    let mut api_properties = json!({
        "Name": props.api_name,
        "ProtocolType": "HTTP",
    });
    if let Some(description) = &props.api_description {
        api_properties["Description"] = Value::String(description.clone());
    }
    stack.add_resource(
        HTTP_API_LOGICAL_ID,
        Resource::new("AWS::ApiGatewayV2::Api", api_properties),
    )?;
    stack.add_resource(
        DEFAULT_STAGE_LOGICAL_ID,
        Resource::new(
            "AWS::ApiGatewayV2::Stage",
            json!({
                "ApiId": reference(HTTP_API_LOGICAL_ID),
                "StageName": "$default",
                "AutoDeploy": true,
            }),
        ),
    )?;

    let url_parameter_key = api_url_parameter_key(&props.api_name);
    let id_parameter_key = api_id_parameter_key(&props.api_name);
    publish_parameter(
        stack,
        registry,
        URL_PARAMETER_LOGICAL_ID,
        &url_parameter_key,
        default_stage_url(),
        &format!("{} API URL", props.api_name),
    )?;
    publish_parameter(
        stack,
        registry,
        ID_PARAMETER_LOGICAL_ID,
        &id_parameter_key,
        reference(HTTP_API_LOGICAL_ID),
        &format!("{} API ID", props.api_name),
    )?;

    let layer = stage_directory(&props.layer_source, &props.assembly_root, LAYER_STAGING_DIR)?;
    stack.add_resource(
        LAYER_LOGICAL_ID,
        Resource::new(
            "AWS::Lambda::LayerVersion",
            json!({
                "LayerName": format!("{}-utils", props.api_name),
                "Content": layer.relative_path,
                "CompatibleRuntimes": [LAMBDA_RUNTIME],
            }),
        )
        .with_metadata("aws:asset:path", json!(layer.relative_path))
        .with_metadata("aws:asset:hash", json!(layer.hash)),
    )?;

    let table_arns = table_resource_arns(stack.env(), &props.table_name);
    let mut routes = Vec::with_capacity(COMPUTE_UNITS.len());
    for unit in &COMPUTE_UNITS {
        routes.push(declare_compute_unit(
            stack,
            unit,
            &props.table_name,
            &table_arns,
        )?);
    }
    enforce_signed_requests(stack, &mut routes)?;

    info!(
        stack = %stack.name(),
        api = %props.api_name,
        routes = routes.len(),
        "declared http api"
    );

    Ok(ApiDeclaration {
        api_logical_id: HTTP_API_LOGICAL_ID.to_string(),
        routes,
        url_parameter_key,
        id_parameter_key,
        layer,
    })
}

/// Force every route onto signed-request (`AWS_IAM`) authorization.
///
/// Routes declared through [`declare_api`] start out unauthenticated; this
/// step is mandatory and must run after every route exists. A binding whose
/// route resource is missing from `stack` is reported as unsigned.
pub fn enforce_signed_requests(stack: &mut Stack, routes: &mut [RouteBinding]) -> Result<()> {
    let stack_name = stack.name().to_string();
    for route in routes.iter_mut() {
        let Some(resource) = stack.resource_mut(&route.route_logical_id) else {
            return Err(SynthError::UnsignedRoute {
                stack: stack_name,
                route_key: route.route_key(),
            });
        };
        resource.set_property(
            "AuthorizationType",
            Value::String(AuthorizationType::AwsIam.as_str().to_string()),
        );
        route.authorization = AuthorizationType::AwsIam;
    }
    Ok(())
}

/// Route keys in `stack` whose authorization is anything but `AWS_IAM`.
pub fn unsigned_routes(stack: &Stack) -> Vec<String> {
    stack
        .template()
        .resources_of_type(ROUTE_RESOURCE_TYPE)
        .filter(|(_, route)| {
            route.property("AuthorizationType").and_then(Value::as_str)
                != Some(AuthorizationType::AwsIam.as_str())
        })
        .map(|(logical_id, route)| {
            route
                .property("RouteKey")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| logical_id.clone())
        })
        .collect()
}

fn default_stage_url() -> Value {
    join(
        "",
        vec![
            json!("https://"),
            reference(HTTP_API_LOGICAL_ID),
            json!(".execute-api."),
            reference(intrinsic::AWS_REGION),
            json!("."),
            reference(intrinsic::AWS_URL_SUFFIX),
            json!("/"),
        ],
    )
}

fn publish_parameter(
    stack: &mut Stack,
    registry: &mut ParameterRegistry,
    logical_id: &str,
    key: &str,
    value: Value,
    description: &str,
) -> Result<()> {
    stack.add_resource(
        logical_id,
        Resource::new(
            "AWS::SSM::Parameter",
            json!({
                "Name": key,
                "Type": "String",
                "Value": value,
                "Description": description,
            }),
        ),
    )?;
    registry.publish(stack.name(), key, value)
}

fn declare_compute_unit(
    stack: &mut Stack,
    unit: &ComputeUnit,
    table_name: &str,
    table_arns: &[String],
) -> Result<RouteBinding> {
    let function_id = unit.function_name;
    let role_id = format!("{function_id}ServiceRole");
    let policy_id = format!("{role_id}DefaultPolicy");
    let integration_id = format!("{function_id}Integration");
    let permission_id = format!("{function_id}InvokePermission");
    let route_id = format!("{function_id}Route");

    stack.add_resource(
        role_id.clone(),
        Resource::new(
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": "lambda.amazonaws.com" },
                        "Action": "sts:AssumeRole"
                    }]
                },
                "ManagedPolicyArns": [join("", vec![
                    json!("arn:"),
                    reference(intrinsic::AWS_PARTITION),
                    json!(":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
                ])]
            }),
        ),
    )?;

    let actions: Vec<&str> = unit
        .actions
        .iter()
        .map(|action| action.iam_action())
        .collect();
    stack.add_resource(
        policy_id.clone(),
        Resource::new(
            "AWS::IAM::Policy",
            json!({
                "PolicyName": policy_id,
                "Roles": [reference(&role_id)],
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": actions,
                        "Resource": table_arns,
                    }]
                }
            }),
        ),
    )?;

    stack.add_resource(
        function_id,
        Resource::new(
            "AWS::Lambda::Function",
            json!({
                "FunctionName": unit.function_name,
                "Runtime": LAMBDA_RUNTIME,
                "Handler": LAMBDA_HANDLER,
                "Code": format!("assets/{}.zip", unit.asset),
                "Role": get_att(&role_id, "Arn"),
                "Layers": [reference(LAYER_LOGICAL_ID)],
                "Environment": { "Variables": { "TABLE_NAME": table_name } },
            }),
        )
        .depends_on(policy_id.clone())
        .depends_on(role_id.clone()),
    )?;

    stack.add_resource(
        permission_id,
        Resource::new(
            "AWS::Lambda::Permission",
            json!({
                "Action": "lambda:InvokeFunction",
                "FunctionName": get_att(function_id, "Arn"),
                "Principal": "apigateway.amazonaws.com",
                "SourceArn": join("", vec![
                    json!("arn:"),
                    reference(intrinsic::AWS_PARTITION),
                    json!(":execute-api:"),
                    reference(intrinsic::AWS_REGION),
                    json!(":"),
                    reference(intrinsic::AWS_ACCOUNT_ID),
                    json!(":"),
                    reference(HTTP_API_LOGICAL_ID),
                    json!(format!("/*/*{}", unit.path)),
                ]),
            }),
        ),
    )?;

    stack.add_resource(
        integration_id.clone(),
        Resource::new(
            "AWS::ApiGatewayV2::Integration",
            json!({
                "ApiId": reference(HTTP_API_LOGICAL_ID),
                "IntegrationType": "AWS_PROXY",
                "IntegrationUri": get_att(function_id, "Arn"),
                "PayloadFormatVersion": "2.0",
            }),
        ),
    )?;

    let binding = RouteBinding {
        path: unit.path.to_string(),
        method: unit.method,
        function_name: unit.function_name.to_string(),
        route_logical_id: route_id.clone(),
        actions: unit.actions.to_vec(),
        authorization: AuthorizationType::None,
    };
    stack.add_resource(
        route_id,
        Resource::new(
            ROUTE_RESOURCE_TYPE,
            json!({
                "ApiId": reference(HTTP_API_LOGICAL_ID),
                "RouteKey": binding.route_key(),
                "AuthorizationType": binding.authorization.as_str(),
                "Target": join("", vec![json!("integrations/"), reference(&integration_id)]),
            }),
        ),
    )?;

    Ok(binding)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;

    use super::*;
    use crate::config::DeployEnv;

    struct Fixture {
        stack: Stack,
        registry: ParameterRegistry,
        declaration: ApiDeclaration,
        _dirs: (tempfile::TempDir, tempfile::TempDir),
    }

    fn declare() -> Fixture {
        let layer_root = tempfile::tempdir().expect("tempdir");
        let out = tempfile::tempdir().expect("tempdir");
        let layer_source = layer_root.path().join("utils");
        fs::create_dir_all(&layer_source).expect("layer dir");
        fs::write(layer_source.join("attributes.json"), "[]").expect("layer file");

        let mut stack = Stack::new("ApiStack", "API Stack", DeployEnv::new("123", "us-east-1"));
        let mut registry = ParameterRegistry::new();
        let declaration = declare_api(
            &mut stack,
            &mut registry,
            &ApiProps {
                api_name: "app_name_api".to_string(),
                api_description: None,
                table_name: "app_name_table".to_string(),
                layer_source,
                assembly_root: out.path().to_path_buf(),
            },
        )
        .expect("api should declare");

        Fixture {
            stack,
            registry,
            declaration,
            _dirs: (layer_root, out),
        }
    }

    fn policy_actions(stack: &Stack, function_name: &str) -> BTreeSet<String> {
        let policy = stack
            .resource(&format!("{function_name}ServiceRoleDefaultPolicy"))
            .expect("policy resource");
        policy.properties["PolicyDocument"]["Statement"][0]["Action"]
            .as_array()
            .expect("action list")
            .iter()
            .map(|action| action.as_str().expect("action string").to_string())
            .collect()
    }

    #[test]
    fn declares_exactly_four_routes() {
        let fixture = declare();
        let keys: Vec<String> = fixture
            .declaration
            .routes
            .iter()
            .map(RouteBinding::route_key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "POST /item",
                "PATCH /item",
                "GET /item/{album_name}",
                "DELETE /item/{album_name}",
            ]
        );
        let functions: BTreeSet<&str> = fixture
            .declaration
            .routes
            .iter()
            .map(|route| route.function_name.as_str())
            .collect();
        assert_eq!(functions.len(), 4);
    }

    #[test]
    fn each_route_grants_only_the_actions_it_needs() {
        let fixture = declare();
        let all: BTreeSet<&str> = [
            "dynamodb:PutItem",
            "dynamodb:UpdateItem",
            "dynamodb:GetItem",
            "dynamodb:Query",
            "dynamodb:DeleteItem",
        ]
        .into_iter()
        .collect();

        let expected: [(&str, &[&str]); 4] = [
            ("CreateItemLambda", &["dynamodb:PutItem"]),
            ("UpdateItemLambda", &["dynamodb:UpdateItem"]),
            ("GetItemLambda", &["dynamodb:GetItem", "dynamodb:Query"]),
            ("DeleteItemLambda", &["dynamodb:DeleteItem"]),
        ];
        for (function_name, actions) in expected {
            let granted = policy_actions(&fixture.stack, function_name);
            let expected: BTreeSet<String> = actions.iter().map(|a| a.to_string()).collect();
            assert_eq!(granted, expected, "{function_name}");
            assert!(granted.len() < all.len());
            assert!(granted.iter().all(|action| all.contains(action.as_str())));
        }
    }

    #[test]
    fn grants_are_scoped_to_table_and_indexes() {
        let fixture = declare();
        let policy = fixture
            .stack
            .resource("GetItemLambdaServiceRoleDefaultPolicy")
            .expect("policy");
        assert_eq!(
            policy.properties["PolicyDocument"]["Statement"][0]["Resource"],
            json!([
                "arn:aws:dynamodb:us-east-1:123:table/app_name_table",
                "arn:aws:dynamodb:us-east-1:123:table/app_name_table/index/*"
            ])
        );
    }

    #[test]
    fn every_route_is_patched_to_signed_requests() {
        let fixture = declare();
        assert!(fixture
            .declaration
            .routes
            .iter()
            .all(|route| route.authorization == AuthorizationType::AwsIam));
        assert!(unsigned_routes(&fixture.stack).is_empty());
        for route in &fixture.declaration.routes {
            let resource = fixture
                .stack
                .resource(&route.route_logical_id)
                .expect("route resource");
            assert_eq!(resource.properties["AuthorizationType"], "AWS_IAM");
        }
    }

    #[test]
    fn unpatched_routes_are_detected() {
        let mut fixture = declare();
        fixture
            .stack
            .resource_mut("GetItemLambdaRoute")
            .expect("route")
            .set_property("AuthorizationType", json!("NONE"));

        assert_eq!(
            unsigned_routes(&fixture.stack),
            vec!["GET /item/{album_name}"]
        );
    }

    #[test]
    fn bindings_without_a_route_resource_are_rejected() {
        let mut fixture = declare();
        let mut routes = vec![RouteBinding {
            path: "/item".to_string(),
            method: HttpMethod::Post,
            function_name: "CreateItemLambda".to_string(),
            route_logical_id: "MissingRoute".to_string(),
            actions: vec![TableAction::PutItem],
            authorization: AuthorizationType::None,
        }];

        let error = enforce_signed_requests(&mut fixture.stack, &mut routes)
            .expect_err("missing route resource");
        assert!(matches!(
            error,
            SynthError::UnsignedRoute { ref route_key, .. } if route_key == "POST /item"
        ));
        assert_eq!(routes[0].authorization, AuthorizationType::None);
    }

    #[test]
    fn invoke_permissions_are_scoped_to_route_paths() {
        let fixture = declare();
        let expected = [
            ("CreateItemLambda", "/*/*/item"),
            ("UpdateItemLambda", "/*/*/item"),
            ("GetItemLambda", "/*/*/item/{album_name}"),
            ("DeleteItemLambda", "/*/*/item/{album_name}"),
        ];
        for (function_name, path_suffix) in expected {
            let permission = fixture
                .stack
                .resource(&format!("{function_name}InvokePermission"))
                .expect("permission resource");
            assert_eq!(permission.resource_type, "AWS::Lambda::Permission");
            assert_eq!(permission.properties["Action"], "lambda:InvokeFunction");
            assert_eq!(
                permission.properties["Principal"],
                "apigateway.amazonaws.com"
            );
            assert_eq!(
                permission.properties["FunctionName"],
                get_att(function_name, "Arn")
            );

            let source_arn = &permission.properties["SourceArn"]["Fn::Join"];
            assert_eq!(source_arn[0], "");
            let parts = source_arn[1].as_array().expect("join parts");
            assert_eq!(parts[2], ":execute-api:");
            assert_eq!(parts[7], reference(HTTP_API_LOGICAL_ID));
            assert_eq!(parts.last(), Some(&json!(path_suffix)));
        }
    }

    #[test]
    fn api_url_joins_default_stage_endpoint() {
        let fixture = declare();
        let url = &fixture
            .registry
            .get("/app_name_api/API_URL")
            .expect("url")
            .value;
        assert_eq!(
            url,
            &json!({
                "Fn::Join": ["", [
                    "https://",
                    { "Ref": HTTP_API_LOGICAL_ID },
                    ".execute-api.",
                    { "Ref": "AWS::Region" },
                    ".",
                    { "Ref": "AWS::URLSuffix" },
                    "/"
                ]]
            })
        );
        let parameter = fixture
            .stack
            .resource(URL_PARAMETER_LOGICAL_ID)
            .expect("url parameter resource");
        assert_eq!(&parameter.properties["Value"], url);
    }

    #[test]
    fn publishes_url_and_id_parameters() {
        let fixture = declare();
        let keys: Vec<&String> = fixture.registry.keys().collect();
        assert_eq!(keys, vec!["/app_name_api/API_ID", "/app_name_api/API_URL"]);

        for key in keys {
            let parameter = fixture.registry.get(key).expect("parameter");
            assert_eq!(parameter.publisher, "ApiStack");
            assert!(!parameter.value.is_null());
            assert_ne!(parameter.value, json!(""));
        }
        assert_eq!(
            fixture
                .registry
                .get("/app_name_api/API_ID")
                .expect("id")
                .value,
            json!({ "Ref": HTTP_API_LOGICAL_ID })
        );
    }

    #[test]
    fn attaches_shared_layer_to_every_function() {
        let fixture = declare();
        let functions: Vec<_> = fixture
            .stack
            .template()
            .resources_of_type("AWS::Lambda::Function")
            .collect();
        assert_eq!(functions.len(), 4);
        for (_, function) in functions {
            assert_eq!(
                function.properties["Layers"],
                json!([{ "Ref": LAYER_LOGICAL_ID }])
            );
            assert_eq!(
                function.properties["Environment"]["Variables"]["TABLE_NAME"],
                "app_name_table"
            );
        }
        assert_eq!(fixture.declaration.layer.file_count, 1);
    }

    #[test]
    fn function_code_points_at_packaged_assets() {
        let fixture = declare();
        let codes: BTreeSet<String> = fixture
            .stack
            .template()
            .resources_of_type("AWS::Lambda::Function")
            .filter_map(|(_, function)| function.properties["Code"].as_str())
            .map(str::to_string)
            .collect();
        let expected: BTreeSet<String> = compute_unit_assets()
            .map(|asset| format!("assets/{asset}.zip"))
            .collect();
        assert_eq!(codes, expected);
        assert_eq!(
            compute_unit_assets().collect::<Vec<_>>(),
            vec!["create_item", "update_item", "get_item", "delete_item"]
        );
    }

    #[test]
    fn default_stage_is_auto_deployed() {
        let fixture = declare();
        let stage = fixture
            .stack
            .resource(DEFAULT_STAGE_LOGICAL_ID)
            .expect("stage");
        assert_eq!(stage.properties["StageName"], "$default");
        assert_eq!(stage.properties["AutoDeploy"], true);
    }
}
