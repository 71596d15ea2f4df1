use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use catalog_infra::app::{API_STACK, MONITORING_STACK, PIPELINE_STACK, TABLE_STACK};
use catalog_infra::{compose, AppSettings, Assembly, DeployEnv, Manifest, RepositorySettings};
use serde_json::{json, Value};

fn settings() -> AppSettings {
    AppSettings::new(
        DeployEnv::new("123456789012", "eu-west-1"),
        RepositorySettings::new("acme", "album-catalog"),
    )
}

fn layer_dir(root: &Path) -> PathBuf {
    let layer = root.join("utils");
    fs::create_dir_all(layer.join("nested")).expect("create layer dir");
    fs::write(
        layer.join("attributes.json"),
        r#"{"artist_name":"ArtistName"}"#,
    )
    .expect("write layer file");
    fs::write(layer.join("nested").join("README"), "shared helpers").expect("write layer file");
    layer
}

fn read_template(assembly: &Assembly, stack: &str) -> Value {
    let text = fs::read_to_string(assembly.template_path(stack)).expect("template should exist");
    serde_json::from_str(&text).expect("template should be JSON")
}

fn resources_of_type<'a>(
    template: &'a Value,
    resource_type: &'a str,
) -> Vec<(&'a String, &'a Value)> {
    template["Resources"]
        .as_object()
        .expect("resources object")
        .iter()
        .filter(|(_, resource)| resource["Type"] == resource_type)
        .collect()
}

struct Synthesized {
    _dir: tempfile::TempDir,
    assembly: Assembly,
}

fn synthesize() -> Synthesized {
    let dir = tempfile::tempdir().expect("tempdir");
    let layer = layer_dir(dir.path());
    let out = dir.path().join("cdk.out");
    let app = compose(&settings(), &layer, &out).expect("compose");
    let assembly = app.synth(&out).expect("synth");
    Synthesized {
        _dir: dir,
        assembly,
    }
}

#[test]
fn writes_a_template_per_stack_and_a_manifest() {
    let synthesized = synthesize();
    for stack in [TABLE_STACK, API_STACK, MONITORING_STACK, PIPELINE_STACK] {
        let template = read_template(&synthesized.assembly, stack);
        assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    }

    let manifest: Manifest = serde_json::from_str(
        &fs::read_to_string(synthesized.assembly.out_dir.join("manifest.json"))
            .expect("manifest"),
    )
    .expect("manifest JSON");
    assert_eq!(manifest, synthesized.assembly.manifest);
    assert_eq!(manifest.stacks.len(), 4);
    let position = |name: &str| {
        manifest
            .deploy_order
            .iter()
            .position(|stack| stack == name)
            .expect("stack in order")
    };
    assert!(position(API_STACK) < position(MONITORING_STACK));
    let monitoring = manifest
        .stacks
        .iter()
        .find(|stack| stack.name == MONITORING_STACK)
        .expect("monitoring entry");
    assert_eq!(monitoring.dependencies, vec![API_STACK.to_string()]);
    assert_eq!(monitoring.env.region, "eu-west-1");
}

#[test]
fn every_route_is_signed_and_bound_to_one_function() {
    let synthesized = synthesize();
    let template = read_template(&synthesized.assembly, API_STACK);

    let routes = resources_of_type(&template, "AWS::ApiGatewayV2::Route");
    let keys: BTreeSet<&str> = routes
        .iter()
        .map(|(_, route)| route["Properties"]["RouteKey"].as_str().expect("route key"))
        .collect();
    assert_eq!(
        keys,
        BTreeSet::from([
            "POST /item",
            "PATCH /item",
            "GET /item/{album_name}",
            "DELETE /item/{album_name}",
        ])
    );
    for (_, route) in &routes {
        assert_eq!(route["Properties"]["AuthorizationType"], "AWS_IAM");
    }
    assert_eq!(
        resources_of_type(&template, "AWS::Lambda::Function").len(),
        4
    );
}

#[test]
fn each_function_holds_exactly_its_table_actions() {
    let synthesized = synthesize();
    let template = read_template(&synthesized.assembly, API_STACK);
    let resources = &template["Resources"];

    for (function, expected) in [
        ("CreateItemLambda", json!(["dynamodb:PutItem"])),
        ("UpdateItemLambda", json!(["dynamodb:UpdateItem"])),
        ("GetItemLambda", json!(["dynamodb:GetItem", "dynamodb:Query"])),
        ("DeleteItemLambda", json!(["dynamodb:DeleteItem"])),
    ] {
        let policy = &resources[format!("{function}ServiceRoleDefaultPolicy")];
        let statement = &policy["Properties"]["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], expected, "{function}");
        assert_eq!(
            statement["Resource"],
            json!([
                "arn:aws:dynamodb:eu-west-1:123456789012:table/app_name_table",
                "arn:aws:dynamodb:eu-west-1:123456789012:table/app_name_table/index/*",
            ])
        );
        assert_eq!(
            resources[function]["Properties"]["Environment"]["Variables"]["TABLE_NAME"],
            "app_name_table"
        );
    }
}

#[test]
fn api_publishes_url_and_id_which_monitoring_reads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layer = layer_dir(dir.path());
    let out = dir.path().join("cdk.out");
    let app = compose(&settings(), &layer, &out).expect("compose");

    let published = app.published_keys();
    assert_eq!(
        published.get(API_STACK).cloned().unwrap_or_default(),
        vec!["/app_name_api/API_ID", "/app_name_api/API_URL"]
    );
    assert_eq!(published.len(), 1);

    let assembly = app.synth(&out).expect("synth");
    let monitoring = read_template(&assembly, MONITORING_STACK);
    assert_eq!(
        monitoring["Parameters"]["ApiIdParameter"]["Default"],
        "/app_name_api/API_ID"
    );
    assert_eq!(
        monitoring["Parameters"]["ApiIdParameter"]["Type"],
        "AWS::SSM::Parameter::Value<String>"
    );
}

#[test]
fn alarms_share_a_single_topic() {
    let synthesized = synthesize();
    let template = read_template(&synthesized.assembly, MONITORING_STACK);

    let topics = resources_of_type(&template, "AWS::SNS::Topic");
    assert_eq!(topics.len(), 1);
    let topic_ref = json!([{ "Ref": topics[0].0 }]);

    let alarms = resources_of_type(&template, "AWS::CloudWatch::Alarm");
    assert_eq!(alarms.len(), 5);
    for (_, alarm) in alarms {
        assert_eq!(alarm["Properties"]["AlarmActions"], topic_ref);
        assert_eq!(alarm["Properties"]["EvaluationPeriods"], 5);
        assert_eq!(alarm["Properties"]["DatapointsToAlarm"], 1);
    }
}

#[test]
fn dashboard_is_named_after_the_app() {
    let synthesized = synthesize();
    let template = read_template(&synthesized.assembly, MONITORING_STACK);
    let dashboards = resources_of_type(&template, "AWS::CloudWatch::Dashboard");
    assert_eq!(dashboards.len(), 1);
    assert_eq!(
        dashboards[0].1["Properties"]["DashboardName"],
        "app_name_api-Dashboard"
    );
}

#[test]
fn layer_is_staged_with_its_whole_tree() {
    let synthesized = synthesize();
    let staged = synthesized
        .assembly
        .out_dir
        .join("assets/utils_layer/utils");
    assert!(staged.join("attributes.json").is_file());
    assert!(staged.join("nested/README").is_file());

    let template = read_template(&synthesized.assembly, API_STACK);
    let layer = &template["Resources"]["LambdaUtilsLayer"];
    assert_eq!(layer["Properties"]["Content"], "assets/utils_layer");
    assert_eq!(
        layer["Metadata"]["aws:asset:hash"].as_str().map(str::len),
        Some(64)
    );
}

#[test]
fn pipeline_deploys_then_tests_from_main() {
    let synthesized = synthesize();
    let template = read_template(&synthesized.assembly, PIPELINE_STACK);
    let stages = &template["Resources"]["Pipeline"]["Properties"]["Stages"];

    assert_eq!(stages[0]["Name"], "Source");
    assert_eq!(
        stages[0]["Actions"][0]["Configuration"]["BranchName"],
        "main"
    );
    assert_eq!(
        stages[0]["Actions"][0]["Configuration"]["FullRepositoryId"],
        "acme/album-catalog"
    );

    let deploy_app = &stages[1];
    assert_eq!(deploy_app["Name"], "DeployApp");
    let deploy = &deploy_app["Actions"][0];
    let tests = &deploy_app["Actions"][1];
    assert_eq!(deploy["Name"], "DeployStacks");
    assert_eq!(tests["Name"], "RunIntegrationTests");
    assert!(deploy["RunOrder"].as_u64() < tests["RunOrder"].as_u64());
    assert_eq!(
        template["Parameters"]["GithubConnectionArn"]["Default"],
        "Github-Connection"
    );
}

#[test]
fn resynthesizing_replaces_stale_layer_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layer = layer_dir(dir.path());
    let out = dir.path().join("cdk.out");

    compose(&settings(), &layer, &out)
        .expect("compose")
        .synth(&out)
        .expect("synth");
    fs::remove_file(layer.join("nested/README")).expect("remove layer file");
    compose(&settings(), &layer, &out)
        .expect("compose")
        .synth(&out)
        .expect("synth");

    assert!(!out.join("assets/utils_layer/utils/nested/README").exists());
}
