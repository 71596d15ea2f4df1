use crate::config::DeployEnv;

pub const API_URL_SUFFIX: &str = "API_URL";
pub const API_ID_SUFFIX: &str = "API_ID";

pub fn parameter_key(app_name: &str, suffix: &str) -> String {
    format!("/{}/{suffix}", app_name.trim_matches('/'))
}

pub fn api_url_parameter_key(app_name: &str) -> String {
    parameter_key(app_name, API_URL_SUFFIX)
}

pub fn api_id_parameter_key(app_name: &str) -> String {
    parameter_key(app_name, API_ID_SUFFIX)
}

pub fn dashboard_name(app_name: &str) -> String {
    format!("{app_name}-Dashboard")
}

/// ARNs covering a table and all of its indexes.
pub fn table_resource_arns(env: &DeployEnv, table_name: &str) -> Vec<String> {
    let table_arn = format!(
        "arn:aws:dynamodb:{}:{}:table/{table_name}",
        env.region, env.account
    );
    vec![table_arn.clone(), format!("{table_arn}/index/*")]
}

/// Turn an arbitrary label into a CloudFormation logical id.
pub fn logical_id(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_parameter_keys_under_app_namespace() {
        assert_eq!(
            api_url_parameter_key("app_name_api"),
            "/app_name_api/API_URL"
        );
        assert_eq!(
            api_id_parameter_key("/app_name_api/"),
            "/app_name_api/API_ID"
        );
    }

    #[test]
    fn builds_dashboard_name() {
        assert_eq!(dashboard_name("app_name_api"), "app_name_api-Dashboard");
    }

    #[test]
    fn table_arns_cover_indexes() {
        let arns = table_resource_arns(&DeployEnv::new("111122223333", "eu-west-1"), "albums");
        assert_eq!(
            arns,
            vec![
                "arn:aws:dynamodb:eu-west-1:111122223333:table/albums".to_string(),
                "arn:aws:dynamodb:eu-west-1:111122223333:table/albums/index/*".to_string(),
            ]
        );
    }

    #[test]
    fn logical_ids_drop_punctuation() {
        assert_eq!(
            logical_id("API Gateway 4XX Errors > 1%"),
            "APIGateway4XXErrors1"
        );
        assert_eq!(logical_id("DynamoDB Errors"), "DynamoDBErrors");
    }
}
