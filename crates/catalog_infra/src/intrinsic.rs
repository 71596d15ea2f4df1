//! CloudFormation intrinsic functions and deploy-time tokens.
//!
//! Values that only exist once the engine deploys a stack (an API id, a role
//! ARN) are represented as intrinsic JSON objects. When such a value has to be
//! spliced into a plain string, such as a dashboard body, the string is built
//! with placeholder tokens and rendered with [`embed_tokens`].

use serde_json::{json, Value};

pub const AWS_REGION: &str = "AWS::Region";
pub const AWS_ACCOUNT_ID: &str = "AWS::AccountId";
pub const AWS_PARTITION: &str = "AWS::Partition";
pub const AWS_URL_SUFFIX: &str = "AWS::URLSuffix";

pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(separator: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [separator, parts] })
}

/// Placeholder text standing in for a deploy-time value inside a string.
pub fn token(name: &str) -> String {
    format!("${{Token[{name}]}}")
}

/// Render `text` as an `Fn::Join` in which every placeholder produced by
/// [`token`] is replaced by its intrinsic value.
///
/// Returns a plain string value when `text` contains no placeholder.
pub fn embed_tokens(text: &str, tokens: &[(&str, Value)]) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    'scan: while !rest.is_empty() {
        for (name, value) in tokens {
            let placeholder = token(name);
            if let Some(tail) = rest.strip_prefix(placeholder.as_str()) {
                if !literal.is_empty() {
                    parts.push(Value::String(std::mem::take(&mut literal)));
                }
                parts.push(value.clone());
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(next) = chars.next() {
            literal.push(next);
        }
        rest = chars.as_str();
    }

    if !literal.is_empty() {
        parts.push(Value::String(literal));
    }

    match parts.as_slice() {
        [] => Value::String(String::new()),
        [Value::String(only)] => Value::String(only.clone()),
        _ => join("", parts),
    }
}
