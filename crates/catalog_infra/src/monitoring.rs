//! Metrics, alarms and the dashboard watching the HTTP API and its table.
//!
//! The API id is not handed over from the Api declaration; it is read back
//! from the published `/{app}/API_ID` parameter, so the Monitoring stack has
//! to be ordered after the Api stack explicitly.

mod dashboard;
mod expression;
mod metrics;

use serde_json::{json, Value};
use tracing::info;

pub use dashboard::{layout, GraphWidget, Placement};
pub use metrics::{MathExpression, MetricSpec, Statistic};

use crate::error::Result;
use crate::intrinsic::reference;
use crate::naming::{api_id_parameter_key, dashboard_name, logical_id};
use crate::registry::ParameterRegistry;
use crate::stack::Stack;
use crate::template::Resource;

pub const ALARM_TOPIC_LOGICAL_ID: &str = "AlarmTopic";
pub const DASHBOARD_LOGICAL_ID: &str = "ApiDashboard";
pub const API_ID_PARAMETER_LOGICAL_ID: &str = "ApiIdParameter";

const API_NAMESPACE: &str = "AWS/ApiGateway";
const TABLE_NAMESPACE: &str = "AWS/DynamoDB";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
}

impl ComparisonOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThanThreshold => "GreaterThanThreshold",
            Self::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
        }
    }

    pub fn breached(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThanThreshold => value > threshold,
            Self::GreaterThanOrEqualToThreshold => value >= threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlarmMetric {
    Metric(MetricSpec),
    Expression(MathExpression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmSpec {
    pub title: String,
    pub metric: AlarmMetric,
    pub threshold: f64,
    pub comparison: ComparisonOperator,
    pub evaluation_periods: u32,
    pub datapoints_to_alarm: u32,
    /// Logical id of the notification topic.
    pub action: String,
}

impl AlarmSpec {
    fn new(
        title: &str,
        metric: AlarmMetric,
        comparison: ComparisonOperator,
        threshold: f64,
    ) -> Self {
        Self {
            title: title.to_string(),
            metric,
            threshold,
            comparison,
            evaluation_periods: 5,
            datapoints_to_alarm: 1,
            action: ALARM_TOPIC_LOGICAL_ID.to_string(),
        }
    }

    pub fn logical_id(&self) -> String {
        logical_id(&self.title)
    }

    fn resource(&self) -> Resource {
        let mut properties = match &self.metric {
            AlarmMetric::Metric(metric) => metric.alarm_properties(),
            AlarmMetric::Expression(expression) => expression.alarm_properties(),
        };
        properties["AlarmDescription"] = json!(self.title);
        properties["ComparisonOperator"] = json!(self.comparison.as_str());
        properties["Threshold"] = json!(self.threshold);
        properties["EvaluationPeriods"] = json!(self.evaluation_periods);
        properties["DatapointsToAlarm"] = json!(self.datapoints_to_alarm);
        properties["AlarmActions"] = json!([reference(&self.action)]);
        Resource::new("AWS::CloudWatch::Alarm", properties)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringProps {
    pub api_name: String,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringDeclaration {
    pub topic_logical_id: String,
    pub alarms: Vec<AlarmSpec>,
    pub widgets: Vec<GraphWidget>,
    pub dashboard_name: String,
    pub throttles: MathExpression,
    pub errors: MathExpression,
    pub client_error_rate: MathExpression,
}

pub fn declare_monitoring(
    stack: &mut Stack,
    registry: &mut ParameterRegistry,
    props: &MonitoringProps,
) -> Result<MonitoringDeclaration> {
    let api_id = registry.read_published(
        stack,
        &api_id_parameter_key(&props.api_name),
        API_ID_PARAMETER_LOGICAL_ID,
    )?;
    let api_metric = |name: &str, label: &str| {
        MetricSpec::new(API_NAMESPACE, name, ("ApiId", api_id.clone()), label)
    };
    let table_metric = |name: &str, label: &str| {
        MetricSpec::new(
            TABLE_NAMESPACE,
            name,
            ("TableName", Value::String(props.table_name.clone())),
            label,
        )
    };

    let requests = api_metric("Count", "# Requests");
    let client_errors = api_metric("4XXError", "4XX Errors");
    let server_errors = api_metric("5XXError", "5XX Errors");
    let latency = |percentile| {
        api_metric("Latency", "API GW Latency").with_statistic(Statistic::Percentile(percentile))
    };
    let latency_p50 = latency(50);
    let latency_p90 = latency(90);
    // TODO(monitoring): the p99 series is bound to the p90 statistic, so the
    // p99 latency alarm actually watches p90. Confirm intent before switching
    // it to Percentile(99).
    let latency_p99 = latency(90);

    let client_error_rate = MathExpression::new(
        "m1/m2*100",
        "% API Gateway 4xx Errors",
        [("m1", client_errors.clone()), ("m2", requests.clone())],
        Some(180),
    )?;

    let write_throttles = table_metric("WriteThrottleEvents", "DynamoDB Write Throttles");
    let read_throttles = table_metric("ReadThrottleEvents", "DynamoDB Read Throttles");
    let throttles = MathExpression::new(
        "m1 + m2",
        "DynamoDB Throttles",
        [
            ("m1", write_throttles.clone()),
            ("m2", read_throttles.clone()),
        ],
        Some(180),
    )?;
    let errors = MathExpression::new(
        "m1 + m2",
        "DynamoDB Errors",
        [
            ("m1", table_metric("UserErrors", "DynamoDB User Errors")),
            ("m2", table_metric("SystemErrors", "DynamoDB System Errors")),
        ],
        None,
    )?;
    let consumed_read = table_metric(
        "ConsumedReadCapacityUnits",
        "DynamoDB Consumed Read Capacity Units",
    );
    let consumed_write = table_metric(
        "ConsumedWriteCapacityUnits",
        "DynamoDB Consumed Write Capacity Units",
    );

    stack.add_resource(
        ALARM_TOPIC_LOGICAL_ID,
        Resource::new("AWS::SNS::Topic", json!({})),
    )?;

    use ComparisonOperator::{GreaterThanOrEqualToThreshold, GreaterThanThreshold};
    let alarms = vec![
        AlarmSpec::new(
            "API Gateway 4XX Errors > 1%",
            AlarmMetric::Expression(client_error_rate.clone()),
            GreaterThanThreshold,
            1.0,
        ),
        AlarmSpec::new(
            "API Gateway 5XX Errors > 0",
            AlarmMetric::Metric(server_errors.clone()),
            GreaterThanThreshold,
            0.0,
        ),
        AlarmSpec::new(
            "API p99 latency alarm >= 1s",
            AlarmMetric::Metric(latency_p99.clone()),
            GreaterThanOrEqualToThreshold,
            1000.0,
        ),
        AlarmSpec::new(
            "DynamoDB Table Reads/Writes Throttled",
            AlarmMetric::Expression(throttles.clone()),
            GreaterThanThreshold,
            0.0,
        ),
        AlarmSpec::new(
            "DynamoDB Errors",
            AlarmMetric::Expression(errors.clone()),
            GreaterThanThreshold,
            0.0,
        ),
    ];
    for alarm in &alarms {
        stack.add_resource(alarm.logical_id(), alarm.resource())?;
    }

    let widgets = vec![
        GraphWidget::new("Requests", vec![requests]).width(8),
        GraphWidget::new("API GW Errors", vec![client_errors, server_errors]).stacked(),
        GraphWidget::new(
            "API GW Latency",
            vec![latency_p50, latency_p90, latency_p99],
        )
        .stacked(),
        GraphWidget::new("DynamoDB Throttle", vec![write_throttles, read_throttles]),
        GraphWidget::new(
            "DynamoDB Consumed Read/Write Units",
            vec![consumed_write, consumed_read],
        ),
    ];
    let dashboard_name = dashboard_name(&props.api_name);
    let region = stack.env().region.clone();
    stack.add_resource(
        DASHBOARD_LOGICAL_ID,
        Resource::new(
            "AWS::CloudWatch::Dashboard",
            json!({
                "DashboardName": dashboard_name,
                "DashboardBody": dashboard::render_body(&widgets, &region)?,
            }),
        ),
    )?;

    info!(
        stack = %stack.name(),
        alarms = alarms.len(),
        widgets = widgets.len(),
        dashboard = %dashboard_name,
        "declared monitoring"
    );

    Ok(MonitoringDeclaration {
        topic_logical_id: ALARM_TOPIC_LOGICAL_ID.to_string(),
        alarms,
        widgets,
        dashboard_name,
        throttles,
        errors,
        client_error_rate,
    })
}
