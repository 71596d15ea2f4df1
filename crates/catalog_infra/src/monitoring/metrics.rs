use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::expression;
use crate::error::{Result, SynthError};

pub const DEFAULT_METRIC_PERIOD_SECONDS: u32 = 180;
pub const DEFAULT_EXPRESSION_PERIOD_SECONDS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Sum,
    Percentile(u8),
}

impl Statistic {
    pub fn as_stat(self) -> String {
        match self {
            Self::Sum => "Sum".to_string(),
            Self::Percentile(p) => format!("p{p}"),
        }
    }
}

/// A single time series query against the monitoring backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub namespace: String,
    pub metric_name: String,
    /// Dimension values may be deploy-time intrinsics.
    pub dimensions: BTreeMap<String, Value>,
    pub label: String,
    pub statistic: Statistic,
    pub period_seconds: u32,
}

impl MetricSpec {
    pub fn new(
        namespace: &str,
        metric_name: &str,
        dimension: (&str, Value),
        label: &str,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimensions: BTreeMap::from([(dimension.0.to_string(), dimension.1)]),
            label: label.to_string(),
            statistic: Statistic::Sum,
            period_seconds: DEFAULT_METRIC_PERIOD_SECONDS,
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn cloudformation_dimensions(&self) -> Value {
        Value::Array(
            self.dimensions
                .iter()
                .map(|(name, value)| json!({ "Name": name, "Value": value }))
                .collect(),
        )
    }

    /// Alarm properties for an alarm bound directly to this metric.
    pub fn alarm_properties(&self) -> Value {
        let mut properties = json!({
            "Namespace": self.namespace,
            "MetricName": self.metric_name,
            "Dimensions": self.cloudformation_dimensions(),
            "Period": self.period_seconds,
        });
        match self.statistic {
            Statistic::Percentile(_) => {
                properties["ExtendedStatistic"] = json!(self.statistic.as_stat())
            }
            _ => properties["Statistic"] = json!(self.statistic.as_stat()),
        }
        properties
    }

    fn metric_stat(&self, id: &str, period_seconds: u32) -> Value {
        json!({
            "Id": id,
            "MetricStat": {
                "Metric": {
                    "Namespace": self.namespace,
                    "MetricName": self.metric_name,
                    "Dimensions": self.cloudformation_dimensions(),
                },
                "Period": period_seconds,
                "Stat": self.statistic.as_stat(),
            },
            "ReturnData": false,
        })
    }
}

/// Several metrics combined through an arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MathExpression {
    pub expression: String,
    pub label: String,
    pub using: BTreeMap<String, MetricSpec>,
    pub period_seconds: u32,
}

impl MathExpression {
    /// Fails when the expression does not parse or references an id that is
    /// not in `using`.
    pub fn new(
        expression: &str,
        label: &str,
        using: impl IntoIterator<Item = (&'static str, MetricSpec)>,
        period_seconds: Option<u32>,
    ) -> Result<Self> {
        let using: BTreeMap<String, MetricSpec> = using
            .into_iter()
            .map(|(id, metric)| (id.to_string(), metric))
            .collect();
        let ids = expression::referenced_ids(expression)
            .map_err(|reason| invalid(expression, reason))?;
        if let Some(missing) = ids.iter().find(|id| !using.contains_key(*id)) {
            return Err(invalid(
                expression,
                format!("metric id '{missing}' is not bound"),
            ));
        }
        Ok(Self {
            expression: expression.to_string(),
            label: label.to_string(),
            using,
            period_seconds: period_seconds.unwrap_or(DEFAULT_EXPRESSION_PERIOD_SECONDS),
        })
    }

    pub fn evaluate(&self, samples: &BTreeMap<String, f64>) -> Result<f64> {
        expression::evaluate(&self.expression, samples)
            .map_err(|reason| invalid(&self.expression, reason))
    }

    pub fn alarm_properties(&self) -> Value {
        let mut metrics = vec![json!({
            "Id": "expr_1",
            "Expression": self.expression,
            "Label": self.label,
            "ReturnData": true,
        })];
        metrics.extend(
            self.using
                .iter()
                .map(|(id, metric)| metric.metric_stat(id, self.period_seconds)),
        );
        json!({ "Metrics": metrics })
    }
}

fn invalid(expression: &str, reason: String) -> SynthError {
    SynthError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    }
}
