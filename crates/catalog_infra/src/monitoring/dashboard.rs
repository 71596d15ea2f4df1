use serde_json::{json, Value};

use super::metrics::MetricSpec;
use crate::intrinsic::{embed_tokens, token};

pub const GRID_COLUMNS: u32 = 24;
pub const DEFAULT_WIDGET_WIDTH: u32 = 6;
pub const DEFAULT_WIDGET_HEIGHT: u32 = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphWidget {
    pub title: String,
    pub left: Vec<MetricSpec>,
    pub width: u32,
    pub height: u32,
    pub stacked: bool,
}

impl GraphWidget {
    pub fn new(title: &str, left: Vec<MetricSpec>) -> Self {
        Self {
            title: title.to_string(),
            left,
            width: DEFAULT_WIDGET_WIDTH,
            height: DEFAULT_WIDGET_HEIGHT,
            stacked: false,
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width.min(GRID_COLUMNS);
        self
    }

    pub fn stacked(mut self) -> Self {
        self.stacked = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
}

/// Place widgets left to right, wrapping onto a new line whenever the next
/// widget would overflow the grid.
pub fn layout(widgets: &[GraphWidget]) -> Vec<Placement> {
    let mut placements = Vec::with_capacity(widgets.len());
    let (mut x, mut y, mut line_height) = (0, 0, 0);
    for widget in widgets {
        if x > 0 && x + widget.width > GRID_COLUMNS {
            x = 0;
            y += line_height;
            line_height = 0;
        }
        placements.push(Placement { x, y });
        x += widget.width;
        line_height = line_height.max(widget.height);
    }
    placements
}

/// Render the dashboard body.
///
/// Dimension values that are deploy-time intrinsics cannot appear in the
/// JSON text directly; they are written as placeholders and the result is an
/// `Fn::Join` splicing the intrinsics back in.
pub fn render_body(widgets: &[GraphWidget], region: &str) -> serde_json::Result<Value> {
    let mut tokens: Vec<(String, Value)> = Vec::new();
    let mut placeholder_for = |value: &Value| -> Value {
        if let Value::String(text) = value {
            return Value::String(text.clone());
        }
        let index = match tokens.iter().position(|(_, known)| known == value) {
            Some(index) => index,
            None => {
                tokens.push((format!("Dimension{}", tokens.len()), value.clone()));
                tokens.len() - 1
            }
        };
        Value::String(token(&tokens[index].0))
    };

    let placements = layout(widgets);
    let mut rendered = Vec::with_capacity(widgets.len());
    for (widget, placement) in widgets.iter().zip(placements) {
        let metrics: Vec<Value> = widget
            .left
            .iter()
            .map(|metric| {
                let mut row = vec![json!(metric.namespace), json!(metric.metric_name)];
                for (name, value) in &metric.dimensions {
                    row.push(json!(name));
                    row.push(placeholder_for(value));
                }
                row.push(json!({
                    "label": metric.label,
                    "period": metric.period_seconds,
                    "stat": metric.statistic.as_stat(),
                }));
                Value::Array(row)
            })
            .collect();

        rendered.push(json!({
            "type": "metric",
            "width": widget.width,
            "height": widget.height,
            "x": placement.x,
            "y": placement.y,
            "properties": {
                "view": "timeSeries",
                "title": widget.title,
                "region": region,
                "stacked": widget.stacked,
                "metrics": metrics,
                "yAxis": {},
            }
        }));
    }

    let body = serde_json::to_string(&json!({ "widgets": rendered }))?;
    let tokens: Vec<(&str, Value)> = tokens
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();
    Ok(embed_tokens(&body, &tokens))
}
