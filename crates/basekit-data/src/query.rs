//! Query descriptor encoding
//!
//! Filters render as `column=op.value`, columns as `select=a,b`, ordering as
//! `order=a.asc,b.desc`, pagination as `limit`/`offset`.

use basekit_core::{Direction, FilterOp, QueryDescriptor};
use serde_json::Value;

/// Render a descriptor as query string pairs, in a stable order
pub fn encode_query(query: &QueryDescriptor) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    if !query.selected_columns().is_empty() {
        pairs.push(("select".to_string(), query.selected_columns().join(",")));
    }

    for filter in query.filters() {
        let value = match filter.op {
            FilterOp::In => render_list(&filter.value),
            _ => render_scalar(&filter.value),
        };
        pairs.push((filter.column.clone(), format!("{}.{}", filter.op.as_str(), value)));
    }

    if !query.ordering().is_empty() {
        let order = query
            .ordering()
            .iter()
            .map(|o| {
                let direction = match o.direction {
                    Direction::Ascending => "asc",
                    Direction::Descending => "desc",
                };
                format!("{}.{}", o.column, direction)
            })
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".to_string(), order));
    }

    if let Some(limit) = query.limit_value() {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset_value() {
        pairs.push(("offset".to_string(), offset.to_string()));
    }

    pairs
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_list(value: &Value) -> String {
    let items = match value {
        Value::Array(items) => items.iter().map(render_list_item).collect::<Vec<_>>(),
        other => vec![render_list_item(other)],
    };
    format!("({})", items.join(","))
}

// Items containing list syntax are double-quoted
fn render_list_item(value: &Value) -> String {
    let raw = render_scalar(value);
    if raw.contains([',', '(', ')', '"']) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw
    }
}
