//! Parser for the `column=op.value` wire form.

use super::{FilterError, FilterOp, FilterValue};

pub(super) fn parse_expression(expr: &str) -> Result<(String, FilterOp, FilterValue), FilterError> {
    let (column, rest) = expr
        .split_once('=')
        .ok_or_else(|| FilterError::Malformed(expr.to_string()))?;
    let (op, raw) = rest
        .split_once('.')
        .ok_or_else(|| FilterError::Malformed(expr.to_string()))?;
    let op = parse_op(op)?;
    let value = parse_value(op, raw).ok_or_else(|| FilterError::Malformed(expr.to_string()))?;
    Ok((column.to_string(), op, value))
}

pub(crate) fn parse_op(op: &str) -> Result<FilterOp, FilterError> {
    Ok(match op {
        "eq" => FilterOp::Eq,
        "neq" => FilterOp::Neq,
        "gt" => FilterOp::Gt,
        "gte" => FilterOp::Gte,
        "lt" => FilterOp::Lt,
        "lte" => FilterOp::Lte,
        "in" => FilterOp::In,
        "is" => FilterOp::Is,
        other => return Err(FilterError::UnknownOperator(other.to_string())),
    })
}

fn parse_value(op: FilterOp, raw: &str) -> Option<FilterValue> {
    match op {
        FilterOp::In => {
            let inner = raw.strip_prefix('(')?.strip_suffix(')')?;
            if inner.trim().is_empty() {
                return None;
            }
            Some(FilterValue::List(
                split_list(inner)
                    .into_iter()
                    .map(|item| parse_scalar(item.trim()))
                    .collect(),
            ))
        }
        FilterOp::Is => match raw {
            "null" => Some(FilterValue::Null),
            "true" => Some(FilterValue::Bool(true)),
            "false" => Some(FilterValue::Bool(false)),
            _ => None,
        },
        _ if raw.is_empty() => None,
        _ => Some(parse_scalar(raw)),
    }
}

/// Split list items on commas outside double quotes.
fn split_list(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);
    items
}

/// Quoted values are always `Text`. Otherwise integers become `Int`,
/// booleans `Bool`, everything else `Text`.
fn parse_scalar(raw: &str) -> FilterValue {
    if let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return FilterValue::Text(unescape(inner));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return FilterValue::Int(i);
    }
    match raw {
        "true" => FilterValue::Bool(true),
        "false" => FilterValue::Bool(false),
        _ => FilterValue::Text(raw.to_string()),
    }
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}
