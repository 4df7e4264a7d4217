//! 参数绑定：把模型给出的原始参数值按工具 schema 顺序逐个消费并转换为声明类型
//!
//! 绑定按位置进行，不按名称匹配：第 i 个原始值对应 schema 中第 i 个参数。

use serde_json::{Map, Number, Value};

use crate::core::AgentError;
use crate::react::contract::Parameters;
use crate::tools::{ParamType, Tool};

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coercion_error(parameter: &str, expected: &str, value: &Value) -> AgentError {
    AgentError::TypeCoercionError {
        parameter: parameter.to_string(),
        expected: expected.to_string(),
        value: raw_text(value),
    }
}

fn to_integer(parameter: &str, value: &Value) -> Result<i64, AgentError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(coercion_error(parameter, "integer", value)),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| coercion_error(parameter, "integer", value)),
        _ => Err(coercion_error(parameter, "integer", value)),
    }
}

fn to_number(parameter: &str, value: &Value) -> Result<Value, AgentError> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let text = s.trim();
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Value::from(i));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| coercion_error(parameter, "number", value))
        }
        _ => Err(coercion_error(parameter, "number", value)),
    }
}

fn to_array(parameter: &str, value: &Value) -> Result<Value, AgentError> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
            let inner = inner.strip_suffix(']').unwrap_or(inner);
            if inner.trim().is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            inner
                .split(',')
                .map(|item| {
                    item.trim()
                        .parse::<i64>()
                        .map(Value::from)
                        .map_err(|_| coercion_error(parameter, "array<integer>", value))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Value::Array(items) => match items.first() {
            Some(Value::Array(nested)) => Ok(Value::Array(nested.clone())),
            _ => Ok(Value::Array(items.clone())),
        },
        other => Err(AgentError::InvalidArrayParameter {
            parameter: parameter.to_string(),
            value: raw_text(other),
        }),
    }
}

/// 把一个原始值转换为声明类型
pub fn coerce_value(parameter: &str, value: &Value, ty: &ParamType) -> Result<Value, AgentError> {
    match ty {
        ParamType::Integer => to_integer(parameter, value).map(Value::from),
        ParamType::Number => to_number(parameter, value),
        ParamType::Array => to_array(parameter, value),
        ParamType::String | ParamType::Other(_) => Ok(Value::String(raw_text(value))),
    }
}

/// 按 schema 顺序消费参数值，返回以参数名为键的有序映射
pub fn bind_arguments(tool: &Tool, parameters: &Parameters) -> Result<Map<String, Value>, AgentError> {
    let mut values = parameters.values().into_iter();
    let mut arguments = Map::new();
    for (name, ty) in tool.parameters() {
        let value = values.next().ok_or_else(|| AgentError::ParameterCountError {
            tool: tool.name.clone(),
            parameter: name.clone(),
        })?;
        let coerced = coerce_value(&name, value, &ty)?;
        arguments.insert(name, coerced);
    }
    Ok(arguments)
}
