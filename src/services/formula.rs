//! 公式求值服务 - 业务能力层
//!
//! 以 `=` 开头的更新值是公式，作用于字段当前值；其他值原样写入。
//!
//! - `=+n` `=-n` `=*n` 直接做加减乘
//! - `=/n` `=%n` 在 n 为 0 时保持当前值不变
//! - 其余形式交给 [`safe_eval`]，只绑定 `current`
//!
//! 任何求值错误都退回到原始字符串本身。

use serde_json::{Number, Value as JsonValue};
use tracing::debug;

use crate::services::safe_eval::{floored_mod, safe_eval, EvalResult, FormulaError};

/// 公式前缀
pub const FORMULA_PREFIX: char = '=';

/// 计算字段的新值
///
/// # 参数
/// - `current`: 字段当前值（字段不存在时为 None）
/// - `update_value`: 用户输入的更新值
///
/// # 返回
/// 公式求值结果；非公式或求值失败时返回 `update_value` 的拷贝
pub fn apply_formula(current: Option<&JsonValue>, update_value: &JsonValue) -> JsonValue {
    let formula = match update_value.as_str() {
        Some(raw) => match raw.strip_prefix(FORMULA_PREFIX) {
            Some(formula) => formula,
            None => return update_value.clone(),
        },
        None => return update_value.clone(),
    };

    let current_val = flt(current);

    match evaluate(formula, current_val).and_then(to_json_number) {
        Ok(value) => value,
        Err(e) => {
            // 保持原样写入公式文本，不让整批失败
            debug!("公式求值失败，按字面值写入 {:?}: {}", update_value, e);
            update_value.clone()
        }
    }
}

/// 公式字符串（已去掉 `=`）在给定当前值下的结果
pub fn evaluate(formula: &str, current: f64) -> EvalResult<f64> {
    let mut chars = formula.chars();
    let operator = chars.next();
    let operand = chars.as_str();

    match operator {
        Some('+') => Ok(current + parse_flt(operand)),
        Some('-') => Ok(current - parse_flt(operand)),
        Some('*') => Ok(current * parse_flt(operand)),
        Some('/') => {
            let operand = parse_flt(operand);
            Ok(if operand != 0.0 { current / operand } else { current })
        }
        Some('%') => {
            let operand = parse_flt(operand);
            Ok(if operand != 0.0 {
                floored_mod(current, operand)
            } else {
                current
            })
        }
        _ => safe_eval(formula, current),
    }
}

/// 宽松的数值转换：空值、无法解析的值都视为 0
pub fn flt(value: Option<&JsonValue>) -> f64 {
    match value {
        Some(JsonValue::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(JsonValue::String(s)) => parse_flt(s),
        Some(JsonValue::Bool(true)) => 1.0,
        _ => 0.0,
    }
}

fn parse_flt(raw: &str) -> f64 {
    raw.trim().replace(',', "").parse().unwrap_or(0.0)
}

fn to_json_number(value: f64) -> EvalResult<JsonValue> {
    Number::from_f64(value)
        .map(JsonValue::Number)
        .ok_or(FormulaError::NonFinite)
}
