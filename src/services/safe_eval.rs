//! 受限表达式求值 - 业务能力层
//!
//! 递归下降解析器，只支持四则运算、`current` 这一个绑定变量和少量白名单函数。
//! 字符串、属性访问、下标、任意其他名字都会在解析阶段被拒绝。
//!
//! 优先级（从低到高）：
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/' | '//' | '%') factor)*
//! factor  := ('+' | '-') factor | power
//! power   := primary ('**' factor)?
//! primary := NUMBER | 'current' | NAME '(' args ')' | '(' expr ')'
//! ```

use phf::phf_map;
use thiserror::Error;

/// 表达式求值结果类型
pub type EvalResult<T> = std::result::Result<T, FormulaError>;

/// 表达式解析或求值错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Name is not defined: {0}")]
    UnknownName(String),

    #[error("Function is not allowed: {0}")]
    FunctionNotAllowed(String),

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: &'static str,
        expected: &'static str,
        actual: usize,
    },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NonFinite,
}

/// 表达式中唯一可用的变量名
pub const CURRENT_BINDING: &str = "current";

const MAX_DEPTH: usize = 64;

/// 白名单函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Abs,
    Round,
    Min,
    Max,
    Int,
    Float,
}

static BUILTINS: phf::Map<&'static str, Builtin> = phf_map! {
    "abs" => Builtin::Abs,
    "round" => Builtin::Round,
    "min" => Builtin::Min,
    "max" => Builtin::Max,
    "int" => Builtin::Int,
    "float" => Builtin::Float,
    "flt" => Builtin::Float,
};

impl Builtin {
    fn name(self) -> &'static str {
        match self {
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Int => "int",
            Builtin::Float => "float",
        }
    }

    fn apply(self, args: &[f64]) -> EvalResult<f64> {
        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(FormulaError::ArgumentCount {
                    function: self.name(),
                    expected,
                    actual: args.len(),
                })
            }
        };

        match self {
            Builtin::Abs => {
                arity("1", args.len() == 1)?;
                Ok(args[0].abs())
            }
            Builtin::Int => {
                arity("1", args.len() == 1)?;
                Ok(args[0].trunc())
            }
            Builtin::Float => {
                arity("1", args.len() == 1)?;
                Ok(args[0])
            }
            Builtin::Round => {
                arity("1 or 2", matches!(args.len(), 1 | 2))?;
                let ndigits = match args.get(1) {
                    Some(n) if n.fract() != 0.0 => {
                        return Err(FormulaError::Type(
                            "round() ndigits must be an integer".to_string(),
                        ))
                    }
                    Some(n) => *n as i32,
                    None => 0,
                };
                let value = args[0];
                let scale = 10f64.powi(ndigits);
                if scale == 0.0 {
                    // 精度远小于数值本身
                    return Ok(0.0 * value);
                }
                let scaled = value * scale;
                if !scaled.is_finite() {
                    // 精度超出 f64 能表示的位数，原值已经是最接近的结果
                    return Ok(value);
                }
                Ok(scaled.round_ties_even() / scale)
            }
            Builtin::Min => {
                arity("at least 1", !args.is_empty())?;
                Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
            }
            Builtin::Max => {
                arity("at least 1", !args.is_empty())?;
                Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            }
        }
    }
}

/// 表达式语法树
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Current,
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Builtin,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Power,
}

impl Expr {
    /// 以 `current` 的值求值
    pub fn evaluate(&self, current: f64) -> EvalResult<f64> {
        let value = match self {
            Expr::Number(n) => *n,
            Expr::Current => current,
            Expr::Negate(operand) => -operand.evaluate(current)?,
            Expr::Binary { op, left, right } => {
                let l = left.evaluate(current)?;
                let r = right.evaluate(current)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Subtract => l - r,
                    BinaryOp::Multiply => l * r,
                    BinaryOp::Divide => {
                        if r == 0.0 {
                            return Err(FormulaError::DivisionByZero);
                        }
                        l / r
                    }
                    BinaryOp::FloorDivide => {
                        if r == 0.0 {
                            return Err(FormulaError::DivisionByZero);
                        }
                        (l / r).floor()
                    }
                    BinaryOp::Modulo => {
                        if r == 0.0 {
                            return Err(FormulaError::DivisionByZero);
                        }
                        floored_mod(l, r)
                    }
                    BinaryOp::Power => {
                        if l == 0.0 && r < 0.0 {
                            return Err(FormulaError::DivisionByZero);
                        }
                        l.powf(r)
                    }
                }
            }
            Expr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(current))
                    .collect::<EvalResult<Vec<_>>>()?;
                function.apply(&values)?
            }
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

/// 取模结果与除数同号（与整除向下取整一致）
pub fn floored_mod(dividend: f64, divisor: f64) -> f64 {
    let rem = dividend % divisor;
    if rem != 0.0 && (rem < 0.0) != (divisor < 0.0) {
        rem + divisor
    } else {
        rem
    }
}

/// 解析并求值
///
/// # 示例
/// ```
/// use bulk_edit_formula::services::safe_eval::safe_eval;
///
/// assert_eq!(safe_eval("current * 2 + 1", 4.0).unwrap(), 9.0);
/// assert!(safe_eval("__import__('os')", 4.0).is_err());
/// ```
pub fn safe_eval(expression: &str, current: f64) -> EvalResult<f64> {
    parse_expression(expression)?.evaluate(current)
}

/// 把表达式解析为语法树
pub fn parse_expression(expression: &str) -> EvalResult<Expr> {
    let mut parser = ExprParser::new(expression)?;
    let expr = parser.parse_expr()?;
    if parser.current != Token::Eof {
        return Err(FormulaError::Parse(format!(
            "unexpected token {:?} after expression",
            parser.current
        )));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LeftParen,
    RightParen,
    Comma,
    Eof,
}

struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
    current: Token,
    depth: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> EvalResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            current: Token::Eof,
            depth: 0,
        };
        parser.advance()?;
        Ok(parser)
    }

    // === 词法 ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn advance(&mut self) -> EvalResult<()> {
        self.current = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> EvalResult<Token> {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.bump();
        }

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        if c.is_ascii_digit() || (c == '.' && matches!(self.peek_second(), Some(d) if d.is_ascii_digit())) {
            return self.scan_number();
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = self.pos;
            while matches!(self.peek_char(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                self.bump();
            }
            return Ok(Token::Name(self.input[start..self.pos].to_string()));
        }

        self.bump();
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if self.peek_char() == Some('*') => {
                self.bump();
                Token::DoubleStar
            }
            '*' => Token::Star,
            '/' if self.peek_char() == Some('/') => {
                self.bump();
                Token::DoubleSlash
            }
            '/' => Token::Slash,
            '%' => Token::Percent,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            ',' => Token::Comma,
            other => {
                return Err(FormulaError::Parse(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        };
        Ok(token)
    }

    fn scan_number(&mut self) -> EvalResult<Token> {
        let start = self.pos;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.bump();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.bump();
            }
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }

        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| FormulaError::Parse(format!("invalid number '{}'", text)))
    }

    fn expect(&mut self, expected: Token) -> EvalResult<()> {
        if self.current == expected {
            self.advance()
        } else {
            Err(FormulaError::Parse(format!(
                "expected {:?}, found {:?}",
                expected, self.current
            )))
        }
    }

    // === 语法 ===

    fn parse_expr(&mut self) -> EvalResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::Parse("expression nested too deeply".to_string()));
        }

        let mut left = self.parse_term()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }

        self.depth -= 1;
        Ok(left)
    }

    fn parse_term(&mut self) -> EvalResult<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                Token::DoubleSlash => BinaryOp::FloorDivide,
                Token::Percent => BinaryOp::Modulo,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> EvalResult<Expr> {
        match self.current {
            Token::Plus => {
                self.advance()?;
                self.nested(|p| p.parse_factor())
            }
            Token::Minus => {
                self.advance()?;
                let operand = self.nested(|p| p.parse_factor())?;
                Ok(Expr::Negate(Box::new(operand)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> EvalResult<Expr> {
        let base = self.parse_primary()?;
        if self.current == Token::DoubleStar {
            self.advance()?;
            // 右结合：2 ** 3 ** 2 == 2 ** 9
            let exponent = self.nested(|p| p.parse_factor())?;
            return Ok(binary(BinaryOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> EvalResult<Expr> {
        match self.current.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Name(name) => {
                self.advance()?;
                if self.current == Token::LeftParen {
                    let function = *BUILTINS
                        .get(name.as_str())
                        .ok_or(FormulaError::FunctionNotAllowed(name))?;
                    self.advance()?;
                    let args = self.parse_args()?;
                    return Ok(Expr::Call { function, args });
                }
                if name == CURRENT_BINDING {
                    Ok(Expr::Current)
                } else {
                    Err(FormulaError::UnknownName(name))
                }
            }
            Token::LeftParen => {
                self.advance()?;
                let inner = self.parse_expr()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            other => Err(FormulaError::Parse(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_args(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.current == Token::RightParen {
            self.advance()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.current {
                Token::Comma => self.advance()?,
                Token::RightParen => {
                    self.advance()?;
                    return Ok(args);
                }
                _ => {
                    return Err(FormulaError::Parse(format!(
                        "expected ',' or ')', found {:?}",
                        self.current
                    )))
                }
            }
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> EvalResult<T>) -> EvalResult<T> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::Parse("expression nested too deeply".to_string()));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(safe_eval("1 + 2 * 3", 0.0).unwrap(), 7.0);
        assert_eq!(safe_eval("(1 + 2) * 3", 0.0).unwrap(), 9.0);
        assert_eq!(safe_eval("current * 1.5 - 1", 10.0).unwrap(), 14.0);
        assert_eq!(safe_eval("current / 4", 10.0).unwrap(), 2.5);
    }

    #[test]
    fn test_power_binds_tighter_than_unary_minus() {
        assert_eq!(safe_eval("-2 ** 2", 0.0).unwrap(), -4.0);
        assert_eq!(safe_eval("2 ** 3 ** 2", 0.0).unwrap(), 512.0);
        assert_eq!(safe_eval("2 ** -1", 0.0).unwrap(), 0.5);
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(safe_eval("7 // 2", 0.0).unwrap(), 3.0);
        assert_eq!(safe_eval("-7 // 2", 0.0).unwrap(), -4.0);
        assert_eq!(safe_eval("-7 % 3", 0.0).unwrap(), 2.0);
        assert_eq!(safe_eval("7 % -3", 0.0).unwrap(), -2.0);
        assert_eq!(safe_eval("current % 4", 10.0).unwrap(), 2.0);
    }

    #[test]
    fn test_whitelisted_functions() {
        assert_eq!(safe_eval("abs(current)", -3.0).unwrap(), 3.0);
        assert_eq!(safe_eval("round(current, 1)", 2.46).unwrap(), 2.5);
        assert_eq!(safe_eval("round(2.5)", 0.0).unwrap(), 2.0);
        assert_eq!(safe_eval("round(2.5, 400)", 0.0).unwrap(), 2.5);
        assert_eq!(safe_eval("round(1e300, 20)", 0.0).unwrap(), 1e300);
        assert_eq!(safe_eval("round(123.4, -400)", 0.0).unwrap(), 0.0);
        assert_eq!(safe_eval("max(current, 10)", 4.0).unwrap(), 10.0);
        assert_eq!(safe_eval("min(current, 10, 2)", 4.0).unwrap(), 2.0);
        assert_eq!(safe_eval("int(current)", 4.9).unwrap(), 4.0);
        assert_eq!(safe_eval("flt(current) + 1", 4.0).unwrap(), 5.0);
    }

    #[test]
    fn test_sandbox_rejects_everything_else() {
        assert!(matches!(
            safe_eval("__import__('os')", 0.0),
            Err(FormulaError::FunctionNotAllowed(_))
        ));
        assert!(matches!(
            safe_eval("current.real", 1.0),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            safe_eval("other + 1", 1.0),
            Err(FormulaError::UnknownName(_))
        ));
        assert!(safe_eval("'abc'", 1.0).is_err());
        assert!(safe_eval("current[0]", 1.0).is_err());
        assert!(safe_eval("current; 1", 1.0).is_err());
        assert!(safe_eval("foo(", 1.0).is_err());
        assert!(safe_eval("", 1.0).is_err());
    }

    #[test]
    fn test_argument_count_checked() {
        assert!(matches!(
            safe_eval("abs(1, 2)", 0.0),
            Err(FormulaError::ArgumentCount { function: "abs", .. })
        ));
        assert!(safe_eval("max()", 0.0).is_err());
        assert_eq!(safe_eval("max(current)", 3.0).unwrap(), 3.0);
        assert_eq!(safe_eval("min(-2)", 0.0).unwrap(), -2.0);
        assert!(safe_eval("round(1.5, 0.5)", 0.0).is_err());
    }

    #[test]
    fn test_division_by_zero_and_non_finite_are_errors() {
        assert_eq!(safe_eval("current / 0", 1.0), Err(FormulaError::DivisionByZero));
        assert_eq!(safe_eval("current % 0", 1.0), Err(FormulaError::DivisionByZero));
        assert_eq!(safe_eval("0 ** -1", 1.0), Err(FormulaError::DivisionByZero));
        assert_eq!(safe_eval("10 ** 400", 1.0), Err(FormulaError::NonFinite));
        assert_eq!(safe_eval("(-8) ** 0.5", 1.0), Err(FormulaError::NonFinite));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(safe_eval(&deep, 0.0), Err(FormulaError::Parse(_))));

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(safe_eval(&shallow, 0.0).unwrap(), 1.0);
    }
}
