// gptutils-core/src/tools/builtin.rs

//! Demo tools: a mock weather lookup and an arithmetic calculator.

use super::FnTool;
use crate::errors::ToolError;
use crate::models::tools::{ToolParameter, ToolParameterType, ToolParametersDefinition};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct WeatherArgs {
    location: String,
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_unit() -> String {
    "celsius".to_string()
}

#[derive(Deserialize)]
struct CalculatorArgs {
    expression: String,
}

/// `get_weather{location, unit}`. Returns canned conditions for any city.
pub fn weather_tool() -> FnTool {
    let parameters = ToolParametersDefinition::object()
        .property(
            "location",
            ToolParameter::new(
                ToolParameterType::String,
                "City name, e.g. Beijing or Shanghai",
            ),
        )
        .property(
            "unit",
            ToolParameter::new(ToolParameterType::String, "Temperature unit")
                .with_enum(["celsius", "fahrenheit"]),
        )
        .required("location");

    FnTool::new(
        "get_weather",
        "Get the current weather for a city",
        parameters,
        |arguments| {
            let args: WeatherArgs =
                serde_json::from_str(arguments).map_err(|source| ToolError::InvalidArguments {
                    tool: "get_weather".to_string(),
                    source,
                })?;
            let temperature = if args.unit == "fahrenheit" { 72 } else { 22 };
            Ok(json!({
                "location": args.location,
                "temperature": temperature,
                "unit": args.unit,
                "condition": "sunny",
                "humidity": 65,
            })
            .to_string())
        },
    )
}

/// `calculator{expression}`. Evaluates `+ - * /`, parentheses, unary minus
/// and decimal numbers.
pub fn calculator_tool() -> FnTool {
    let parameters = ToolParametersDefinition::object()
        .property(
            "expression",
            ToolParameter::new(
                ToolParameterType::String,
                "Arithmetic expression, e.g. 2+2 or (10-4)*5",
            ),
        )
        .required("expression");

    FnTool::new(
        "calculator",
        "Evaluate a basic arithmetic expression",
        parameters,
        |arguments| {
            let args: CalculatorArgs =
                serde_json::from_str(arguments).map_err(|source| ToolError::InvalidArguments {
                    tool: "calculator".to_string(),
                    source,
                })?;
            let value = evaluate(&args.expression).map_err(ToolError::Execution)?;
            Ok(format!("{} = {}", args.expression.trim(), format_number(value)))
        },
    )
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Evaluates an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expression.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    if parser.chars.is_empty() {
        return Err("empty expression".to_string());
    }
    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        return Err(format!("unexpected '{}' at position {}", c, parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

// expr   := term (('+' | '-') term)*
// term   := factor (('*' | '/') factor)*
// factor := '-' factor | '(' expr ')' | number
struct Parser {
    chars: Vec<char>,
    pos: usize,
    /// Current nesting of parentheses and unary minus.
    depth: usize,
}

/// Deeper input is rejected before it can exhaust the stack.
const MAX_NESTING: usize = 256;

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                '+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                '-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                '*' => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                '/' => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                self.nested(|parser| Ok(-parser.factor()?))
            }
            Some('(') => {
                self.pos += 1;
                let value = self.nested(Parser::expr)?;
                if self.peek() != Some(')') {
                    return Err(format!("expected ')' at position {}", self.pos));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("unexpected '{}' at position {}", c, self.pos)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn nested<F>(&mut self, parse: F) -> Result<f64, String>
    where
        F: FnOnce(&mut Self) -> Result<f64, String>,
    {
        if self.depth >= MAX_NESTING {
            return Err("expression nested too deeply".to_string());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", literal))
    }
}
