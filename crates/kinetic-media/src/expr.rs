//! Small arithmetic expression language for time-varying filter parameters.
//!
//! Expressions are built as a tree, rendered to FFmpeg's expression syntax
//! at the encoder boundary, and can be evaluated in-process so the curves
//! they describe are testable without running an encoder.

use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Variables an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// Output frame index (`on`)
    OutputFrame,
    /// Input frame index (`n`)
    InputFrame,
    /// Timestamp in seconds (`t`)
    Time,
    /// Input width (`iw`)
    InputWidth,
    /// Input height (`ih`)
    InputHeight,
    /// Output width (`ow`)
    OutputWidth,
    /// Output height (`oh`)
    OutputHeight,
    /// Current zoom factor (`zoom`)
    Zoom,
    /// The constant π (`PI`)
    Pi,
}

impl Var {
    pub fn as_str(&self) -> &'static str {
        match self {
            Var::OutputFrame => "on",
            Var::InputFrame => "n",
            Var::Time => "t",
            Var::InputWidth => "iw",
            Var::InputHeight => "ih",
            Var::OutputWidth => "ow",
            Var::OutputHeight => "oh",
            Var::Zoom => "zoom",
            Var::Pi => "PI",
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Var(Var),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Cos(Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    /// 1 when the left side is strictly greater, else 0
    Gt(Box<Expr>, Box<Expr>),
    /// 1 when the left side is greater or equal, else 0
    Gte(Box<Expr>, Box<Expr>),
    /// Non-zero condition selects the second operand
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// 1 when `min <= x <= max`, else 0
    Between(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Pseudo-random value in `[0, 1)` drawn from generator slot `seed`
    Random(u32),
}

/// Variable bindings used by [`Expr::eval`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalContext {
    pub output_frame: f64,
    pub input_frame: f64,
    pub time: f64,
    pub input_width: f64,
    pub input_height: f64,
    pub output_width: f64,
    pub output_height: f64,
    pub zoom: f64,
    /// Value returned by every `random(..)` call
    pub random: f64,
}

impl EvalContext {
    pub fn at_frame(frame: f64, fps: f64) -> Self {
        Self {
            output_frame: frame,
            input_frame: frame,
            time: if fps > 0.0 { frame / fps } else { 0.0 },
            zoom: 1.0,
            ..Default::default()
        }
    }
}

impl Expr {
    pub fn c(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn var(var: Var) -> Self {
        Expr::Var(var)
    }

    pub fn cos(self) -> Self {
        Expr::Cos(Box::new(self))
    }

    pub fn min(self, other: Expr) -> Self {
        Expr::Min(Box::new(self), Box::new(other))
    }

    pub fn max(self, other: Expr) -> Self {
        Expr::Max(Box::new(self), Box::new(other))
    }

    pub fn gt(self, other: Expr) -> Self {
        Expr::Gt(Box::new(self), Box::new(other))
    }

    pub fn gte(self, other: Expr) -> Self {
        Expr::Gte(Box::new(self), Box::new(other))
    }

    pub fn if_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    pub fn between(self, lo: Expr, hi: Expr) -> Self {
        Expr::Between(Box::new(self), Box::new(lo), Box::new(hi))
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(..) | Expr::Sub(..) => 1,
            Expr::Mul(..) | Expr::Div(..) => 2,
            Expr::Const(v) if *v < 0.0 => 1,
            _ => 3,
        }
    }

    /// Render to FFmpeg expression syntax.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Expr::Const(v) => out.push_str(&format_number(*v)),
            Expr::Var(v) => out.push_str(v.as_str()),
            Expr::Add(a, b) => self.write_binary(out, a, "+", b, false),
            Expr::Sub(a, b) => self.write_binary(out, a, "-", b, true),
            Expr::Mul(a, b) => self.write_binary(out, a, "*", b, false),
            Expr::Div(a, b) => self.write_binary(out, a, "/", b, true),
            Expr::Cos(a) => write_call(out, "cos", &[a]),
            Expr::Min(a, b) => write_call(out, "min", &[a, b]),
            Expr::Max(a, b) => write_call(out, "max", &[a, b]),
            Expr::Gt(a, b) => write_call(out, "gt", &[a, b]),
            Expr::Gte(a, b) => write_call(out, "gte", &[a, b]),
            Expr::If(c, a, b) => write_call(out, "if", &[c, a, b]),
            Expr::Between(x, lo, hi) => write_call(out, "between", &[x, lo, hi]),
            Expr::Random(seed) => {
                out.push_str("random(");
                out.push_str(&seed.to_string());
                out.push(')');
            }
        }
    }

    fn write_binary(&self, out: &mut String, lhs: &Expr, op: &str, rhs: &Expr, strict_rhs: bool) {
        let prec = self.precedence();
        write_operand(out, lhs, lhs.precedence() < prec);
        out.push_str(op);
        let rhs_prec = rhs.precedence();
        write_operand(out, rhs, rhs_prec < prec || (strict_rhs && rhs_prec == prec));
    }

    /// Evaluate with the given bindings.
    pub fn eval(&self, ctx: &EvalContext) -> f64 {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            Expr::Const(v) => *v,
            Expr::Var(v) => match v {
                Var::OutputFrame => ctx.output_frame,
                Var::InputFrame => ctx.input_frame,
                Var::Time => ctx.time,
                Var::InputWidth => ctx.input_width,
                Var::InputHeight => ctx.input_height,
                Var::OutputWidth => ctx.output_width,
                Var::OutputHeight => ctx.output_height,
                Var::Zoom => ctx.zoom,
                Var::Pi => std::f64::consts::PI,
            },
            Expr::Add(a, b) => a.eval(ctx) + b.eval(ctx),
            Expr::Sub(a, b) => a.eval(ctx) - b.eval(ctx),
            Expr::Mul(a, b) => a.eval(ctx) * b.eval(ctx),
            Expr::Div(a, b) => a.eval(ctx) / b.eval(ctx),
            Expr::Cos(a) => a.eval(ctx).cos(),
            Expr::Min(a, b) => a.eval(ctx).min(b.eval(ctx)),
            Expr::Max(a, b) => a.eval(ctx).max(b.eval(ctx)),
            Expr::Gt(a, b) => flag(a.eval(ctx) > b.eval(ctx)),
            Expr::Gte(a, b) => flag(a.eval(ctx) >= b.eval(ctx)),
            Expr::If(c, a, b) => {
                if c.eval(ctx) != 0.0 {
                    a.eval(ctx)
                } else {
                    b.eval(ctx)
                }
            }
            Expr::Between(x, lo, hi) => {
                let x = x.eval(ctx);
                flag(x >= lo.eval(ctx) && x <= hi.eval(ctx))
            }
            Expr::Random(_) => ctx.random,
        }
    }
}

fn write_operand(out: &mut String, expr: &Expr, parens: bool) {
    if parens {
        out.push('(');
        expr.write_to(out);
        out.push(')');
    } else {
        expr.write_to(out);
    }
}

fn write_call(out: &mut String, name: &str, args: &[&Box<Expr>]) {
    out.push_str(name);
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        arg.write_to(out);
    }
    out.push(')');
}

/// Shortest decimal form: integers without a fractional part.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{:.6}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Const(v)
    }
}

impl From<Var> for Expr {
    fn from(v: Var) -> Self {
        Expr::Var(v)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_precedence() {
        let iw = Expr::var(Var::InputWidth);
        let zoom = Expr::var(Var::Zoom);
        let x = iw.clone() / 2.0 - iw / zoom / 2.0;
        assert_eq!(x.render(), "iw/2-iw/zoom/2");

        let grouped = Expr::c(0.5) - (Expr::c(0.5) - Expr::var(Var::Time));
        assert_eq!(grouped.render(), "0.5-(0.5-t)");

        let product = (Expr::c(1.0) + Expr::var(Var::Time)) * 2.0;
        assert_eq!(product.render(), "(1+t)*2");
    }

    #[test]
    fn test_render_functions() {
        let e = Expr::var(Var::Time).between(Expr::c(0.0), Expr::c(4.0));
        assert_eq!(e.render(), "between(t,0,4)");

        let e = Expr::if_else(
            Expr::var(Var::OutputFrame).gt(Expr::c(120.0)),
            Expr::c(1.0),
            Expr::c(0.0),
        );
        assert_eq!(e.render(), "if(gt(on,120),1,0)");
        assert_eq!(Expr::Random(1).render(), "random(1)");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(30.0), "30");
        assert_eq!(format_number(1.05), "1.05");
        assert_eq!(format_number(0.2), "0.2");
        assert_eq!(format_number(-0.5), "-0.5");
    }

    #[test]
    fn test_eval() {
        let ctx = EvalContext {
            input_width: 1620.0,
            zoom: 1.5,
            ..Default::default()
        };
        let x = Expr::var(Var::InputWidth) / 2.0
            - Expr::var(Var::InputWidth) / Expr::var(Var::Zoom) / 2.0;
        assert!((x.eval(&ctx) - 270.0).abs() < 1e-9);

        let t = EvalContext::at_frame(60.0, 30.0);
        let window = Expr::var(Var::Time).between(Expr::c(0.0), Expr::c(2.0));
        assert_eq!(window.eval(&t), 1.0);
        let later = EvalContext::at_frame(61.0, 30.0);
        assert_eq!(window.eval(&later), 0.0);
    }
}
