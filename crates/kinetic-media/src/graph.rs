//! Typed filter graph rendered to `-filter_complex` syntax.
//!
//! Chains are built from [`Filter`] descriptors (operation + named
//! parameters) and only become text in [`FilterGraph::render`].

use std::collections::HashSet;
use std::fmt;

use crate::error::{MediaError, MediaResult};
use crate::expr::{format_number, Expr};

/// Stream type selected from an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn specifier(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}

/// A pad feeding a filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pad {
    /// Stream of an encoder input (`[1:v]`)
    Input { index: usize, kind: StreamKind },
    /// Output of an earlier chain (`[bg]`)
    Label(String),
}

impl Pad {
    pub fn video(index: usize) -> Self {
        Pad::Input {
            index,
            kind: StreamKind::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        Pad::Input {
            index,
            kind: StreamKind::Audio,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Pad::Label(name.into())
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pad::Input { index, kind } => write!(f, "[{}:{}]", index, kind.specifier()),
            Pad::Label(name) => write!(f, "[{}]", name),
        }
    }
}

/// A filter parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    /// Literal token, emitted verbatim
    Str(String),
    /// Time-varying expression, emitted single-quoted
    Expr(Expr),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Int(v) => write!(f, "{}", v),
            FilterValue::Float(v) => f.write_str(&format_number(*v)),
            FilterValue::Str(s) => f.write_str(s),
            FilterValue::Expr(e) => write!(f, "'{}'", e.render()),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        FilterValue::Int(i64::from(v))
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Str(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Str(v)
    }
}

impl From<Expr> for FilterValue {
    fn from(v: Expr) -> Self {
        FilterValue::Expr(v)
    }
}

/// A single filter invocation with ordered named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<(String, FilterValue)>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }

    /// Look up a parameter by name.
    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.args.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            let sep = if i == 0 { '=' } else { ':' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

/// Linear sequence of filters between input pads and output labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    pub inputs: Vec<Pad>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, pad: Pad) -> Self {
        self.inputs.push(pad);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    pub fn find(&self, name: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "{}", pad)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        for label in &self.outputs {
            write!(f, "[{}]", label)?;
        }
        Ok(())
    }
}

/// Ordered set of chains forming one `-filter_complex` script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Chain producing `label`, if any.
    pub fn producer(&self, label: &str) -> Option<&FilterChain> {
        self.chains
            .iter()
            .find(|c| c.outputs.iter().any(|o| o == label))
    }

    /// Check that labels are produced once, before they are consumed, and
    /// that every input index is below `input_count`.
    pub fn validate(&self, input_count: usize) -> MediaResult<()> {
        let mut defined = HashSet::new();
        for chain in &self.chains {
            if chain.filters.is_empty() {
                return Err(MediaError::InvalidGraph("empty filter chain".to_string()));
            }
            for pad in &chain.inputs {
                match pad {
                    Pad::Input { index, .. } if *index >= input_count => {
                        return Err(MediaError::InvalidGraph(format!(
                            "input {} out of range ({} inputs)",
                            index, input_count
                        )));
                    }
                    Pad::Label(name) if !defined.contains(name.as_str()) => {
                        return Err(MediaError::InvalidGraph(format!(
                            "label [{}] consumed before it is produced",
                            name
                        )));
                    }
                    _ => {}
                }
            }
            for label in &chain.outputs {
                if !defined.insert(label.as_str()) {
                    return Err(MediaError::InvalidGraph(format!(
                        "label [{}] produced twice",
                        label
                    )));
                }
            }
        }
        Ok(())
    }

    /// Render to FFmpeg's textual syntax.
    pub fn render(&self) -> String {
        self.chains
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
