//! Smart value resolution.
//!
//! Strings are parsed into a [`Template`] and every reference is looked up in
//! its source: `$` the environment, `&` the configuration, `%` the scenario
//! and `=` the formula evaluator. Reference arguments are resolved first and
//! spliced in as text, so `=%{a} + %{b}` evaluates the formula built from the
//! two stored values.
//!
//! A string that is exactly one reference yields the referenced value with
//! its own type. When that value is itself a smart value (a stored `"%other"`
//! for instance) it is resolved again, up to [`ResolverOptions::max_depth`]
//! hops. Text produced by splicing is never parsed again.
//!
//! Escaped characters (`\%`) keep their backslash in literal text, so a
//! resolved string that is stored and read back stays literal. Backslashes
//! are dropped only inside reference arguments, where the text becomes a
//! name, a path or a formula.

use ledgerops_formula::{Evaluator, FormulaError, FormulaRng};
use ledgerops_store::{DataPath, Map, ScenarioData, StoreError, Value};

use crate::coerce::ValueType;
use crate::config::Config;
use crate::env::Environment;
use crate::error::{ResolveError, Result};
use crate::smart::SmartValue;
use crate::template::{unescape, Node, Sigil, Template, TemplateError};

pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Maximum nesting of references and reference chains, also applied
    /// while parsing templates.
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Everything a smart value may read. Only the generator is mutated.
pub struct ResolveContext<'a> {
    pub scenario: &'a ScenarioData,
    pub config: &'a Config,
    pub env: &'a dyn Environment,
    pub rng: &'a mut FormulaRng,
}

pub struct Resolver<'a> {
    ctx: ResolveContext<'a>,
    options: ResolverOptions,
}

enum Pass {
    /// Fully resolved.
    Done(Value),
    /// Produced by a whole-string reference and still holds smart values.
    Chain(Value),
}

impl<'a> Resolver<'a> {
    pub fn new(ctx: ResolveContext<'a>) -> Self {
        Self {
            ctx,
            options: ResolverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolve `raw` and convert the result to `ty`.
    pub fn resolve(&mut self, raw: &Value, ty: ValueType) -> Result<Value> {
        self.resolve_smart(raw, ty).map(SmartValue::into_value)
    }

    pub fn resolve_str(&mut self, raw: &str, ty: ValueType) -> Result<Value> {
        self.resolve(&Value::from(raw), ty)
    }

    /// Like [`Resolver::resolve`], keeping the intermediate values.
    pub fn resolve_smart(&mut self, raw: &Value, ty: ValueType) -> Result<SmartValue> {
        let mut steps = Vec::new();
        let value = self.settle(raw, 0, Some(&mut steps))?;
        let coerced = ty.coerce(value.clone()).map_err(|reason| ResolveError::TypeCoercion {
            raw: raw.to_string(),
            target: ty,
            reason,
        })?;
        if coerced != value {
            steps.push(coerced);
        }
        Ok(SmartValue {
            raw: raw.clone(),
            ty,
            steps,
        })
    }

    /// Resolve a write target such as `list[={len(%{list})}]` to a path.
    pub fn resolve_path(&mut self, raw: &str) -> Result<DataPath> {
        let text = match self.resolve_str(raw, ValueType::Any)? {
            Value::Str(s) => s,
            other => other.to_string(),
        };
        DataPath::parse(&text).map_err(|err| ResolveError::MalformedExpression {
            raw: raw.to_string(),
            reason: err.to_string(),
        })
    }

    /// Resolve `raw` and every value it chains to.
    fn settle(&mut self, raw: &Value, depth: usize, mut trace: Option<&mut Vec<Value>>) -> Result<Value> {
        let mut depth = depth;
        let mut pass = self.pass(raw, depth)?;
        loop {
            let (value, chained) = match pass {
                Pass::Done(value) => (value, false),
                Pass::Chain(value) => (value, true),
            };
            if let Some(trace) = trace.as_deref_mut() {
                trace.push(value.clone());
            }
            if !chained {
                return Ok(value);
            }
            depth += 1;
            pass = self.pass(&value, depth)?;
        }
    }

    fn pass(&mut self, raw: &Value, depth: usize) -> Result<Pass> {
        match raw {
            Value::Str(text) => self.pass_str(text, depth),
            Value::List(items) => items
                .iter()
                .map(|item| self.settle(item, depth, None))
                .collect::<Result<Vec<_>>>()
                .map(|items| Pass::Done(Value::List(items))),
            Value::Map(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, value) in map {
                    let key = match self.settle(&Value::from(key.as_str()), depth, None)? {
                        Value::Str(s) => s,
                        other => other.to_string(),
                    };
                    resolved.insert(key, self.settle(value, depth, None)?);
                }
                Ok(Pass::Done(Value::Map(resolved)))
            }
            scalar => Ok(Pass::Done(scalar.clone())),
        }
    }

    fn pass_str(&mut self, raw: &str, depth: usize) -> Result<Pass> {
        if depth > self.options.max_depth {
            return Err(ResolveError::ResolutionDepthExceeded {
                raw: raw.to_string(),
                max_depth: self.options.max_depth,
            });
        }
        let template = Template::parse_with_max_depth(raw, self.options.max_depth).map_err(
            |err| match err {
                TemplateError::TooDeep { max_depth, .. } => ResolveError::ResolutionDepthExceeded {
                    raw: raw.to_string(),
                    max_depth,
                },
                err => ResolveError::MalformedExpression {
                    raw: raw.to_string(),
                    reason: err.to_string(),
                },
            },
        )?;
        if template.is_literal() {
            return Ok(Pass::Done(Value::Str(raw.to_string())));
        }
        if let Some(node) = template.single_reference() {
            let value = self.reference(node, raw, depth)?;
            return Ok(if self.needs_resolution(&value) {
                Pass::Chain(value)
            } else {
                Pass::Done(value)
            });
        }
        let mut text = String::new();
        for node in &template.nodes {
            match node {
                Node::Text(part) => text.push_str(part),
                reference => {
                    let value = self.nested(reference, raw, depth)?;
                    text.push_str(&value.to_string());
                }
            }
        }
        Ok(Pass::Done(Value::Str(text)))
    }

    /// Value of a reference embedded in a larger template, chains included.
    fn nested(&mut self, node: &Node, raw: &str, depth: usize) -> Result<Value> {
        let value = self.reference(node, raw, depth + 1)?;
        if self.needs_resolution(&value) {
            self.settle(&value, depth + 1, None)
        } else {
            Ok(value)
        }
    }

    fn reference(&mut self, node: &Node, raw: &str, depth: usize) -> Result<Value> {
        let Some((sigil, arg)) = node.as_reference() else {
            return Ok(Value::Null);
        };
        if depth > self.options.max_depth {
            return Err(ResolveError::ResolutionDepthExceeded {
                raw: raw.to_string(),
                max_depth: self.options.max_depth,
            });
        }

        let mut text = String::new();
        for part in arg {
            match part {
                Node::Text(t) => text.push_str(&unescape(t)),
                inner => {
                    let value = self.nested(inner, raw, depth)?;
                    text.push_str(&value.to_string());
                }
            }
        }

        let value = match sigil {
            Sigil::Env => {
                let (name, ty) = split_type(&text);
                let value = self
                    .ctx
                    .env
                    .var(name)
                    .map(Value::Str)
                    .ok_or_else(|| ResolveError::UnresolvedReference {
                        raw: raw.to_string(),
                        reason: format!("environment variable `{name}` is not set"),
                    })?;
                coerce(raw, ty, value)?
            }
            Sigil::Config => {
                let (key, ty) = split_type(&text);
                let value = self.ctx.config.get(key).cloned().ok_or_else(|| {
                    ResolveError::UnresolvedReference {
                        raw: raw.to_string(),
                        reason: format!(
                            "no config option `{}` for {}",
                            key.to_uppercase(),
                            self.ctx.config.network()
                        ),
                    }
                })?;
                coerce(raw, ty, value)?
            }
            Sigil::Data => self.data(raw, text.trim())?,
            Sigil::Formula => self.formula(raw, &text)?,
        };
        tracing::debug!(reference = %node, value = %value.repr(), "resolved reference");
        Ok(value)
    }

    fn data(&self, raw: &str, path: &str) -> Result<Value> {
        let path = DataPath::parse(path).map_err(|err| ResolveError::MalformedExpression {
            raw: raw.to_string(),
            reason: err.to_string(),
        })?;
        self.ctx.scenario.get(&path).map_err(|err| match err {
            err if err.is_lookup_failure() => ResolveError::UnresolvedReference {
                raw: raw.to_string(),
                reason: format!("{err} in scenario `{}`", self.ctx.scenario.name),
            },
            StoreError::MalformedPath { reason, .. } => ResolveError::MalformedExpression {
                raw: raw.to_string(),
                reason,
            },
            other => other.into(),
        })
    }

    fn formula(&mut self, raw: &str, formula: &str) -> Result<Value> {
        Evaluator::new(&mut *self.ctx.rng)
            .evaluate(formula)
            .map_err(|err| match err {
                FormulaError::Parse { .. } => ResolveError::MalformedExpression {
                    raw: raw.to_string(),
                    reason: err.to_string(),
                },
                FormulaError::UnknownIdentifier(name) => ResolveError::UnknownIdentifier {
                    raw: raw.to_string(),
                    name,
                },
                source => ResolveError::FormulaFailed {
                    raw: raw.to_string(),
                    source,
                },
            })
    }

    /// Whether a read value still contains references. Strings that do not
    /// parse are plain data, unless they nest too deep to parse at all.
    fn needs_resolution(&self, value: &Value) -> bool {
        match value {
            Value::Str(s) => match Template::parse_with_max_depth(s, self.options.max_depth) {
                Ok(template) => !template.is_literal(),
                Err(TemplateError::TooDeep { .. }) => true,
                Err(TemplateError::Unclosed { .. }) => false,
            },
            Value::List(items) => items.iter().any(|item| self.needs_resolution(item)),
            Value::Map(map) => map.iter().any(|(k, v)| {
                self.needs_resolution(&Value::from(k.as_str())) || self.needs_resolution(v)
            }),
            _ => false,
        }
    }
}

/// `NAME:type` splits into the name and the requested type. A suffix that is
/// not a type name is part of the name.
fn split_type(text: &str) -> (&str, ValueType) {
    match text.rsplit_once(':') {
        Some((name, suffix)) => match suffix.parse::<ValueType>() {
            Ok(ty) => (name.trim(), ty),
            Err(_) => (text.trim(), ValueType::Any),
        },
        None => (text.trim(), ValueType::Any),
    }
}

fn coerce(raw: &str, ty: ValueType, value: Value) -> Result<Value> {
    ty.coerce(value).map_err(|reason| ResolveError::TypeCoercion {
        raw: raw.to_string(),
        target: ty,
        reason,
    })
}
