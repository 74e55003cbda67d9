//! The field advisor machinery backing Discovery mode (spec §4.7): each
//! provider declares, per field it wants to advise on, what a client may
//! supply — a fixed literal, one of a set of options, a subset of a set,
//! a dict schema, or a date range. [`AdviceBuilder`] walks the advisors in
//! declared `order`, threading resolved field values forward so a later
//! advisor can narrow its options based on an earlier one's resolution
//! (e.g. `ListTextureFiles`' two-level subfolder advisor narrows the
//! second path segment once the first is picked).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// What one field advisor offers a client for its field.
#[derive(Debug, Clone)]
pub enum Advised {
    /// The field can only ever be this one value.
    Literal(Value),
    /// The field may be any one of `values`. `split_on_advice` controls
    /// whether the advice tree branches per option (`true`, the usual
    /// case) or folds the whole set into a single advised list value
    /// (`false`, used when the client picks a subset downstream rather
    /// than the advisor itself enumerating branches). `break_on_advice`
    /// stops descending into later advisors under this field once it
    /// resolves — used when a choice here makes the rest of the advisors
    /// inapplicable.
    OneOf {
        values: Vec<Value>,
        split_on_advice: bool,
        break_on_advice: bool,
    },
    /// The client may supply any subset of `values` (order preserved); an
    /// absent field advises the full set.
    SubsetOf { values: Vec<Value> },
    /// The client may supply an object matching `schema`'s keys;
    /// `allow_extras` controls whether additional keys are tolerated. An
    /// absent field advises `schema` itself as the suggested value.
    Dict {
        schema: HashMap<String, Value>,
        allow_extras: bool,
    },
    /// The client may supply an RFC 3339 timestamp within `[start, end]`.
    /// An absent field advises `start`.
    DateRange { start: DateTime<Utc>, end: DateTime<Utc> },
}

/// One provider-declared advisor: which field it covers, the order it
/// runs in relative to its siblings, and what it advises.
#[derive(Debug, Clone)]
pub struct AdvisorDef {
    pub field: String,
    pub order: i32,
    pub advice: Advised,
}

impl AdvisorDef {
    pub fn new(field: impl Into<String>, order: i32, advice: Advised) -> Self {
        Self {
            field: field.into(),
            order,
            advice,
        }
    }
}

/// The field values known while building advice: `provided` is whatever
/// the client's node already carries (the discovery request's baseline
/// params), `resolved` accumulates what earlier advisors (lower `order`)
/// picked as this tree is built depth-first.
#[derive(Debug, Clone, Default)]
pub struct AdviceContext {
    pub provided: HashMap<String, Value>,
    pub resolved: HashMap<String, Value>,
}

impl AdviceContext {
    pub fn with_provided(provided: HashMap<String, Value>) -> Self {
        Self {
            provided,
            resolved: HashMap::new(),
        }
    }

    fn child(&self, field: &str, value: Value) -> Self {
        let mut resolved = self.resolved.clone();
        resolved.insert(field.to_string(), value);
        Self {
            provided: self.provided.clone(),
            resolved,
        }
    }
}

/// The advice tree for one node: a recursive structure of single
/// resolutions, branch points, and terminal errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum FieldAdvice {
    /// This field resolves to exactly one value; `edge` is the advice
    /// tree for the next advisor in `order`, if any.
    Single {
        field: String,
        value: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        edge: Option<Box<FieldAdvice>>,
    },
    /// This field may resolve to any of `options`, each its own subtree.
    Branch { field: String, options: Vec<FieldAdvice> },
    /// The client-provided value for this field is invalid; no subtree
    /// follows.
    Error { field: String, message: String },
}

impl FieldAdvice {
    /// True if at least one path through this subtree reaches a leaf
    /// without hitting an `Error` — i.e. there is something a client
    /// could still pick that leads somewhere valid.
    pub fn has_good_options(&self) -> bool {
        match self {
            FieldAdvice::Error { .. } => false,
            FieldAdvice::Single { edge, .. } => edge.as_ref().map(|e| e.has_good_options()).unwrap_or(true),
            FieldAdvice::Branch { options, .. } => options.iter().any(|o| o.has_good_options()),
        }
    }

    /// Every error message anywhere in this subtree, depth-first.
    pub fn collect_error_messages(&self) -> Vec<String> {
        match self {
            FieldAdvice::Error { message, .. } => vec![message.clone()],
            FieldAdvice::Single { edge, .. } => edge.as_ref().map(|e| e.collect_error_messages()).unwrap_or_default(),
            FieldAdvice::Branch { options, .. } => options.iter().flat_map(|o| o.collect_error_messages()).collect(),
        }
    }

    /// The values a client could actually pick at this level that lead
    /// somewhere valid: for a `Single` node, its one value (unless its own
    /// edge is all-error); for a `Branch`, every option whose subtree has
    /// at least one good path, skipping the rest; an `Error` yields none.
    pub fn viable_options(&self) -> impl Iterator<Item = &Value> {
        let mut values = Vec::new();
        self.collect_viable_options(&mut values);
        values.into_iter()
    }

    fn collect_viable_options<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            FieldAdvice::Error { .. } => {}
            FieldAdvice::Single { value, edge, .. } => {
                if edge.as_ref().map(|e| e.has_good_options()).unwrap_or(true) {
                    out.push(value);
                }
            }
            FieldAdvice::Branch { options, .. } => {
                for option in options {
                    if option.has_good_options() {
                        option.collect_viable_options(out);
                    }
                }
            }
        }
    }

    /// Descend into the subtree reached by picking `value` at this level.
    /// For a `Single` node this only matches if `value` equals its own
    /// value; for a `Branch` it finds the matching option. Returns `None`
    /// if no option matches.
    pub fn select(&self, value: &Value) -> Option<&FieldAdvice> {
        match self {
            FieldAdvice::Single { value: v, edge, .. } if v == value => {
                Some(edge.as_deref().unwrap_or(self))
            }
            FieldAdvice::Branch { options, .. } => options.iter().find_map(|o| match o {
                FieldAdvice::Single { value: v, edge, .. } if v == value => {
                    Some(edge.as_deref().unwrap_or(o))
                }
                _ => None,
            }),
            _ => None,
        }
    }
}

/// Builds a [`FieldAdvice`] tree from an ordered list of [`AdvisorDef`]s.
pub struct AdviceBuilder {
    advisors: Vec<AdvisorDef>,
}

impl AdviceBuilder {
    pub fn new(mut advisors: Vec<AdvisorDef>) -> Self {
        advisors.sort_by_key(|a| a.order);
        Self { advisors }
    }

    /// Build the full tree starting from the first (lowest-`order`)
    /// advisor. Returns `None` if no advisors were declared — meaning the
    /// node is already fully specified and discovery has nothing to add.
    pub fn build(&self, ctx: &AdviceContext) -> Option<FieldAdvice> {
        if self.advisors.is_empty() {
            None
        } else {
            Some(self.build_from(0, ctx))
        }
    }

    fn next_edge(&self, idx: usize, ctx: &AdviceContext) -> Option<Box<FieldAdvice>> {
        if idx + 1 < self.advisors.len() {
            Some(Box::new(self.build_from(idx + 1, ctx)))
        } else {
            None
        }
    }

    fn build_from(&self, idx: usize, ctx: &AdviceContext) -> FieldAdvice {
        let advisor = &self.advisors[idx];
        let field = advisor.field.clone();

        match &advisor.advice {
            Advised::Literal(v) => {
                let child = ctx.child(&field, v.clone());
                FieldAdvice::Single {
                    field,
                    value: v.clone(),
                    edge: self.next_edge(idx, &child),
                }
            }

            Advised::OneOf {
                values,
                split_on_advice,
                break_on_advice,
            } => {
                if *split_on_advice {
                    let options = values
                        .iter()
                        .map(|v| {
                            let child = ctx.child(&field, v.clone());
                            let edge = if *break_on_advice { None } else { self.next_edge(idx, &child) };
                            FieldAdvice::Single {
                                field: field.clone(),
                                value: v.clone(),
                                edge,
                            }
                        })
                        .collect();
                    FieldAdvice::Branch { field, options }
                } else {
                    let value = Value::Array(values.clone());
                    let child = ctx.child(&field, value.clone());
                    let edge = if *break_on_advice { None } else { self.next_edge(idx, &child) };
                    FieldAdvice::Single { field, value, edge }
                }
            }

            Advised::SubsetOf { values } => match ctx.provided.get(&field) {
                Some(Value::Array(items)) => {
                    if items.iter().all(|item| values.contains(item)) {
                        let value = Value::Array(items.clone());
                        let child = ctx.child(&field, value.clone());
                        FieldAdvice::Single {
                            field,
                            value,
                            edge: self.next_edge(idx, &child),
                        }
                    } else {
                        FieldAdvice::Error {
                            field,
                            message: "provided value is not a subset of the advised values".to_string(),
                        }
                    }
                }
                Some(_) => FieldAdvice::Error {
                    field,
                    message: "provided value must be a list".to_string(),
                },
                None => {
                    let value = Value::Array(values.clone());
                    let child = ctx.child(&field, value.clone());
                    FieldAdvice::Single {
                        field,
                        value,
                        edge: self.next_edge(idx, &child),
                    }
                }
            },

            Advised::Dict { schema, allow_extras } => match ctx.provided.get(&field) {
                Some(Value::Object(map)) => {
                    let unknown = map.keys().find(|k| !schema.contains_key(k.as_str()));
                    if !*allow_extras && unknown.is_some() {
                        FieldAdvice::Error {
                            field,
                            message: format!("unexpected field '{}'", unknown.unwrap()),
                        }
                    } else {
                        let value = Value::Object(map.clone());
                        let child = ctx.child(&field, value.clone());
                        FieldAdvice::Single {
                            field,
                            value,
                            edge: self.next_edge(idx, &child),
                        }
                    }
                }
                Some(_) => FieldAdvice::Error {
                    field,
                    message: "provided value must be an object".to_string(),
                },
                None => {
                    let value = Value::Object(schema.clone().into_iter().collect());
                    let child = ctx.child(&field, value.clone());
                    FieldAdvice::Single {
                        field,
                        value,
                        edge: self.next_edge(idx, &child),
                    }
                }
            },

            Advised::DateRange { start, end } => {
                let provided_ts = ctx
                    .provided
                    .get(&field)
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|ts| ts.with_timezone(&Utc));
                match provided_ts {
                    Some(ts) if ts >= *start && ts <= *end => {
                        let value = Value::String(ts.to_rfc3339());
                        let child = ctx.child(&field, value.clone());
                        FieldAdvice::Single {
                            field,
                            value,
                            edge: self.next_edge(idx, &child),
                        }
                    }
                    Some(ts) => FieldAdvice::Error {
                        field,
                        message: format!("{} is outside the advised range", ts.to_rfc3339()),
                    },
                    None => {
                        let value = Value::String(start.to_rfc3339());
                        let child = ctx.child(&field, value.clone());
                        FieldAdvice::Single {
                            field,
                            value,
                            edge: self.next_edge(idx, &child),
                        }
                    }
                }
            }
        }
    }
}
