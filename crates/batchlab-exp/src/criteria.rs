//! Batch criteria: dotted specification strings resolved to ordered axes of
//! experiment points, and their bivariate composition.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use batchlab_core::{BatchError, ErrorInfo, PipelineConfig, ValueKind};
use batchlab_doc::{DocumentTree, Mutation, Scalar};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the built-in population criteria.
pub const POPULATION_SIZE: &str = "population_size";

/// Cardinality used when a specification omits `.C<n>`.
pub const DEFAULT_CARDINALITY: usize = 10;

fn invalid(spec: &str, message: impl Into<String>) -> BatchError {
    BatchError::InvalidCriteriaParams(
        ErrorInfo::new("criteria.params", message).with_context("criteria", spec.to_string()),
    )
}

/// Point spacing of a numeric axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Spacing {
    /// Evenly spaced points.
    Linear,
    /// Powers of two, or geometric spacing when a cardinality is given.
    Log,
}

/// Parsed `<name>.<Linear|Log><bounds>[.C<n>]` specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisSpec {
    /// Registered criteria name.
    pub name: String,
    /// Spacing of the points.
    pub spacing: Spacing,
    /// Lower bound, when given as `<min>-<max>`.
    pub min: Option<u64>,
    /// Upper bound.
    pub max: u64,
    /// Number of points, when given.
    pub cardinality: Option<usize>,
}

fn parse_number<T: std::str::FromStr>(spec: &str, text: &str, what: &str) -> Result<T, BatchError> {
    text.parse::<T>()
        .map_err(|_| invalid(spec, format!("{what} `{text}` is not a non-negative integer")))
}

impl AxisSpec {
    /// Parses the grammar only; the name is not checked against a registry.
    pub fn parse(spec: &str) -> Result<Self, BatchError> {
        let parts: Vec<&str> = spec.trim().split('.').collect();
        if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(invalid(spec, "expected <name>.<Linear|Log><bounds>[.C<n>]"));
        }
        let (spacing, bounds) = if let Some(bounds) = parts[1].strip_prefix("Linear") {
            (Spacing::Linear, bounds)
        } else if let Some(bounds) = parts[1].strip_prefix("Log") {
            (Spacing::Log, bounds)
        } else {
            return Err(invalid(spec, format!("unknown spacing `{}`", parts[1])));
        };
        let (min, max) = match bounds.split_once('-') {
            Some((min, max)) => (Some(parse_number(spec, min, "min")?), parse_number(spec, max, "max")?),
            None => (None, parse_number(spec, bounds, "max")?),
        };
        let cardinality = match parts.get(2) {
            Some(part) => {
                let digits = part
                    .strip_prefix('C')
                    .ok_or_else(|| invalid(spec, format!("expected C<n>, found `{part}`")))?;
                Some(parse_number(spec, digits, "cardinality")?)
            }
            None => None,
        };
        Ok(Self {
            name: parts[0].to_string(),
            spacing,
            min,
            max,
            cardinality,
        })
    }

    fn raw_points(&self) -> Result<Vec<f64>, BatchError> {
        let spec = self.to_string();
        let max = self.max as f64;
        if self.cardinality == Some(0) {
            return Err(invalid(&spec, "cardinality must be at least 1"));
        }
        match (self.spacing, self.min) {
            (Spacing::Linear, None) => {
                if self.max == 0 {
                    return Err(invalid(&spec, "max must be positive"));
                }
                let n = self.cardinality.unwrap_or(DEFAULT_CARDINALITY);
                Ok((1..=n).map(|i| max * i as f64 / n as f64).collect())
            }
            (Spacing::Linear, Some(min)) => {
                let n = self.cardinality.unwrap_or(DEFAULT_CARDINALITY);
                if self.max <= min {
                    return Err(invalid(&spec, "max must be greater than min"));
                }
                if n < 2 {
                    return Err(invalid(&spec, "a bounded axis needs at least 2 points"));
                }
                let min = min as f64;
                let mut points: Vec<f64> = (0..n)
                    .map(|i| min + (max - min) * i as f64 / (n - 1) as f64)
                    .collect();
                points[n - 1] = max;
                Ok(points)
            }
            (Spacing::Log, min) if self.cardinality.is_none() => {
                let min = min.unwrap_or(1);
                if !self.max.is_power_of_two() || !min.is_power_of_two() {
                    return Err(invalid(&spec, "log bounds must be powers of two")
                        .with_hint("add .C<n> for geometric spacing between arbitrary bounds"));
                }
                if self.max < min {
                    return Err(invalid(&spec, "max must not be below min"));
                }
                let (lo, hi) = (min.trailing_zeros(), self.max.trailing_zeros());
                Ok((lo..=hi).map(|exp| (1u64 << exp) as f64).collect())
            }
            (Spacing::Log, min) => {
                let n = self.cardinality.unwrap_or(DEFAULT_CARDINALITY);
                let min = min.unwrap_or(1);
                if min == 0 {
                    return Err(invalid(&spec, "log spacing needs a positive min"));
                }
                if self.max <= min {
                    return Err(invalid(&spec, "max must be greater than min"));
                }
                if n < 2 {
                    return Err(invalid(&spec, "a bounded axis needs at least 2 points"));
                }
                let (lo, hi) = (min as f64, max);
                let ratio = (hi / lo).ln();
                let mut points: Vec<f64> = (0..n)
                    .map(|i| lo * (ratio * i as f64 / (n - 1) as f64).exp())
                    .collect();
                points[0] = lo;
                points[n - 1] = hi;
                Ok(points)
            }
        }
    }

    /// Axis values in order. Integer axes round to the nearest integer and
    /// reject specifications whose points collide after rounding.
    pub fn values(&self, kind: ValueKind) -> Result<Vec<Scalar>, BatchError> {
        let points = self.raw_points()?;
        match kind {
            ValueKind::Int => {
                let rounded: Vec<i64> = points.iter().map(|point| point.round() as i64).collect();
                if rounded.windows(2).any(|pair| pair[1] <= pair[0]) {
                    return Err(invalid(&self.to_string(), "points collide after rounding to integers")
                        .with_context("points", format!("{rounded:?}"))
                        .with_hint("lower the cardinality or widen the bounds"));
                }
                Ok(rounded.into_iter().map(Scalar::Int).collect())
            }
            ValueKind::Float => Ok(points.into_iter().map(Scalar::Float).collect()),
        }
    }
}

impl fmt::Display for AxisSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spacing = match self.spacing {
            Spacing::Linear => "Linear",
            Spacing::Log => "Log",
        };
        write!(f, "{}.{}", self.name, spacing)?;
        if let Some(min) = self.min {
            write!(f, "{min}-")?;
        }
        write!(f, "{}", self.max)?;
        if let Some(n) = self.cardinality {
            write!(f, ".C{n}")?;
        }
        Ok(())
    }
}

/// Attribute written by an axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisTarget {
    /// Element path.
    pub path: String,
    /// Attribute name.
    pub attr: String,
    /// Value kind.
    pub kind: ValueKind,
}

/// One generated experiment: its parameters and the edits that realise them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPoint {
    /// Human readable label, e.g. `population_size=10`.
    pub label: String,
    /// Criteria name to value.
    pub params: BTreeMap<String, Scalar>,
    /// Edits applied to the template, in order.
    pub mutations: Vec<Mutation>,
}

/// Named criteria and the attribute each one drives.
#[derive(Debug, Clone, Default)]
pub struct CriteriaRegistry {
    axes: BTreeMap<String, Option<AxisTarget>>,
}

impl CriteriaRegistry {
    /// Registry holding `population_size` plus the axes declared in `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut registry = Self::default();
        let population = config.engine.population.as_ref().map(|target| AxisTarget {
            path: target.path.clone(),
            attr: target.attr.clone(),
            kind: ValueKind::Int,
        });
        registry.axes.insert(POPULATION_SIZE.to_string(), population);
        for (name, spec) in &config.criteria {
            registry.register(
                name.clone(),
                AxisTarget {
                    path: spec.path.clone(),
                    attr: spec.attr.clone(),
                    kind: spec.kind,
                },
            );
        }
        registry
    }

    /// Adds or replaces an axis.
    pub fn register(&mut self, name: impl Into<String>, target: AxisTarget) {
        self.axes.insert(name.into(), Some(target));
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(String::as_str)
    }

    /// Resolves a specification string to a concrete criteria.
    pub fn parse(&self, spec: &str) -> Result<Criteria, BatchError> {
        let name = spec.trim().split('.').next().unwrap_or_default();
        let target = self.axes.get(name).ok_or_else(|| {
            BatchError::UnknownCriteria(
                ErrorInfo::new("criteria.unknown", "criteria name is not registered")
                    .with_context("criteria", spec.to_string())
                    .with_hint(format!(
                        "registered: {}",
                        self.names().collect::<Vec<_>>().join(", ")
                    )),
            )
        })?;
        let axis = AxisSpec::parse(spec)?;
        let kind = target.as_ref().map(|target| target.kind).unwrap_or_default();
        let values = axis.values(kind)?;
        debug!(criteria = %axis, points = values.len(), "parsed criteria");
        Ok(Criteria {
            axis,
            target: target.clone(),
            values,
        })
    }
}

/// A resolved single-axis criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    axis: AxisSpec,
    target: Option<AxisTarget>,
    values: Vec<Scalar>,
}

impl Criteria {
    /// Criteria name.
    pub fn name(&self) -> &str {
        &self.axis.name
    }

    /// Parsed specification.
    pub fn axis(&self) -> &AxisSpec {
        &self.axis
    }

    /// Attribute written by the axis, if any.
    pub fn target(&self) -> Option<&AxisTarget> {
        self.target.as_ref()
    }

    /// Axis values in order.
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the axis has no points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expands the axis against `template`. Pure: the same inputs always give
    /// the same ordered points.
    pub fn expand(&self, template: &DocumentTree) -> Result<Vec<ExperimentPoint>, BatchError> {
        if let Some(target) = &self.target {
            if template.resolve(&target.path)?.is_empty() {
                return Err(BatchError::PathNotFound(
                    ErrorInfo::new("criteria.target", "criteria target is absent from the template")
                        .with_context("criteria", self.axis.to_string())
                        .with_context("path", target.path.clone()),
                ));
            }
        }
        let name = self.name();
        Ok(self
            .values
            .iter()
            .map(|value| ExperimentPoint {
                label: format!("{name}={value}"),
                params: BTreeMap::from([(name.to_string(), value.clone())]),
                mutations: self
                    .target
                    .iter()
                    .map(|target| Mutation::set_attribute(&target.path, &target.attr, value.clone()))
                    .collect(),
            })
            .collect())
    }
}

fn mutation_key(mutation: &Mutation) -> String {
    match mutation {
        Mutation::SetAttribute { path, attr, .. } => format!("{path}@{attr}"),
        Mutation::AddElement { parent, tag, .. } => format!("{parent}/{tag}"),
        Mutation::ChangeTag { path, .. } | Mutation::RemoveElement { path } => path.clone(),
    }
}

fn footprint(points: &[ExperimentPoint]) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut targets = BTreeSet::new();
    let mut params = BTreeSet::new();
    for point in points {
        targets.extend(point.mutations.iter().map(mutation_key));
        params.extend(point.params.keys().cloned());
    }
    (targets, params)
}

/// Cross product of two axes, row-major: `axis1` outer, `axis2` inner.
pub fn compose(
    axis1: &[ExperimentPoint],
    axis2: &[ExperimentPoint],
) -> Result<Vec<ExperimentPoint>, BatchError> {
    let (targets1, params1) = footprint(axis1);
    let (targets2, params2) = footprint(axis2);
    let shared: Vec<&String> = targets1
        .intersection(&targets2)
        .chain(params1.intersection(&params2))
        .collect();
    if !shared.is_empty() {
        return Err(BatchError::InvalidCriteriaParams(
            ErrorInfo::new("criteria.overlap", "bivariate axes modify the same target")
                .with_context("targets", format!("{shared:?}")),
        ));
    }
    let mut points = Vec::with_capacity(axis1.len() * axis2.len());
    for outer in axis1 {
        for inner in axis2 {
            let mut params = outer.params.clone();
            params.extend(inner.params.clone());
            let mut mutations = outer.mutations.clone();
            mutations.extend(inner.mutations.iter().cloned());
            points.push(ExperimentPoint {
                label: format!("{}, {}", outer.label, inner.label),
                params,
                mutations,
            });
        }
    }
    Ok(points)
}

/// Recovers `(i, j)` from a row-major flat index over an inner axis of `len2` points.
pub fn grid_index(flat: usize, len2: usize) -> (usize, usize) {
    match (flat.checked_div(len2), flat.checked_rem(len2)) {
        (Some(i), Some(j)) => (i, j),
        _ => (flat, 0),
    }
}

/// The criteria driving one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchCriteria {
    /// One axis.
    Univariate(Criteria),
    /// Cross product of two axes.
    Bivariate(Criteria, Criteria),
}

impl BatchCriteria {
    /// Resolves one or two specification strings.
    pub fn parse<S: AsRef<str>>(registry: &CriteriaRegistry, specs: &[S]) -> Result<Self, BatchError> {
        match specs {
            [one] => Ok(BatchCriteria::Univariate(registry.parse(one.as_ref())?)),
            [one, two] => Ok(BatchCriteria::Bivariate(
                registry.parse(one.as_ref())?,
                registry.parse(two.as_ref())?,
            )),
            _ => Err(BatchError::InvalidCriteriaParams(
                ErrorInfo::new("criteria.arity", "expected one or two criteria")
                    .with_context("count", specs.len().to_string()),
            )),
        }
    }

    /// Canonical specification strings.
    pub fn specs(&self) -> Vec<String> {
        match self {
            BatchCriteria::Univariate(axis) => vec![axis.axis().to_string()],
            BatchCriteria::Bivariate(first, second) => {
                vec![first.axis().to_string(), second.axis().to_string()]
            }
        }
    }

    /// Points per axis.
    pub fn dimensions(&self) -> Vec<usize> {
        match self {
            BatchCriteria::Univariate(axis) => vec![axis.len()],
            BatchCriteria::Bivariate(first, second) => vec![first.len(), second.len()],
        }
    }

    /// Grid coordinates of a flat experiment index.
    pub fn grid_index(&self, flat: usize) -> (usize, usize) {
        match self {
            BatchCriteria::Univariate(_) => (flat, 0),
            BatchCriteria::Bivariate(_, second) => grid_index(flat, second.len()),
        }
    }

    /// Ordered experiment points of the batch.
    pub fn expand(&self, template: &DocumentTree) -> Result<Vec<ExperimentPoint>, BatchError> {
        match self {
            BatchCriteria::Univariate(axis) => axis.expand(template),
            BatchCriteria::Bivariate(first, second) => {
                compose(&first.expand(template)?, &second.expand(template)?)
            }
        }
    }
}
