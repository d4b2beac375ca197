//! Named facial expressions as sparse morph-target weight tables.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the neutral expression. It carries no weights.
pub const DEFAULT_EXPRESSION: &str = "default";

/// Static table mapping an expression name to `(target, weight)` pairs.
///
/// Targets missing from an expression read as `0.0`, so every expression
/// implicitly relaxes the targets it does not mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionLibrary {
    expressions: BTreeMap<String, BTreeMap<String, f32>>,
}

impl Default for ExpressionLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExpressionLibrary {
    /// An empty library.
    pub fn empty() -> Self {
        Self {
            expressions: BTreeMap::new(),
        }
    }

    /// The stock expressions: `default`, `bigSmile` and `smallSmile`.
    pub fn builtin() -> Self {
        let mut lib = Self::empty();
        lib.insert(DEFAULT_EXPRESSION, std::iter::empty::<(&str, f32)>());
        lib.insert(
            "bigSmile",
            [
                ("browInnerUp", 0.5),
                ("eyeSquintLeft", 0.5),
                ("eyeSquintRight", 0.5),
                ("mouthSmileLeft", 0.7),
                ("mouthSmileRight", 0.7),
                ("noseSneerLeft", 0.5),
                ("noseSneerRight", 0.5),
                ("cheekPuff", 0.2),
            ],
        );
        lib.insert(
            "smallSmile",
            [
                ("browInnerUp", 0.3),
                ("eyeSquintLeft", 0.4),
                ("eyeSquintRight", 0.4),
                ("mouthSmileLeft", 0.6),
                ("mouthSmileRight", 0.6),
                ("noseSneerLeft", 0.2),
                ("noseSneerRight", 0.2),
                ("cheekPuff", 0.2),
            ],
        );
        lib
    }

    /// Add or replace an expression.
    pub fn insert<I, S>(&mut self, name: &str, weights: I)
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let table = weights
            .into_iter()
            .map(|(target, weight)| (target.into(), weight.clamp(0.0, 1.0)))
            .collect();
        self.expressions.insert(name.to_owned(), table);
    }

    /// Weight of `target` within `expression`, or `0.0` when either is unknown.
    pub fn weight(&self, expression: &str, target: &str) -> f32 {
        self.expressions
            .get(expression)
            .and_then(|table| table.get(target))
            .copied()
            .unwrap_or(0.0)
    }

    /// The sparse weight table for an expression.
    pub fn get(&self, expression: &str) -> Option<&BTreeMap<String, f32>> {
        self.expressions.get(expression)
    }

    pub fn contains(&self, expression: &str) -> bool {
        self.expressions.contains_key(expression)
    }

    /// Expression names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.expressions.keys().map(String::as_str)
    }

    /// Every target referenced by at least one expression.
    pub fn targets(&self) -> BTreeSet<&str> {
        self.expressions
            .values()
            .flat_map(|table| table.keys().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}

/// The ambient expression currently selected by the expression scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionState {
    /// Key into the [`ExpressionLibrary`].
    pub name: String,
    /// Multiplier applied to every weight of the expression.
    pub intensity: f32,
}

impl ExpressionState {
    pub fn new(name: impl Into<String>, intensity: f32) -> Self {
        Self {
            name: name.into(),
            intensity,
        }
    }
}

impl Default for ExpressionState {
    fn default() -> Self {
        Self::new(DEFAULT_EXPRESSION, 1.0)
    }
}
