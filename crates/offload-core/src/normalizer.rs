//! # Chain Normalizer
//!
//! Flattens a rule's chain field into an ordered list of steps.
//!
//! Accepted shapes, under `loader`, `loaders` or `use`:
//! - a plain string, split on `!` (`"style!css"` → `style`, `css`)
//! - a step object with a string `loader` field (never split)
//! - an array of the above, optionally nested one level deep

use crate::primitives::STEP_SEPARATOR;
use crate::{Chain, ChainField, CompilationRule, OffloadError, Step, WrappedStep};
use serde_json::Value;

/// The ChainNormalizer maps every chain syntax onto [`Step`].
pub struct ChainNormalizer;

impl ChainNormalizer {
    /// Locate the field a rule declares its chain under.
    ///
    /// Fields are probed in [`ChainField::PRECEDENCE`] order. Returns `Ok(None)`
    /// when no chain field is populated.
    ///
    /// # Errors
    /// Returns `OffloadError::AmbiguousChain` if more than one field is populated.
    pub fn locate(rule: &CompilationRule) -> Result<Option<(ChainField, &Value)>, OffloadError> {
        let populated: Vec<(ChainField, &Value)> = ChainField::PRECEDENCE
            .iter()
            .filter_map(|&field| rule.chain_field(field).map(|value| (field, value)))
            .collect();

        match populated.as_slice() {
            [] => Ok(None),
            [(field, value)] => Ok(Some((*field, *value))),
            _ => Err(OffloadError::AmbiguousChain {
                fields: populated.iter().map(|(field, _)| field.as_str()).collect(),
            }),
        }
    }

    /// Produce the rule's chain. A rule without a chain yields an empty chain.
    pub fn normalize(rule: &CompilationRule) -> Result<Chain, OffloadError> {
        match Self::locate(rule)? {
            Some((_, value)) => Self::flatten(value),
            None => Ok(Chain::new()),
        }
    }

    /// Normalize a raw chain value.
    pub fn flatten(value: &Value) -> Result<Chain, OffloadError> {
        let mut chain = Chain::new();
        match value {
            Value::Array(entries) => {
                for entry in entries {
                    match entry {
                        Value::Array(nested) => {
                            for inner in nested {
                                Self::push_entry(inner, &mut chain)?;
                            }
                        }
                        other => Self::push_entry(other, &mut chain)?,
                    }
                }
            }
            other => Self::push_entry(other, &mut chain)?,
        }
        Ok(chain)
    }

    /// Split an inline-chained string into bare steps.
    ///
    /// Empty segments (`"a!!b"`, a trailing `!`) are dropped.
    pub fn split_inline(source: &str) -> impl Iterator<Item = Step> + '_ {
        source
            .split(STEP_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .map(Step::bare)
    }

    fn push_entry(entry: &Value, chain: &mut Chain) -> Result<(), OffloadError> {
        match entry {
            Value::String(source) => {
                chain.extend(Self::split_inline(source));
                Ok(())
            }
            Value::Object(_) => {
                let step: WrappedStep = serde_json::from_value(entry.clone())
                    .map_err(|_| OffloadError::UnrecognizedStep(entry.to_string()))?;
                chain.push(Step::Wrapped(step));
                Ok(())
            }
            other => Err(OffloadError::UnrecognizedStep(other.to_string())),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bare(names: &[&str]) -> Chain {
        names.iter().map(|n| Step::bare(*n)).collect()
    }

    fn rule(field: ChainField, chain: Value) -> CompilationRule {
        CompilationRule::new("\\.js$").with_chain(field, chain)
    }

    #[test]
    fn splits_inline_chains() {
        let chain = ChainNormalizer::normalize(&rule(ChainField::Loader, json!("foo!bar!baz")))
            .expect("normalize");
        assert_eq!(chain, bare(&["foo", "bar", "baz"]));

        let chain = ChainNormalizer::normalize(&rule(
            ChainField::Loader,
            json!(["foo!bar!baz", "foo"]),
        ))
        .expect("normalize");
        assert_eq!(chain, bare(&["foo", "bar", "baz", "foo"]));
    }

    #[test]
    fn reads_every_chain_field() {
        for field in ChainField::PRECEDENCE {
            let single = ChainNormalizer::normalize(&rule(field, json!("foo"))).expect("single");
            assert_eq!(single, bare(&["foo"]));

            let many =
                ChainNormalizer::normalize(&rule(field, json!(["foo", "bar"]))).expect("many");
            assert_eq!(many, bare(&["foo", "bar"]));
        }
    }

    #[test]
    fn empty_rule_yields_empty_chain() {
        let chain = ChainNormalizer::normalize(&CompilationRule::new("x")).expect("normalize");
        assert!(chain.is_empty());
    }

    #[test]
    fn wrapped_names_are_not_split() {
        let chain = ChainNormalizer::normalize(&rule(
            ChainField::Use,
            json!([{"loader": "style!css", "foo": "bar"}, "post"]),
        ))
        .expect("normalize");
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].name(), "style!css");
        assert!(chain[0].is_wrapped());
        assert_eq!(chain[1], Step::bare("post"));
    }

    #[test]
    fn single_wrapped_object_is_one_step() {
        let chain = ChainNormalizer::normalize(&rule(
            ChainField::Loader,
            json!({"loader": "css-loader", "options": {"modules": true}}),
        ))
        .expect("normalize");
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "css-loader");
    }

    #[test]
    fn nested_arrays_flatten_one_level() {
        let chain = ChainNormalizer::normalize(&rule(
            ChainField::Use,
            json!(["a", ["b!c", {"loader": "d"}]]),
        ))
        .expect("normalize");
        assert_eq!(
            chain.iter().map(Step::name).collect::<Vec<_>>(),
            vec!["a", "b", "c", "d"]
        );

        let deep = ChainNormalizer::normalize(&rule(ChainField::Use, json!(["a", [["b"]]])));
        assert!(matches!(deep, Err(OffloadError::UnrecognizedStep(_))));
    }

    #[test]
    fn drops_empty_segments() {
        let chain =
            ChainNormalizer::normalize(&rule(ChainField::Loader, json!("a!!b!"))).expect("ok");
        assert_eq!(chain, bare(&["a", "b"]));
    }

    #[test]
    fn rejects_multiple_chain_fields() {
        let rule = CompilationRule::new("x")
            .with_chain(ChainField::Loader, json!("a"))
            .with_chain(ChainField::Use, json!(["b"]));
        match ChainNormalizer::locate(&rule) {
            Err(OffloadError::AmbiguousChain { fields }) => {
                assert_eq!(fields, vec!["loader", "use"]);
            }
            other => unreachable!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unrecognized_entries() {
        for bad in [json!(42), json!([true]), json!([{"options": {}}]), json!(null)] {
            let result = ChainNormalizer::flatten(&bad);
            assert!(
                matches!(result, Err(OffloadError::UnrecognizedStep(_))),
                "{bad} should be rejected"
            );
        }
    }
}
