//! # Chain Rewriter
//!
//! Collapses a rule's eligible steps into one reference to a pool delegate.
//!
//! Every eligible step maps to the same delegate reference, so the
//! order-preserving deduplication leaves exactly one reference, at the
//! position of the first eligible step. Auxiliary fields of eligible wrapped
//! steps (anything besides `loader` and `options`) move onto that reference;
//! when two steps set the same field, the earlier one wins. Other steps are
//! kept as they are. The rewritten chain is always written under `use`.

use crate::eligibility::EligibilityPattern;
use crate::identifier::{self, IdentityScope};
use crate::normalizer::ChainNormalizer;
use crate::options::RewriteOptions;
use crate::{
    CachePolicy, Chain, CompilationRule, OffloadError, PoolDelegateRegistration, RuleId, Step,
    WrappedStep,
};

/// The result of rewriting one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    /// The rule to put in place of the original.
    pub rule: CompilationRule,
    /// The delegate to register, if anything was offloaded.
    pub registration: Option<PoolDelegateRegistration>,
}

impl Rewrite {
    /// A rule left as it was.
    #[must_use]
    pub fn unchanged(rule: CompilationRule) -> Self {
        Self {
            rule,
            registration: None,
        }
    }

    /// Check if the rule was left as it was.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.registration.is_none()
    }
}

/// Rewrites rules under one set of [`RewriteOptions`].
#[derive(Debug, Clone)]
pub struct ChainRewriter {
    pattern: EligibilityPattern,
    delegate_step: String,
    policy: CachePolicy,
    identity: IdentityScope,
}

impl ChainRewriter {
    /// Compile the options into a rewriter.
    ///
    /// # Errors
    /// Returns `OffloadError::InvalidPattern` if the eligible prefixes do not compile.
    pub fn new(options: &RewriteOptions) -> Result<Self, OffloadError> {
        Ok(Self {
            pattern: EligibilityPattern::new(&options.eligible_prefixes)?,
            delegate_step: options.delegate_step.clone(),
            policy: options.cache_policy.clone(),
            identity: options.identity,
        })
    }

    /// The compiled eligibility pattern.
    #[must_use]
    pub fn pattern(&self) -> &EligibilityPattern {
        &self.pattern
    }

    /// Normalize, filter, name and rewrite one rule.
    ///
    /// Rules without eligible steps come back unchanged, with no registration.
    pub fn process(&self, rule: &CompilationRule) -> Result<Rewrite, OffloadError> {
        let chain = ChainNormalizer::normalize(rule)?;
        let eligible = self.pattern.filter(&chain);

        if eligible.is_empty() {
            tracing::trace!(test = rule.test.source(), "no eligible steps");
            return Ok(Rewrite::unchanged(rule.clone()));
        }

        let id = identifier::rule_id(rule, self.identity)?;
        tracing::debug!(
            id = %id,
            eligible = eligible.len(),
            chain = chain.len(),
            "offloading rule"
        );
        self.rewrite(rule, &chain, &eligible, &id)
    }

    /// Replace the rule's chain and build its registration.
    ///
    /// `chain` is the rule's normalized chain, `eligible` the steps selected
    /// from it. An empty `eligible` list short-circuits.
    pub fn rewrite(
        &self,
        rule: &CompilationRule,
        chain: &[Step],
        eligible: &[Step],
        id: &RuleId,
    ) -> Result<Rewrite, OffloadError> {
        if eligible.is_empty() {
            return Ok(Rewrite::unchanged(rule.clone()));
        }

        let merged = self.merge_chain(chain, eligible, id);
        let mut rewritten = rule.clone();
        rewritten.clear_chain();
        rewritten.use_ = Some(
            serde_json::to_value(&merged)
                .map_err(|e| OffloadError::SerializationError(e.to_string()))?,
        );

        Ok(Rewrite {
            rule: rewritten,
            registration: Some(PoolDelegateRegistration::new(
                id.clone(),
                eligible.to_vec(),
                &self.policy,
            )),
        })
    }

    /// Substitute eligible steps and deduplicate, preserving first occurrences.
    #[must_use]
    pub fn merge_chain(&self, chain: &[Step], eligible: &[Step], id: &RuleId) -> Chain {
        let is_eligible = |step: &Step| eligible.contains(&step.execution_view());

        let mut delegate = WrappedStep::delegate(&self.delegate_step, id);
        for step in chain {
            if let Step::Wrapped(original) = step
                && is_eligible(step)
            {
                for (key, value) in &original.extra {
                    delegate
                        .extra
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
        let reference = Step::Wrapped(delegate);

        let mut merged = Chain::with_capacity(chain.len());
        for step in chain {
            let next = if is_eligible(step) {
                reference.clone()
            } else {
                step.clone()
            };
            if !merged.contains(&next) {
                merged.push(next);
            }
        }

        merged
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainField;
    use serde_json::{Value, json};

    fn rewriter(prefixes: &[&str]) -> ChainRewriter {
        ChainRewriter::new(&RewriteOptions::new().with_prefixes(prefixes.iter().copied()))
            .expect("rewriter")
    }

    fn reference(id: &str) -> Value {
        json!({"loader": "happypack/loader", "options": {"id": id}})
    }

    #[test]
    fn standard_rule() {
        let rule =
            CompilationRule::new("\\.jsx?$").with_chain(ChainField::Loader, json!("babel-loader"));
        let chain = vec![Step::bare("babel-loader")];
        let id = RuleId::new("jsx-123");

        let rewrite = rewriter(&["babel-loader"])
            .rewrite(&rule, &chain, &chain, &id)
            .expect("rewrite");

        assert!(rewrite.rule.loader.is_none());
        assert_eq!(rewrite.rule.use_, Some(json!([reference("jsx-123")])));
        let registration = rewrite.registration.expect("registration");
        assert_eq!(registration.id, id);
        assert_eq!(registration.steps, chain);
    }

    #[test]
    fn multiple_loaders_keep_uneligible_steps() {
        let rule = CompilationRule::new("\\.jsx?$")
            .with_chain(ChainField::Loaders, json!(["babel-loader", "css-loader"]));
        let chain = vec![Step::bare("babel-loader"), Step::bare("css-loader")];

        let rewrite = rewriter(&["babel-loader"])
            .rewrite(&rule, &chain, &chain[..1], &RuleId::new("jsx-123"))
            .expect("rewrite");

        assert!(rewrite.rule.loaders.is_none());
        assert_eq!(
            rewrite.rule.use_,
            Some(json!([reference("jsx-123"), "css-loader"]))
        );
    }

    #[test]
    fn multiple_eligible_loaders_collapse() {
        let rule = CompilationRule::new("\\.jsx?$")
            .with_chain(ChainField::Loaders, json!(["babel-loader", "css-loader"]));
        let chain = vec![Step::bare("babel-loader"), Step::bare("css-loader")];

        let rewrite = rewriter(&["babel-loader", "css-loader"])
            .rewrite(&rule, &chain, &chain, &RuleId::new("jsx-123"))
            .expect("rewrite");

        assert_eq!(rewrite.rule.use_, Some(json!([reference("jsx-123")])));
        assert_eq!(rewrite.registration.expect("registration").steps, chain);
    }

    #[test]
    fn wrapped_step_keeps_auxiliary_fields() {
        let rewriter = rewriter(&["css-loader"]);
        let rule = CompilationRule::new("\\.css$").with_chain(
            ChainField::Loaders,
            json!([{"loader": "css-loader", "foo": "bar"}, {"loader": "postcss-loader"}]),
        );

        let rewrite = rewriter.process(&rule).expect("process");
        let id = rewrite.registration.as_ref().map(|r| r.id.clone()).expect("id");

        assert_eq!(
            rewrite.rule.use_,
            Some(json!([
                {"loader": "happypack/loader", "options": {"id": id.as_str()}, "foo": "bar"},
                {"loader": "postcss-loader"}
            ]))
        );
        assert_eq!(
            rewrite.registration.map(|r| r.steps),
            Some(vec![Step::wrapped("css-loader")])
        );
    }

    #[test]
    fn wrapped_step_with_fields_still_collapses_to_one_reference() {
        let rule = CompilationRule::new("\\.js$").with_chain(
            ChainField::Use,
            json!(["babel-loader", "style-loader", {"loader": "css-loader", "foo": "bar"}]),
        );

        let rewrite = rewriter(&["babel-loader", "css-loader"])
            .process(&rule)
            .expect("process");
        let registration = rewrite.registration.expect("registration");

        assert_eq!(
            rewrite.rule.use_,
            Some(json!([
                {
                    "loader": "happypack/loader",
                    "options": {"id": registration.id.as_str()},
                    "foo": "bar"
                },
                "style-loader"
            ]))
        );
        assert_eq!(
            registration.steps,
            vec![Step::bare("babel-loader"), Step::wrapped("css-loader")]
        );
    }

    #[test]
    fn earlier_auxiliary_field_wins() {
        let rule = CompilationRule::new("\\.css$").with_chain(
            ChainField::Use,
            json!([
                {"loader": "css-loader", "foo": "first"},
                {"loader": "babel-loader", "foo": "second", "bar": 1}
            ]),
        );

        let rewrite = rewriter(&["babel-loader", "css-loader"])
            .process(&rule)
            .expect("process");
        let chain = ChainNormalizer::normalize(&rewrite.rule).expect("normalize");

        assert_eq!(chain.len(), 1);
        let reference = serde_json::to_value(&chain[0]).expect("serialize");
        assert_eq!(reference["loader"], json!("happypack/loader"));
        assert_eq!(reference["foo"], json!("first"));
        assert_eq!(reference["bar"], json!(1));
    }

    #[test]
    fn wrapped_options_are_replaced_by_delegate_id() {
        let rewriter = rewriter(&["css-loader"]);
        let rule = CompilationRule::new("\\.css$").with_chain(
            ChainField::Use,
            json!([{"loader": "css-loader", "options": {"modules": true}}]),
        );

        let rewrite = rewriter.process(&rule).expect("process");
        let registration = rewrite.registration.expect("registration");

        assert_eq!(
            rewrite.rule.use_,
            Some(json!([reference(registration.id.as_str())]))
        );
        assert_eq!(
            serde_json::to_value(&registration.steps).expect("serialize"),
            json!([{"loader": "css-loader", "options": {"modules": true}}])
        );
    }

    #[test]
    fn non_contiguous_steps_collapse_at_first_position() {
        let rule = CompilationRule::new("\\.js$")
            .with_chain(ChainField::Use, json!(["a", "babel-loader", "b", "css-loader", "c"]));

        let rewrite = rewriter(&["babel-loader", "css-loader"])
            .process(&rule)
            .expect("process");
        let id = rewrite.registration.as_ref().map(|r| r.id.clone()).expect("id");

        assert_eq!(
            rewrite.rule.use_,
            Some(json!(["a", reference(id.as_str()), "b", "c"]))
        );
    }

    #[test]
    fn no_eligible_steps_leaves_rule_untouched() {
        let rule =
            CompilationRule::new("\\.jsx?$").with_chain(ChainField::Loader, json!("babel-loader"));
        let rewrite = rewriter(&["css-loader"]).process(&rule).expect("process");

        assert!(rewrite.is_unchanged());
        assert_eq!(rewrite.rule, rule);
    }

    #[test]
    fn rule_without_chain_is_untouched() {
        let rule = CompilationRule::new("\\.txt$").with_field("type", json!("asset"));
        let rewrite = rewriter(&["babel-loader"]).process(&rule).expect("process");
        assert!(rewrite.is_unchanged());
    }

    #[test]
    fn other_fields_survive() {
        let rule = CompilationRule::new("\\.jsx?$")
            .with_chain(ChainField::Loader, json!("babel-loader"))
            .with_field("exclude", json!("node_modules"));
        let rewrite = rewriter(&["babel-loader"]).process(&rule).expect("process");
        assert_eq!(rewrite.rule.extra.get("exclude"), Some(&json!("node_modules")));
    }

    #[test]
    fn malformed_rule_fails() {
        let rule = CompilationRule::new("x")
            .with_chain(ChainField::Loader, json!("babel-loader"))
            .with_chain(ChainField::Loaders, json!(["babel-loader"]));
        assert!(matches!(
            rewriter(&["babel-loader"]).process(&rule),
            Err(OffloadError::AmbiguousChain { .. })
        ));
    }

    #[test]
    fn registration_carries_cache_policy() {
        let policy = CachePolicy {
            cache: false,
            ..CachePolicy::default()
        };
        let rewriter = ChainRewriter::new(
            &RewriteOptions::new()
                .with_prefixes(["babel-loader"])
                .with_cache_policy(policy),
        )
        .expect("rewriter");

        let rule =
            CompilationRule::new("\\.js$").with_chain(ChainField::Use, json!(["babel-loader"]));
        let registration = rewriter
            .process(&rule)
            .expect("process")
            .registration
            .expect("registration");
        assert!(!registration.cache);
    }
}
