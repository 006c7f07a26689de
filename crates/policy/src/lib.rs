//! Compliance decision engine: per-kind rule catalogues, configuration
//! resolvers and post-synthesis validators.
//!
//! Every rule is on unless listed in a [`DisabledRules`] set. An active rule
//! forces its governed fields to the compliant value and fails synthesis when
//! the synthesized resource does not comply; a disabled rule leaves the user's
//! value alone and its check always passes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use compliant_core::Misconfiguration;

/// Declares a closed rule catalogue for one resource kind. Each variant maps
/// to its kebab-case token and the AWS Config managed-rule name.
macro_rules! rules {
    ($(#[$meta:meta])* $name:ident, $kind:literal {
        $($variant:ident => $id:literal, $config:literal;)+
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name { $($variant),+ }

        impl $crate::Rule for $name {
            const KIND: &'static str = $kind;
            const ALL: &'static [Self] = &[$($name::$variant),+];
            fn id(self) -> &'static str { match self { $($name::$variant => $id),+ } }
            fn config_rule(self) -> &'static str { match self { $($name::$variant => $config),+ } }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::Rule::id(*self))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::RuleError;
            fn from_str(s: &str) -> Result<Self, Self::Err> { <$name as $crate::Rule>::parse(s) }
        }
    };
}

pub mod apigateway;
pub mod backup;
pub mod dynamodb;
pub mod lambda;
pub mod s3;

pub use apigateway::ApiGatewayRule;
pub use dynamodb::DynamoDbRule;
pub use lambda::LambdaRule;
pub use s3::S3Rule;

pub trait Rule: Copy + Ord + fmt::Debug + fmt::Display + 'static {
    /// Resource kind the catalogue belongs to, e.g. `dynamodb`.
    const KIND: &'static str;
    const ALL: &'static [Self];

    fn id(self) -> &'static str;
    fn config_rule(self) -> &'static str;

    /// Accepts the kebab-case token or the AWS Config rule name.
    fn parse(s: &str) -> Result<Self, RuleError> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.id() == s || r.config_rule() == s)
            .ok_or_else(|| RuleError::Unknown {
                kind: Self::KIND,
                given: s.to_string(),
                valid: Self::ALL.iter().map(|r| r.id()).collect(),
            })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown {kind} rule '{given}', expected one of: {}", .valid.join(", "))]
    Unknown { kind: &'static str, given: String, valid: Vec<&'static str> },
}

/// Rules opted out of for one resource instance. Empty means every rule applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledRules<R: Rule>(BTreeSet<R>);

impl<R: Rule> Default for DisabledRules<R> {
    fn default() -> Self { DisabledRules(BTreeSet::new()) }
}

impl<R: Rule> DisabledRules<R> {
    pub fn none() -> Self { Self::default() }

    pub fn of(rules: &[R]) -> Self { DisabledRules(rules.iter().copied().collect()) }

    pub fn parse<I, S>(ids: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter().map(|s| R::parse(s.as_ref())).collect::<Result<BTreeSet<_>, _>>().map(DisabledRules)
    }

    pub fn contains(&self, rule: R) -> bool { self.0.contains(&rule) }

    pub fn is_active(&self, rule: R) -> bool { !self.contains(rule) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = R> + '_ { self.0.iter().copied() }

    /// `Some(compliant)` while `rule` is active, the user's value otherwise.
    pub fn enforce<T>(&self, rule: R, user: Option<T>, compliant: T) -> Option<T> {
        if self.contains(rule) { user } else { Some(compliant) }
    }

    /// Emits one warning per opted-out rule for the construct at `path`.
    pub fn log_opt_outs(&self, path: &str) {
        for rule in self.iter() {
            tracing::warn!(construct = path, kind = R::KIND, rule = rule.id(), "compliance rule disabled");
        }
    }
}

impl<'de, R: Rule> Deserialize<'de> for DisabledRules<R> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let ids = Vec::<String>::deserialize(d)?;
        Self::parse(ids).map_err(serde::de::Error::custom)
    }
}

impl<R: Rule> Serialize for DisabledRules<R> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(self.iter().map(|r| r.id()))
    }
}

/// Collects diagnostics for one validator run. Checks of disabled rules are
/// skipped without being evaluated.
pub(crate) struct Findings<'a, R: Rule> {
    disabled: &'a DisabledRules<R>,
    messages: Vec<String>,
}

impl<'a, R: Rule> Findings<'a, R> {
    pub(crate) fn new(disabled: &'a DisabledRules<R>) -> Self { Findings { disabled, messages: Vec::new() } }

    pub(crate) fn check(&mut self, rule: R, compliant: impl FnOnce() -> bool, message: &str) {
        if self.disabled.is_active(rule) && !compliant() {
            self.messages.push(format!("{}: {message}", rule.id()));
        }
    }

    /// Like [`Findings::check`], but the predicate may report missing state.
    pub(crate) fn try_check(
        &mut self,
        rule: R,
        compliant: impl FnOnce() -> Result<bool, Misconfiguration>,
        message: &str,
    ) -> Result<(), Misconfiguration> {
        if self.disabled.is_active(rule) && !compliant()? {
            self.messages.push(format!("{}: {message}", rule.id()));
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<String> { self.messages }
}

/// `(token, AWS Config name)` for every rule of a kind.
pub fn catalogue<R: Rule>() -> Vec<(&'static str, &'static str)> {
    R::ALL.iter().map(|r| (r.id(), r.config_rule())).collect()
}
