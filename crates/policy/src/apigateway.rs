use serde_json::Value as Json;

use compliant_aws::apigateway::{EndpointType, MethodLoggingLevel, RestApiProps, StageOptions};
use compliant_core::{references, Misconfiguration, Resource, ResourceId, Stack, Validation};

use crate::{DisabledRules, Findings};

rules! {
    /// REST API and stage rules.
    ApiGatewayRule, "apigateway" {
        EndpointTypeCheck => "endpoint-type-check", "API_GW_ENDPOINT_TYPE_CHECK";
        CacheEnabledAndEncrypted => "cache-enabled-and-encrypted", "API_GW_CACHE_ENABLED_AND_ENCRYPTED";
        ExecutionLoggingEnabled => "execution-logging-enabled", "API_GW_EXECUTION_LOGGING_ENABLED";
        DomainRequired => "domain-required", "API_GW_DOMAIN_REQUIRED";
        AssociatedWithWaf => "associated-with-waf", "API_GW_ASSOCIATED_WITH_WAF";
    }
}

use ApiGatewayRule::*;

/// Keeps the requested endpoint types, falling back to `EDGE` when none are given.
pub fn resolve_endpoint_types(
    user: Option<Vec<EndpointType>>,
    disabled: &DisabledRules<ApiGatewayRule>,
) -> Option<Vec<EndpointType>> {
    if disabled.contains(EndpointTypeCheck) {
        return user;
    }
    match user {
        Some(types) if !types.is_empty() => Some(types),
        _ => Some(vec![EndpointType::Edge]),
    }
}

/// Merges the sub-fields forced by the cache and logging rules into the
/// user's stage options. The two rules own disjoint fields.
pub fn resolve_stage_options(
    user: Option<StageOptions>,
    disabled: &DisabledRules<ApiGatewayRule>,
) -> Option<StageOptions> {
    let cache = disabled.is_active(CacheEnabledAndEncrypted);
    let logging = disabled.is_active(ExecutionLoggingEnabled);
    if !cache && !logging {
        return user;
    }
    let mut opts = user.unwrap_or_default();
    if cache {
        opts.caching_enabled = Some(true);
        opts.cache_data_encrypted = Some(true);
        opts.cache_cluster_enabled = Some(true);
    }
    if logging {
        opts.logging_level = Some(MethodLoggingLevel::Info);
    }
    tracing::debug!(cache, logging, "resolved stage options");
    Some(opts)
}

pub fn resolve_rest_api(props: &RestApiProps, disabled: &DisabledRules<ApiGatewayRule>) -> RestApiProps {
    RestApiProps {
        endpoint_types: resolve_endpoint_types(props.endpoint_types.clone(), disabled),
        deploy_options: resolve_stage_options(props.deploy_options.clone(), disabled),
        ..props.clone()
    }
}

const VALID_ENDPOINT_TYPES: [&str; 3] = ["EDGE", "REGIONAL", "PRIVATE"];

fn lookup<'a>(stack: &'a Stack, id: &ResourceId) -> Result<&'a Resource, Misconfiguration> {
    stack.get(id).ok_or_else(|| Misconfiguration::new(format!("resource '{id}' is not in the stack")))
}

fn endpoint_types_valid(api: &Resource) -> Result<bool, Misconfiguration> {
    let config = api
        .prop("EndpointConfiguration")
        .ok_or_else(|| Misconfiguration::new(format!("rest api '{}' has no endpoint configuration", api.id)))?;
    let types = config.get("Types").and_then(Json::as_array).cloned().unwrap_or_default();
    Ok(types.iter().all(|t| t.as_str().is_some_and(|t| VALID_ENDPOINT_TYPES.contains(&t))))
}

/// The method setting covering every method of the stage (`*` on `/*`).
fn catch_all_setting(stage: &Resource) -> Option<&Json> {
    stage.prop("MethodSettings")?.as_array()?.iter().find(|m| {
        m.get("HttpMethod").and_then(Json::as_str) == Some("*") && m.get("ResourcePath").and_then(Json::as_str) == Some("/*")
    })
}

fn cache_enabled_and_encrypted(stage: &Resource) -> bool {
    let flag = |v: Option<&Json>| v.and_then(Json::as_bool).unwrap_or(false);
    flag(stage.prop("CacheClusterEnabled"))
        && catch_all_setting(stage).is_some_and(|m| flag(m.get("CachingEnabled")) && flag(m.get("CacheDataEncrypted")))
}

fn execution_logging_enabled(stage: &Resource) -> Result<bool, Misconfiguration> {
    let level = catch_all_setting(stage)
        .and_then(|m| m.get("LoggingLevel"))
        .and_then(Json::as_str)
        .ok_or_else(|| Misconfiguration::new(format!("stage '{}' has no execution logging level", stage.id)))?;
    Ok(matches!(level, "ERROR" | "INFO"))
}

fn associated_with_waf(stack: &Stack, stage: &ResourceId) -> bool {
    stack
        .of_type("AWS::WAFv2::WebACLAssociation")
        .any(|a| a.prop("ResourceArn").is_some_and(|arn| references(arn).contains(stage)))
}

fn check_stage(findings: &mut Findings<'_, ApiGatewayRule>, stack: &Stack, stage: &ResourceId) -> Result<(), Misconfiguration> {
    let synthesized = lookup(stack, stage)?;
    findings.check(CacheEnabledAndEncrypted, || cache_enabled_and_encrypted(synthesized),
        "stage cache must be enabled and encrypted for all methods");
    findings.try_check(ExecutionLoggingEnabled, || execution_logging_enabled(synthesized),
        "execution logging must be ERROR or INFO for all methods")?;
    findings.check(AssociatedWithWaf, || associated_with_waf(stack, stage),
        "stage must be associated with a WAFv2 web ACL");
    Ok(())
}

/// Checks for a REST API and, when it deploys one, its default stage.
#[derive(Debug, Clone)]
pub struct RestApiValidator {
    pub api: ResourceId,
    pub stage: Option<ResourceId>,
    pub props: RestApiProps,
    pub disabled: DisabledRules<ApiGatewayRule>,
}

impl Validation for RestApiValidator {
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration> {
        let mut findings = Findings::new(&self.disabled);
        let api = lookup(stack, &self.api)?;
        findings.try_check(EndpointTypeCheck, || endpoint_types_valid(api),
            "endpoint types must be EDGE, REGIONAL or PRIVATE")?;
        if let Some(stage) = &self.stage {
            check_stage(&mut findings, stack, stage)?;
        }
        findings.check(DomainRequired,
            || self.props.domain_name.is_some() && self.props.disable_execute_api_endpoint == Some(true),
            "a custom domain is required and the default execute-api endpoint must be disabled");
        Ok(findings.finish())
    }
}

/// Checks for a stage created on its own. Only the stage-level rules apply.
#[derive(Debug, Clone)]
pub struct StageValidator {
    pub stage: ResourceId,
    pub disabled: DisabledRules<ApiGatewayRule>,
}

impl Validation for StageValidator {
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration> {
        let mut findings = Findings::new(&self.disabled);
        check_stage(&mut findings, stack, &self.stage)?;
        Ok(findings.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliant_aws::apigateway::{stage_arn, DomainNameOptions};
    use compliant_aws::wafv2::web_acl_association_to_cfn;
    use serde_json::json;

    fn none() -> DisabledRules<ApiGatewayRule> { DisabledRules::none() }

    #[test]
    fn endpoint_types_default_to_edge_only_while_the_rule_is_active() {
        assert_eq!(resolve_endpoint_types(None, &none()), Some(vec![EndpointType::Edge]));
        assert_eq!(resolve_endpoint_types(Some(vec![EndpointType::Private]), &none()), Some(vec![EndpointType::Private]));
        assert_eq!(resolve_endpoint_types(None, &DisabledRules::of(&[EndpointTypeCheck])), None);
    }

    #[test]
    fn active_rules_override_conflicting_stage_options() {
        let user = StageOptions { caching_enabled: Some(false), logging_level: Some(MethodLoggingLevel::Off), ..Default::default() };
        let r = resolve_stage_options(Some(user), &none()).unwrap();
        assert_eq!(r.caching_enabled, Some(true));
        assert_eq!(r.cache_data_encrypted, Some(true));
        assert_eq!(r.cache_cluster_enabled, Some(true));
        assert_eq!(r.logging_level, Some(MethodLoggingLevel::Info));
    }

    #[test]
    fn composite_merge_forces_only_the_active_rules_fields() {
        let user = StageOptions { caching_enabled: Some(false), metrics_enabled: Some(true), ..Default::default() };

        let logging_only = resolve_stage_options(Some(user.clone()), &DisabledRules::of(&[CacheEnabledAndEncrypted])).unwrap();
        assert_eq!(logging_only.caching_enabled, Some(false));
        assert_eq!(logging_only.cache_data_encrypted, None);
        assert_eq!(logging_only.logging_level, Some(MethodLoggingLevel::Info));
        assert_eq!(logging_only.metrics_enabled, Some(true));

        let cache_only = resolve_stage_options(Some(user.clone()), &DisabledRules::of(&[ExecutionLoggingEnabled])).unwrap();
        assert_eq!(cache_only.caching_enabled, Some(true));
        assert_eq!(cache_only.logging_level, None);

        let both = DisabledRules::of(&[CacheEnabledAndEncrypted, ExecutionLoggingEnabled]);
        assert_eq!(resolve_stage_options(Some(user.clone()), &both), Some(user));
        assert_eq!(resolve_stage_options(None, &both), None);
    }

    #[test]
    fn resolution_is_idempotent() {
        let props = RestApiProps { endpoint_types: Some(vec![EndpointType::Regional]), ..Default::default() };
        let once = resolve_rest_api(&props, &none());
        assert_eq!(once, resolve_rest_api(&props, &none()));
        assert_eq!(once, resolve_rest_api(&once, &none()));
    }

    fn api_stack(api_props: &RestApiProps) -> (Stack, ResourceId, ResourceId) {
        let (api, dep, stage) = (ResourceId::new("Api"), ResourceId::new("Deployment"), ResourceId::new("Stage"));
        let mut stack = Stack::new("s");
        stack.add(api_props.to_cfn(&api)).unwrap();
        let opts = api_props.deploy_options.clone().unwrap_or_default();
        stack.add(opts.to_cfn(&stage, &api, &dep)).unwrap();
        (stack, api, stage)
    }

    fn compliant_props() -> RestApiProps {
        RestApiProps {
            domain_name: Some(DomainNameOptions {
                domain_name: "api.example.com".into(),
                certificate_arn: "arn:aws:acm:eu-west-1:123:certificate/abc".into(),
                endpoint_type: None,
                security_policy: None,
                base_path: None,
            }),
            disable_execute_api_endpoint: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn resolved_api_with_domain_and_waf_is_compliant() {
        let props = resolve_rest_api(&compliant_props(), &none());
        let (mut stack, api, stage) = api_stack(&props);
        stack.add(web_acl_association_to_cfn(&ResourceId::new("Waf"), stage_arn(&api, &stage), json!("arn:acl"))).unwrap();
        let v = RestApiValidator { api, stage: Some(stage), props, disabled: none() };
        assert_eq!(v.validate(&stack).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn missing_waf_and_domain_are_reported_per_rule() {
        let props = resolve_rest_api(&RestApiProps::default(), &none());
        let (stack, api, stage) = api_stack(&props);
        let v = RestApiValidator { api, stage: Some(stage), props, disabled: none() };
        let msgs = v.validate(&stack).unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].starts_with("associated-with-waf:"));
        assert!(msgs[1].starts_with("domain-required:"));

        let v = RestApiValidator { disabled: DisabledRules::of(&[AssociatedWithWaf, DomainRequired]), ..v };
        assert!(v.validate(&stack).unwrap().is_empty());
    }

    #[test]
    fn logging_off_is_a_diagnostic_but_no_level_is_a_fault() {
        let disabled = DisabledRules::of(&[AssociatedWithWaf, DomainRequired, ExecutionLoggingEnabled]);
        let off = RestApiProps {
            deploy_options: Some(StageOptions { logging_level: Some(MethodLoggingLevel::Off), ..Default::default() }),
            ..Default::default()
        };
        let props = resolve_rest_api(&off, &disabled);
        let (stack, api, stage) = api_stack(&props);
        let strict = DisabledRules::of(&[AssociatedWithWaf, DomainRequired]);
        let v = RestApiValidator { api: api.clone(), stage: Some(stage.clone()), props: props.clone(), disabled: strict.clone() };
        let msgs = v.validate(&stack).unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("execution-logging-enabled:"));

        let error = RestApiProps {
            deploy_options: Some(StageOptions { logging_level: Some(MethodLoggingLevel::Error), ..Default::default() }),
            ..Default::default()
        };
        let (stack, api, stage) = api_stack(&resolve_rest_api(&error, &disabled));
        let v = RestApiValidator { api, stage: Some(stage), props: props.clone(), disabled: strict.clone() };
        assert!(v.validate(&stack).unwrap().is_empty());

        let both = DisabledRules::of(&[AssociatedWithWaf, DomainRequired, ExecutionLoggingEnabled, CacheEnabledAndEncrypted]);
        let (stack, api, stage) = api_stack(&resolve_rest_api(&RestApiProps::default(), &both));
        let v = RestApiValidator { api, stage: Some(stage), props, disabled: strict };
        assert!(v.validate(&stack).unwrap_err().to_string().contains("no execution logging level"));
    }

    #[test]
    fn removed_endpoint_configuration_is_a_fault() {
        let props = resolve_rest_api(&compliant_props(), &none());
        let (mut stack, api, stage) = api_stack(&props);
        stack.get_mut(&api).unwrap().add_deletion_override("EndpointConfiguration");
        let v = RestApiValidator { api: api.clone(), stage: Some(stage.clone()), props: props.clone(), disabled: none() };
        assert!(v.validate(&stack).is_err());

        let v = RestApiValidator { api, stage: Some(stage), props, disabled: DisabledRules::of(&[EndpointTypeCheck, AssociatedWithWaf]) };
        assert!(v.validate(&stack).unwrap().is_empty());
    }

    #[test]
    fn only_unknown_endpoint_types_fail() {
        let props = resolve_rest_api(&compliant_props(), &none());
        let endpoint_failures = |types: Json| {
            let (mut stack, api, stage) = api_stack(&props);
            stack.get_mut(&api).unwrap().add_override("EndpointConfiguration.Types", types).unwrap();
            let v = RestApiValidator { api, stage: Some(stage), props: props.clone(), disabled: DisabledRules::of(&[AssociatedWithWaf]) };
            v.validate(&stack).unwrap().into_iter().filter(|m| m.starts_with("endpoint-type-check:")).count()
        };
        assert_eq!(endpoint_failures(json!([])), 0);
        assert_eq!(endpoint_failures(json!(["REGIONAL", "PRIVATE"])), 0);
        assert_eq!(endpoint_failures(json!(["EDGE", "GLOBAL"])), 1);
    }

    #[test]
    fn uncached_stage_fails_the_cache_rule() {
        let disabled = DisabledRules::of(&[CacheEnabledAndEncrypted]);
        let user = StageOptions { caching_enabled: Some(true), ..Default::default() };
        let opts = resolve_stage_options(Some(user), &disabled).unwrap();
        let mut stack = Stack::new("s");
        let stage = ResourceId::new("Stage");
        stack.add(opts.to_cfn(&stage, &ResourceId::new("Api"), &ResourceId::new("Dep"))).unwrap();
        let v = StageValidator { stage, disabled: DisabledRules::of(&[AssociatedWithWaf]) };
        let msgs = v.validate(&stack).unwrap();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("cache-enabled-and-encrypted:"));
    }
}
