use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as Json;

use compliant_aws::apigateway::{
    account_to_cfn, deployment_to_cfn, stage_arn, Method, MethodLoggingLevel, RestApiProps, StageOptions,
};
use compliant_aws::iam::ServiceRole;
use compliant_aws::wafv2::web_acl_association_to_cfn;
use compliant_core::{ResourceId, Stack, SynthError};
use compliant_policy::apigateway::{resolve_rest_api, resolve_stage_options, RestApiValidator, StageValidator};
use compliant_policy::{ApiGatewayRule, DisabledRules};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompliantRestApiProps {
    #[serde(flatten)]
    pub api: RestApiProps,
    #[serde(default)]
    pub disabled_rules: DisabledRules<ApiGatewayRule>,
}

/// REST API with its methods, deployment and default stage.
#[derive(Debug, Clone)]
pub struct CompliantRestApi {
    pub api: ResourceId,
    pub methods: Vec<ResourceId>,
    pub deployment: Option<ResourceId>,
    pub stage: Option<ResourceId>,
    pub domain: Option<ResourceId>,
    /// Effective configuration after rule resolution.
    pub props: RestApiProps,
}

fn wants_execution_logs(options: &StageOptions) -> bool {
    matches!(options.logging_level, Some(level) if level != MethodLoggingLevel::Off)
}

/// API Gateway needs an account-level role before a stage can write execution logs.
fn ensure_cloud_watch_role(stack: &mut Stack, api: &ResourceId) -> Result<Option<ResourceId>, SynthError> {
    if stack.of_type("AWS::ApiGateway::Account").next().is_some() {
        return Ok(None);
    }
    let role = api.child("CloudWatchRole");
    stack.add(
        ServiceRole::new("apigateway.amazonaws.com", &["service-role/AmazonAPIGatewayPushToCloudWatchLogs"]).to_cfn(&role),
    )?;
    let account = api.child("Account");
    stack.add(account_to_cfn(&account, &role))?;
    Ok(Some(account))
}

impl CompliantRestApi {
    pub fn new(stack: &mut Stack, id: &str, props: CompliantRestApiProps) -> Result<Self> {
        let CompliantRestApiProps { api: user, disabled_rules } = props;
        disabled_rules.log_opt_outs(id);
        let resolved = resolve_rest_api(&user, &disabled_rules);
        let api = ResourceId::new(id);
        stack.add(resolved.to_cfn(&api)).with_context(|| format!("rest api '{id}'"))?;

        let declared = if resolved.methods.is_empty() { vec![Method::any()] } else { resolved.methods.clone() };
        let mut methods = Vec::with_capacity(declared.len());
        for m in &declared {
            let mid = api.child(&format!("{}Method", m.http_method.to_uppercase()));
            stack.add(m.to_cfn(&mid, &api))?;
            methods.push(mid);
        }

        let (mut deployment, mut stage) = (None, None);
        if resolved.deploy.unwrap_or(true) {
            let dep = api.child("Deployment");
            stack.add(deployment_to_cfn(&dep, &api, &methods))?;
            let options = resolved.deploy_options.clone().unwrap_or_default();
            let sid = api.child("DeploymentStage").child(options.stage_name());
            let mut resource = options.to_cfn(&sid, &api, &dep);
            if wants_execution_logs(&options) && resolved.cloud_watch_role.unwrap_or(true) {
                if let Some(account) = ensure_cloud_watch_role(stack, &api)? {
                    resource = resource.depends_on(&account);
                }
            }
            stack.add(resource)?;
            deployment = Some(dep);
            stage = Some(sid);
        }

        let mut domain = None;
        if let Some(options) = &resolved.domain_name {
            let did = api.child("CustomDomain");
            stack.add(options.to_cfn(&did))?;
            match &stage {
                Some(sid) => { stack.add(options.mapping_to_cfn(&did.child("Map"), &did, &api, sid))?; }
                None => tracing::warn!(construct = id, domain = %options.domain_name, "no stage to map the custom domain to"),
            }
            domain = Some(did);
        }

        stack.add_validation(id, RestApiValidator {
            api: api.clone(),
            stage: stage.clone(),
            props: resolved.clone(),
            disabled: disabled_rules,
        });
        tracing::info!(construct = id, api = %api, stage = ?stage, "materialized rest api");
        Ok(CompliantRestApi { api, methods, deployment, stage, domain, props: resolved })
    }

    /// ARN of the default stage, for WAF associations.
    pub fn stage_arn(&self) -> Option<Json> {
        self.stage.as_ref().map(|s| stage_arn(&self.api, s))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompliantApiStageProps {
    /// Logical id of a REST API already in the stack.
    pub rest_api: String,
    /// Existing deployment; one is created when unset.
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(flatten)]
    pub options: StageOptions,
    #[serde(default)]
    pub disabled_rules: DisabledRules<ApiGatewayRule>,
}

/// A stage created separately from its REST API.
#[derive(Debug, Clone)]
pub struct CompliantApiStage {
    pub api: ResourceId,
    pub deployment: ResourceId,
    pub stage: ResourceId,
    pub options: StageOptions,
}

impl CompliantApiStage {
    pub fn new(stack: &mut Stack, id: &str, props: CompliantApiStageProps) -> Result<Self> {
        let CompliantApiStageProps { rest_api, deployment, options, disabled_rules } = props;
        disabled_rules.log_opt_outs(id);
        let api = ResourceId::new(&rest_api);
        match stack.get(&api) {
            Some(r) if r.is_type("AWS::ApiGateway::RestApi") => {}
            _ => anyhow::bail!("stage '{id}': '{rest_api}' is not a rest api in this stack"),
        }

        let stage = ResourceId::new(id);
        let deployment = match deployment {
            Some(d) => ResourceId::new(d),
            None => {
                let dep = stage.child("Deployment");
                stack.add(deployment_to_cfn(&dep, &api, &[]))?;
                dep
            }
        };

        let options = resolve_stage_options(Some(options), &disabled_rules).unwrap_or_default();
        let mut resource = options.to_cfn(&stage, &api, &deployment);
        if wants_execution_logs(&options) {
            if let Some(account) = ensure_cloud_watch_role(stack, &stage)? {
                resource = resource.depends_on(&account);
            }
        }
        stack.add(resource).with_context(|| format!("stage '{id}'"))?;

        stack.add_validation(id, StageValidator { stage: stage.clone(), disabled: disabled_rules });
        tracing::info!(construct = id, api = %api, stage = %stage, "materialized api stage");
        Ok(CompliantApiStage { api, deployment, stage, options })
    }

    pub fn stage_arn(&self) -> Json { stage_arn(&self.api, &self.stage) }
}

/// Associates a WAFv2 web ACL with the resource behind `resource_arn`.
pub fn associate_web_acl(stack: &mut Stack, id: &str, resource_arn: Json, web_acl_arn: Json) -> Result<ResourceId, SynthError> {
    let rid = ResourceId::new(id);
    stack.add(web_acl_association_to_cfn(&rid, resource_arn, web_acl_arn))?;
    tracing::info!(construct = id, "associated web acl");
    Ok(rid)
}
