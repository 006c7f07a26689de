use anyhow::{Context, Result};
use serde::Deserialize;

use compliant_aws::iam::ServiceRole;
use compliant_aws::lambda::{function_url_to_cfn, FunctionProps, FunctionUrlAuthType, Permission};
use compliant_core::{ResourceId, Stack};
use compliant_policy::lambda::{resolve_function, FunctionValidator};
use compliant_policy::{DisabledRules, LambdaRule};

#[derive(Debug, Clone, Deserialize)]
pub struct CompliantLambdaProps {
    #[serde(flatten)]
    pub function: FunctionProps,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub function_url: Option<FunctionUrlAuthType>,
    #[serde(default)]
    pub disabled_rules: DisabledRules<LambdaRule>,
}

impl CompliantLambdaProps {
    pub fn new(function: FunctionProps) -> Self {
        CompliantLambdaProps { function, permissions: Vec::new(), function_url: None, disabled_rules: DisabledRules::none() }
    }
}

#[derive(Debug, Clone)]
pub struct CompliantLambda {
    pub function: ResourceId,
    pub role: Option<ResourceId>,
    pub permissions: Vec<ResourceId>,
    pub url: Option<ResourceId>,
    pub props: FunctionProps,
}

impl CompliantLambda {
    pub fn new(stack: &mut Stack, id: &str, props: CompliantLambdaProps) -> Result<Self> {
        let CompliantLambdaProps { function: user, permissions, function_url, disabled_rules } = props;
        disabled_rules.log_opt_outs(id);
        let resolved = resolve_function(&user, &disabled_rules);
        let function = ResourceId::new(id);

        let role = if resolved.role_arn.is_none() {
            let mut policies = vec!["service-role/AWSLambdaBasicExecutionRole"];
            if resolved.vpc.is_some() {
                policies.push("service-role/AWSLambdaVPCAccessExecutionRole");
            }
            let rid = function.child("ServiceRole");
            stack.add(ServiceRole::new("lambda.amazonaws.com", &policies).to_cfn(&rid))?;
            Some(rid)
        } else {
            None
        };
        stack.add(resolved.to_cfn(&function, role.as_ref())).with_context(|| format!("function '{id}'"))?;

        let mut permission_ids = Vec::with_capacity(permissions.len());
        for (i, p) in permissions.iter().enumerate() {
            let pid = function.child(&format!("Permission{i}"));
            stack.add(p.to_cfn(&pid, &function))?;
            permission_ids.push(pid);
        }
        let url = match function_url {
            Some(auth) => {
                let uid = function.child("Url");
                stack.add(function_url_to_cfn(&uid, &function, auth))?;
                Some(uid)
            }
            None => None,
        };

        stack.add_validation(id, FunctionValidator { function: function.clone(), props: resolved.clone(), disabled: disabled_rules });
        tracing::info!(construct = id, function = %function, runtime = %resolved.runtime, "materialized function");
        Ok(CompliantLambda { function, role, permissions: permission_ids, url, props: resolved })
    }
}
