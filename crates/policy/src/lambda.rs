use serde_json::Value as Json;
use std::collections::BTreeSet;

use compliant_aws::lambda::{FunctionProps, Runtime};
use compliant_core::{Misconfiguration, Resource, ResourceId, Stack, Validation};

use crate::{DisabledRules, Findings};

rules! {
    LambdaRule, "lambda" {
        FunctionPublicAccessProhibited => "function-public-access-prohibited", "LAMBDA_FUNCTION_PUBLIC_ACCESS_PROHIBITED";
        FunctionSettingsCheck => "function-settings-check", "LAMBDA_FUNCTION_SETTINGS_CHECK";
        InsideVpc => "inside-vpc", "LAMBDA_INSIDE_VPC";
        VpcMultiAzCheck => "vpc-multi-az-check", "LAMBDA_VPC_MULTI_AZ_CHECK";
    }
}

/// Runtimes still supported by AWS Lambda.
pub const SUPPORTED_RUNTIMES: &[Runtime] = &[
    Runtime::NODEJS_16_X,
    Runtime::NODEJS_18_X,
    Runtime::PYTHON_3_8,
    Runtime::PYTHON_3_9,
    Runtime::PYTHON_3_10,
    Runtime::PYTHON_3_11,
    Runtime::JAVA_11,
    Runtime::JAVA_17,
    Runtime::RUBY_2_7,
    Runtime::RUBY_3_2,
    Runtime::DOTNET_6,
];

/// No function field is governed by a rule.
pub fn resolve_function(props: &FunctionProps, _disabled: &DisabledRules<LambdaRule>) -> FunctionProps {
    props.clone()
}

fn runtime_supported(function: &Resource) -> Result<bool, Misconfiguration> {
    let runtime = function
        .prop("Runtime")
        .and_then(Json::as_str)
        .ok_or_else(|| Misconfiguration::new(format!("function '{}' has no runtime", function.id)))?;
    Ok(SUPPORTED_RUNTIMES.iter().any(|r| r.name() == runtime))
}

fn publicly_invocable(stack: &Stack, function: &ResourceId) -> bool {
    let open_permission = stack.of_type("AWS::Lambda::Permission").any(|p| {
        p.prop("FunctionName").is_some_and(|f| compliant_core::references(f).contains(function))
            && p.prop("Principal").and_then(Json::as_str) == Some("*")
    });
    let open_url = stack.of_type("AWS::Lambda::Url").any(|u| {
        u.refers_to(function) && u.prop("AuthType").and_then(Json::as_str) == Some("NONE")
    });
    open_permission || open_url
}

fn inside_vpc(function: &Resource) -> bool {
    function.pointer("VpcConfig.SubnetIds").and_then(Json::as_array).is_some_and(|ids| !ids.is_empty())
}

/// Without a VPC there is nothing to spread; inside one, subnets must span two zones.
fn multi_az(props: &FunctionProps) -> bool {
    match &props.vpc {
        None => true,
        Some(vpc) => vpc.subnets.iter().map(|s| s.availability_zone.as_str()).collect::<BTreeSet<_>>().len() >= 2,
    }
}

#[derive(Debug, Clone)]
pub struct FunctionValidator {
    pub function: ResourceId,
    pub props: FunctionProps,
    pub disabled: DisabledRules<LambdaRule>,
}

impl Validation for FunctionValidator {
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration> {
        let function = stack
            .get(&self.function)
            .ok_or_else(|| Misconfiguration::new(format!("function '{}' is not in the stack", self.function)))?;
        let mut findings = Findings::new(&self.disabled);
        findings.try_check(LambdaRule::FunctionSettingsCheck, || runtime_supported(function),
            "function runtime is deprecated or unsupported")?;
        findings.check(LambdaRule::FunctionPublicAccessProhibited, || !publicly_invocable(stack, &self.function),
            "function must not be invocable by everyone");
        findings.check(LambdaRule::InsideVpc, || inside_vpc(function),
            "function must run inside a VPC");
        findings.check(LambdaRule::VpcMultiAzCheck, || multi_az(&self.props),
            "function subnets must span at least two availability zones");
        Ok(findings.finish())
    }
}
