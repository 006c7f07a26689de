use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json, Map as JsonMap};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use compliant_core::{get_att, Resource, ResourceId};

use crate::put;

/// Lambda runtime identifier, e.g. `python3.11`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Runtime(pub Cow<'static, str>);

impl Runtime {
    pub const NODEJS_16_X: Runtime = Runtime(Cow::Borrowed("nodejs16.x"));
    pub const NODEJS_18_X: Runtime = Runtime(Cow::Borrowed("nodejs18.x"));
    pub const NODEJS_20_X: Runtime = Runtime(Cow::Borrowed("nodejs20.x"));
    pub const NODEJS_LATEST: Runtime = Runtime::NODEJS_18_X;
    pub const PYTHON_3_6: Runtime = Runtime(Cow::Borrowed("python3.6"));
    pub const PYTHON_3_7: Runtime = Runtime(Cow::Borrowed("python3.7"));
    pub const PYTHON_3_8: Runtime = Runtime(Cow::Borrowed("python3.8"));
    pub const PYTHON_3_9: Runtime = Runtime(Cow::Borrowed("python3.9"));
    pub const PYTHON_3_10: Runtime = Runtime(Cow::Borrowed("python3.10"));
    pub const PYTHON_3_11: Runtime = Runtime(Cow::Borrowed("python3.11"));
    pub const JAVA_8: Runtime = Runtime(Cow::Borrowed("java8"));
    pub const JAVA_11: Runtime = Runtime(Cow::Borrowed("java11"));
    pub const JAVA_17: Runtime = Runtime(Cow::Borrowed("java17"));
    pub const RUBY_2_7: Runtime = Runtime(Cow::Borrowed("ruby2.7"));
    pub const RUBY_3_2: Runtime = Runtime(Cow::Borrowed("ruby3.2"));
    pub const DOTNET_6: Runtime = Runtime(Cow::Borrowed("dotnet6"));

    pub fn name(&self) -> &str { &self.0 }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Inline(String),
    S3 { bucket: String, key: String },
}

impl Code {
    fn to_json(&self) -> Json {
        match self {
            Code::Inline(src) => json!({ "ZipFile": src }),
            Code::S3 { bucket, key } => json!({ "S3Bucket": bucket, "S3Key": key }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub subnet_id: String,
    pub availability_zone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpcConfig {
    pub subnets: Vec<Subnet>,
    pub security_group_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionProps {
    pub runtime: Runtime,
    pub handler: String,
    pub code: Code,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub memory_size: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    /// Execution role ARN; a role is created when unset.
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub vpc: Option<VpcConfig>,
    #[serde(default)]
    pub reserved_concurrent_executions: Option<u32>,
}

impl FunctionProps {
    pub fn new(runtime: Runtime, handler: &str, code: Code) -> Self {
        FunctionProps {
            runtime,
            handler: handler.into(),
            code,
            function_name: None,
            description: None,
            memory_size: None,
            timeout_seconds: None,
            role_arn: None,
            environment: BTreeMap::new(),
            vpc: None,
            reserved_concurrent_executions: None,
        }
    }

    /// `role` is the logical id of an execution role created alongside the function.
    pub fn to_cfn(&self, id: &ResourceId, role: Option<&ResourceId>) -> Resource {
        let mut props = JsonMap::new();
        props.insert("Runtime".into(), json!(self.runtime.name()));
        props.insert("Handler".into(), json!(self.handler));
        props.insert("Code".into(), self.code.to_json());
        match (&self.role_arn, role) {
            (Some(arn), _) => { props.insert("Role".into(), json!(arn)); }
            (None, Some(r)) => { props.insert("Role".into(), get_att(r, "Arn")); }
            (None, None) => {}
        }
        put(&mut props, "FunctionName", self.function_name.as_deref());
        put(&mut props, "Description", self.description.as_deref());
        put(&mut props, "MemorySize", self.memory_size);
        put(&mut props, "Timeout", self.timeout_seconds);
        put(&mut props, "ReservedConcurrentExecutions", self.reserved_concurrent_executions);
        if !self.environment.is_empty() {
            props.insert("Environment".into(), json!({ "Variables": self.environment }));
        }
        if let Some(vpc) = &self.vpc {
            props.insert("VpcConfig".into(), json!({
                "SubnetIds": vpc.subnets.iter().map(|s| s.subnet_id.as_str()).collect::<Vec<_>>(),
                "SecurityGroupIds": vpc.security_group_ids,
            }));
        }
        Resource::new(id.clone(), "AWS::Lambda::Function", Json::Object(props))
    }
}

/// Resource-based policy statement allowing a principal to invoke the function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub principal: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub source_arn: Option<String>,
    #[serde(default)]
    pub source_account: Option<String>,
}

impl Permission {
    pub fn to_cfn(&self, id: &ResourceId, function: &ResourceId) -> Resource {
        let mut props = JsonMap::new();
        props.insert("FunctionName".into(), get_att(function, "Arn"));
        props.insert("Principal".into(), json!(self.principal));
        props.insert("Action".into(), json!(self.action.as_deref().unwrap_or("lambda:InvokeFunction")));
        put(&mut props, "SourceArn", self.source_arn.as_deref());
        put(&mut props, "SourceAccount", self.source_account.as_deref());
        Resource::new(id.clone(), "AWS::Lambda::Permission", Json::Object(props))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FunctionUrlAuthType { AwsIam, None }

pub fn function_url_to_cfn(id: &ResourceId, function: &ResourceId, auth: FunctionUrlAuthType) -> Resource {
    Resource::new(id.clone(), "AWS::Lambda::Url", json!({
        "TargetFunctionArn": get_att(function, "Arn"),
        "AuthType": match auth { FunctionUrlAuthType::AwsIam => "AWS_IAM", FunctionUrlAuthType::None => "NONE" },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtimes_parse_from_plain_strings() {
        let rt: Runtime = serde_json::from_value(json!("python3.6")).unwrap();
        assert_eq!(rt, Runtime::PYTHON_3_6);
        assert_eq!(Runtime::NODEJS_LATEST.name(), "nodejs18.x");
    }

    #[test]
    fn function_renders_vpc_subnets_and_created_role() {
        let props = FunctionProps {
            vpc: Some(VpcConfig {
                subnets: vec![Subnet { subnet_id: "subnet-a".into(), availability_zone: "eu-west-1a".into() }],
                security_group_ids: vec!["sg-1".into()],
            }),
            ..FunctionProps::new(Runtime::PYTHON_3_11, "index.handler", Code::Inline("def handler(e, c): pass".into()))
        };
        let f = props.to_cfn(&ResourceId::new("Fn"), Some(&ResourceId::new("FnRole")));
        assert_eq!(f.pointer("VpcConfig.SubnetIds"), Some(&json!(["subnet-a"])));
        assert_eq!(f.prop("Role"), Some(&json!({ "Fn::GetAtt": ["FnRole", "Arn"] })));
        assert_eq!(f.pointer("Code.ZipFile"), Some(&json!("def handler(e, c): pass")));
    }

    #[test]
    fn role_is_omitted_when_neither_given_nor_created() {
        let props = FunctionProps::new(Runtime::NODEJS_18_X, "index.handler", Code::Inline("exports.handler = async () => {}".into()));
        assert!(props.to_cfn(&ResourceId::new("Fn"), None).prop("Role").is_none());
        let explicit = FunctionProps { role_arn: Some("arn:aws:iam::123:role/r".into()), ..props };
        assert_eq!(explicit.to_cfn(&ResourceId::new("Fn"), None).prop("Role"), Some(&json!("arn:aws:iam::123:role/r")));
    }

    #[test]
    fn permission_defaults_to_invoke() {
        let p = Permission { principal: "*".into(), action: None, source_arn: None, source_account: None }
            .to_cfn(&ResourceId::new("Perm"), &ResourceId::new("Fn"));
        assert_eq!(p.prop("Action"), Some(&json!("lambda:InvokeFunction")));
        assert!(p.refers_to(&ResourceId::new("Fn")));
    }
}
