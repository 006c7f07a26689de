//! Typed AWS resource properties and their CloudFormation rendering.

use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json, Map as JsonMap};

use compliant_core::{Resource, ResourceId};

pub mod apigateway;
pub mod backup;
pub mod dynamodb;
pub mod iam;
pub mod kms;
pub mod lambda;
pub mod s3;
pub mod wafv2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsProvider { pub region: String }

/// Any CloudFormation resource, passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsAnyResource {
    #[serde(rename="type")]
    pub type_name: String,
    pub name: String,
    #[serde(flatten)]
    pub properties: JsonMap<String, Json>,
}

impl AwsAnyResource {
    pub fn to_cfn(&self) -> anyhow::Result<Resource> {
        if !self.type_name.starts_with("AWS::") || self.type_name.split("::").count() != 3 {
            anyhow::bail!("resource type '{}' must look like 'AWS::Service::Resource'", self.type_name);
        }
        Ok(Resource::new(ResourceId::new(&self.name), self.type_name.clone(), Json::Object(self.properties.clone())))
    }
}

/// `arn:<partition>:...` built from pseudo parameters, as CloudFormation `Fn::Join`.
pub(crate) fn join(parts: Vec<Json>) -> Json {
    json!({ "Fn::Join": ["", parts] })
}

pub(crate) fn partition() -> Json { json!({ "Ref": "AWS::Partition" }) }
pub(crate) fn region() -> Json { json!({ "Ref": "AWS::Region" }) }
pub(crate) fn account() -> Json { json!({ "Ref": "AWS::AccountId" }) }

/// Inserts `value` under `key` only when it is set.
pub(crate) fn put<T: Serialize>(props: &mut JsonMap<String, Json>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        props.insert(key.to_string(), json!(v));
    }
}
