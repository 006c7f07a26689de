use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json, Map as JsonMap};

use compliant_core::{get_att, ref_to, Resource, ResourceId};

use crate::{join, partition, put, region};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndpointType { Edge, Regional, Private }

impl EndpointType {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointType::Edge => "EDGE",
            EndpointType::Regional => "REGIONAL",
            EndpointType::Private => "PRIVATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MethodLoggingLevel { Off, Error, Info }

impl MethodLoggingLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodLoggingLevel::Off => "OFF",
            MethodLoggingLevel::Error => "ERROR",
            MethodLoggingLevel::Info => "INFO",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityPolicy { Tls10, Tls12 }

/// Stage settings. Method-level options apply to every method (`*` on `/*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOptions {
    pub stage_name: Option<String>,
    pub description: Option<String>,
    pub cache_cluster_enabled: Option<bool>,
    pub cache_cluster_size: Option<String>,
    pub caching_enabled: Option<bool>,
    pub cache_data_encrypted: Option<bool>,
    pub cache_ttl_seconds: Option<u32>,
    pub logging_level: Option<MethodLoggingLevel>,
    pub data_trace_enabled: Option<bool>,
    pub metrics_enabled: Option<bool>,
    pub tracing_enabled: Option<bool>,
}

impl StageOptions {
    pub fn stage_name(&self) -> &str { self.stage_name.as_deref().unwrap_or("prod") }

    fn method_settings(&self) -> Option<Json> {
        let mut m = JsonMap::new();
        put(&mut m, "CachingEnabled", self.caching_enabled);
        put(&mut m, "CacheDataEncrypted", self.cache_data_encrypted);
        put(&mut m, "CacheTtlInSeconds", self.cache_ttl_seconds);
        put(&mut m, "LoggingLevel", self.logging_level.map(MethodLoggingLevel::as_str));
        put(&mut m, "DataTraceEnabled", self.data_trace_enabled);
        put(&mut m, "MetricsEnabled", self.metrics_enabled);
        if m.is_empty() {
            return None;
        }
        m.insert("HttpMethod".into(), json!("*"));
        m.insert("ResourcePath".into(), json!("/*"));
        Some(json!([m]))
    }

    pub fn to_cfn(&self, id: &ResourceId, api: &ResourceId, deployment: &ResourceId) -> Resource {
        let mut props = JsonMap::new();
        props.insert("RestApiId".into(), ref_to(api));
        props.insert("DeploymentId".into(), ref_to(deployment));
        props.insert("StageName".into(), json!(self.stage_name()));
        put(&mut props, "Description", self.description.as_deref());
        put(&mut props, "CacheClusterEnabled", self.cache_cluster_enabled);
        if self.cache_cluster_enabled == Some(true) {
            props.insert("CacheClusterSize".into(), json!(self.cache_cluster_size.as_deref().unwrap_or("0.5")));
        }
        put(&mut props, "TracingEnabled", self.tracing_enabled);
        put(&mut props, "MethodSettings", self.method_settings());
        Resource::new(id.clone(), "AWS::ApiGateway::Stage", Json::Object(props))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainNameOptions {
    pub domain_name: String,
    pub certificate_arn: String,
    #[serde(default)]
    pub endpoint_type: Option<EndpointType>,
    #[serde(default)]
    pub security_policy: Option<SecurityPolicy>,
    #[serde(default)]
    pub base_path: Option<String>,
}

impl DomainNameOptions {
    pub fn to_cfn(&self, id: &ResourceId) -> Resource {
        let endpoint = self.endpoint_type.unwrap_or(EndpointType::Regional);
        let mut props = json!({
            "DomainName": self.domain_name,
            "EndpointConfiguration": { "Types": [endpoint.as_str()] },
            "SecurityPolicy": match self.security_policy.unwrap_or(SecurityPolicy::Tls12) {
                SecurityPolicy::Tls10 => "TLS_1_0",
                SecurityPolicy::Tls12 => "TLS_1_2",
            },
        });
        let cert_key = if endpoint == EndpointType::Edge { "CertificateArn" } else { "RegionalCertificateArn" };
        props[cert_key] = json!(self.certificate_arn);
        Resource::new(id.clone(), "AWS::ApiGateway::DomainName", props)
    }

    pub fn mapping_to_cfn(&self, id: &ResourceId, domain: &ResourceId, api: &ResourceId, stage: &ResourceId) -> Resource {
        let mut props = json!({
            "DomainName": ref_to(domain),
            "RestApiId": ref_to(api),
            "Stage": ref_to(stage),
        });
        if let Some(bp) = &self.base_path { props["BasePath"] = json!(bp); }
        Resource::new(id.clone(), "AWS::ApiGateway::BasePathMapping", props)
    }
}

/// Method on the API root, backed by a mock integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub http_method: String,
    #[serde(default)]
    pub authorization_type: Option<String>,
}

impl Method {
    pub fn any() -> Self { Method { http_method: "ANY".into(), authorization_type: None } }

    pub fn to_cfn(&self, id: &ResourceId, api: &ResourceId) -> Resource {
        Resource::new(id.clone(), "AWS::ApiGateway::Method", json!({
            "HttpMethod": self.http_method.to_uppercase(),
            "ResourceId": get_att(api, "RootResourceId"),
            "RestApiId": ref_to(api),
            "AuthorizationType": self.authorization_type.as_deref().unwrap_or("NONE"),
            "Integration": { "Type": "MOCK" },
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestApiProps {
    pub rest_api_name: Option<String>,
    pub description: Option<String>,
    pub endpoint_types: Option<Vec<EndpointType>>,
    pub deploy: Option<bool>,
    pub deploy_options: Option<StageOptions>,
    pub domain_name: Option<DomainNameOptions>,
    pub disable_execute_api_endpoint: Option<bool>,
    pub cloud_watch_role: Option<bool>,
    pub methods: Vec<Method>,
}

impl RestApiProps {
    pub fn to_cfn(&self, id: &ResourceId) -> Resource {
        let mut props = JsonMap::new();
        props.insert("Name".into(), json!(self.rest_api_name.clone().unwrap_or_else(|| id.0.clone())));
        put(&mut props, "Description", self.description.as_deref());
        if let Some(types) = &self.endpoint_types {
            props.insert("EndpointConfiguration".into(), json!({
                "Types": types.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            }));
        }
        put(&mut props, "DisableExecuteApiEndpoint", self.disable_execute_api_endpoint);
        Resource::new(id.clone(), "AWS::ApiGateway::RestApi", Json::Object(props))
    }
}

pub fn deployment_to_cfn(id: &ResourceId, api: &ResourceId, methods: &[ResourceId]) -> Resource {
    let mut r = Resource::new(id.clone(), "AWS::ApiGateway::Deployment", json!({
        "RestApiId": ref_to(api),
        "Description": "Automatically created by the RestApi construct",
    }));
    for m in methods {
        r = r.depends_on(m);
    }
    r
}

/// Account-level setting giving API Gateway a role to push execution logs.
pub fn account_to_cfn(id: &ResourceId, role: &ResourceId) -> Resource {
    Resource::new(id.clone(), "AWS::ApiGateway::Account", json!({
        "CloudWatchRoleArn": get_att(role, "Arn"),
    }))
}

/// `arn:<partition>:apigateway:<region>::/restapis/<api>/stages/<stage>`
pub fn stage_arn(api: &ResourceId, stage: &ResourceId) -> Json {
    join(vec![
        json!("arn:"), partition(), json!(":apigateway:"), region(),
        json!("::/restapis/"), ref_to(api), json!("/stages/"), ref_to(stage),
    ])
}
