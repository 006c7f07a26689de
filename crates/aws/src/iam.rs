use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};

use compliant_core::{Resource, ResourceId};

use crate::{join, partition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect { Allow, Deny }

#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Any,
    Aws(Json),
    Service(String),
}

impl Principal {
    fn to_json(&self) -> Json {
        match self {
            Principal::Any => json!({ "AWS": "*" }),
            Principal::Aws(arn) => json!({ "AWS": arn }),
            Principal::Service(svc) => json!({ "Service": svc }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principal: Option<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<Json>,
    pub condition: Option<Json>,
}

impl PolicyStatement {
    pub fn new(effect: Effect, actions: &[&str]) -> Self {
        PolicyStatement {
            sid: None,
            effect,
            principal: None,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources: Vec::new(),
            condition: None,
        }
    }

    pub fn sid(mut self, sid: &str) -> Self { self.sid = Some(sid.to_string()); self }
    pub fn principal(mut self, p: Principal) -> Self { self.principal = Some(p); self }
    pub fn resource(mut self, r: Json) -> Self { self.resources.push(r); self }
    pub fn condition(mut self, c: Json) -> Self { self.condition = Some(c); self }

    /// Single actions/resources render as a scalar, several as a list.
    pub fn to_json(&self) -> Json {
        let mut s = json!({
            "Effect": match self.effect { Effect::Allow => "Allow", Effect::Deny => "Deny" },
            "Action": one_or_many(self.actions.iter().map(|a| json!(a)).collect()),
        });
        if let Some(sid) = &self.sid { s["Sid"] = json!(sid); }
        if let Some(p) = &self.principal { s["Principal"] = p.to_json(); }
        if !self.resources.is_empty() { s["Resource"] = one_or_many(self.resources.clone()); }
        if let Some(c) = &self.condition { s["Condition"] = c.clone(); }
        s
    }
}

fn one_or_many(mut items: Vec<Json>) -> Json {
    if items.len() == 1 { items.remove(0) } else { Json::Array(items) }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument { pub statements: Vec<PolicyStatement> }

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self { PolicyDocument { statements } }

    pub fn to_json(&self) -> Json {
        json!({
            "Version": "2012-10-17",
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
        })
    }
}

/// `arn:<partition>:iam::aws:policy/<name>`
pub fn managed_policy_arn(name: &str) -> Json {
    join(vec![json!("arn:"), partition(), json!(format!(":iam::aws:policy/{name}"))])
}

/// Role assumable by one AWS service, with AWS-managed policies attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRole {
    pub service: String,
    pub managed_policies: Vec<String>,
}

impl ServiceRole {
    pub fn new(service: &str, managed_policies: &[&str]) -> Self {
        ServiceRole { service: service.to_string(), managed_policies: managed_policies.iter().map(|p| p.to_string()).collect() }
    }

    pub fn to_cfn(&self, id: &ResourceId) -> Resource {
        let trust = PolicyDocument::new(vec![
            PolicyStatement::new(Effect::Allow, &["sts:AssumeRole"]).principal(Principal::Service(self.service.clone())),
        ]);
        Resource::new(id.clone(), "AWS::IAM::Role", json!({
            "AssumeRolePolicyDocument": trust.to_json(),
            "ManagedPolicyArns": self.managed_policies.iter().map(|p| managed_policy_arn(p)).collect::<Vec<_>>(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_render_scalars_for_single_entries() {
        let s = PolicyStatement::new(Effect::Deny, &["s3:*"])
            .principal(Principal::Any)
            .resource(json!("*"))
            .to_json();
        assert_eq!(s, json!({ "Effect": "Deny", "Action": "s3:*", "Principal": { "AWS": "*" }, "Resource": "*" }));

        let many = PolicyStatement::new(Effect::Allow, &["a:One", "a:Two"]).sid("x").to_json();
        assert_eq!(many["Action"], json!(["a:One", "a:Two"]));
        assert_eq!(many["Sid"], json!("x"));
    }

    #[test]
    fn service_role_trusts_the_service() {
        let r = ServiceRole::new("backup.amazonaws.com", &["service-role/AWSBackupServiceRolePolicyForBackup"])
            .to_cfn(&ResourceId::new("Role"));
        assert_eq!(r.pointer("AssumeRolePolicyDocument.Statement.0.Principal.Service"), Some(&json!("backup.amazonaws.com")));
        assert_eq!(r.pointer("ManagedPolicyArns").and_then(|v| v.as_array()).map(|a| a.len()), Some(1));
    }
}
