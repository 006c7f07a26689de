use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use std::fmt;

use compliant_core::{get_att, DeletionPolicy, Resource, ResourceId};

use crate::iam::PolicyDocument;

/// Backup schedule expression, `cron(...)` or `rate(...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule(pub String);

impl Schedule {
    /// Every day at `hour:minute` UTC.
    pub fn daily_at(hour: u8, minute: u8) -> Self {
        Schedule(format!("cron({minute} {hour} * * ? *)"))
    }

    pub fn expression(expr: impl Into<String>) -> Self { Schedule(expr.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// The vault a plan writes to: one created in this stack, or an existing one by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultTarget {
    Created(ResourceId),
    Imported(String),
}

impl VaultTarget {
    fn name(&self) -> Json {
        match self {
            VaultTarget::Created(id) => get_att(id, "BackupVaultName"),
            VaultTarget::Imported(name) => json!(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupVault {
    pub name: String,
    pub access_policy: Option<PolicyDocument>,
}

impl BackupVault {
    pub fn to_cfn(&self, id: &ResourceId) -> Resource {
        let mut props = json!({ "BackupVaultName": self.name });
        if let Some(policy) = &self.access_policy {
            props["AccessPolicy"] = policy.to_json();
        }
        Resource::new(id.clone(), "AWS::Backup::BackupVault", props).with_deletion_policy(DeletionPolicy::Retain)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupPlanRule {
    pub rule_name: String,
    pub schedule: Schedule,
    pub delete_after_days: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupPlan {
    pub name: String,
    pub vault: VaultTarget,
    pub rules: Vec<BackupPlanRule>,
}

impl BackupPlan {
    pub fn to_cfn(&self, id: &ResourceId) -> Resource {
        let rules: Vec<Json> = self.rules.iter().map(|r| json!({
            "RuleName": r.rule_name,
            "TargetBackupVault": self.vault.name(),
            "ScheduleExpression": r.schedule.as_str(),
            "Lifecycle": { "DeleteAfterDays": r.delete_after_days },
        })).collect();
        Resource::new(id.clone(), "AWS::Backup::BackupPlan", json!({
            "BackupPlan": { "BackupPlanName": self.name, "BackupPlanRule": rules },
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupSelection {
    pub name: String,
    pub plan: ResourceId,
    pub role: ResourceId,
    pub resources: Vec<Json>,
}

impl BackupSelection {
    pub fn to_cfn(&self, id: &ResourceId) -> Resource {
        Resource::new(id.clone(), "AWS::Backup::BackupSelection", json!({
            "BackupPlanId": get_att(&self.plan, "BackupPlanId"),
            "BackupSelection": {
                "SelectionName": self.name,
                "IamRoleArn": get_att(&self.role, "Arn"),
                "Resources": self.resources,
            },
        }))
    }
}
