//! Backup parameters shared by tables and buckets, and the stack-graph
//! checks that decide whether a resource is covered by a backup plan.

use regex::Regex;
use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use std::sync::OnceLock;
use thiserror::Error;

use compliant_aws::backup::Schedule;
use compliant_aws::iam::{Effect, PolicyDocument, PolicyStatement, Principal};
use compliant_core::{references, Resource, ResourceId, Stack};

pub const DEFAULT_RETENTION_DAYS: u32 = 35;

/// Actions denied to every principal on a vault holding compliant recovery points.
pub const MANUAL_DELETION_ACTIONS: [&str; 3] = [
    "backup:DeleteRecoveryPoint",
    "backup:PutBackupVaultAccessPolicy",
    "backup:UpdateRecoveryPointLifecycle",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackupError {
    #[error("invalid backup vault name '{0}': 2-50 characters of letters, digits, '-' or '_'")]
    InvalidVaultName(String),
    #[error("invalid backup schedule '{0}': expected cron(...) or rate(...)")]
    InvalidSchedule(String),
    #[error("backups must be retained for at least one day")]
    ZeroRetention,
}

fn vault_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9\-_]{2,50}$").expect("static regex"))
}

fn schedule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(cron|rate)\(.+\)$").expect("static regex"))
}

/// Backup inputs accepted by the table and bucket constructs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions {
    /// Import this existing vault instead of creating one.
    pub backup_vault_name: Option<String>,
    pub delete_backup_after_days: Option<u32>,
    pub backup_plan_start_time: Option<Schedule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultPlan {
    Import(String),
    Create { deny_manual_deletion: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBackup {
    pub vault: VaultPlan,
    pub schedule: Schedule,
    pub delete_after_days: u32,
}

impl BackupOptions {
    /// Validates the parameters and picks the vault. Without the deny policy a
    /// fresh vault is always created; otherwise a vault name means import.
    pub fn resolve(&self, deny_manual_deletion: bool) -> Result<ResolvedBackup, BackupError> {
        let vault = match &self.backup_vault_name {
            Some(name) if !vault_name_re().is_match(name) => return Err(BackupError::InvalidVaultName(name.clone())),
            _ if !deny_manual_deletion => VaultPlan::Create { deny_manual_deletion: false },
            Some(name) => VaultPlan::Import(name.clone()),
            None => VaultPlan::Create { deny_manual_deletion: true },
        };
        let schedule = match &self.backup_plan_start_time {
            Some(s) if !schedule_re().is_match(s.as_str()) => return Err(BackupError::InvalidSchedule(s.to_string())),
            Some(s) => s.clone(),
            None => Schedule::daily_at(21, 0),
        };
        let delete_after_days = match self.delete_backup_after_days {
            Some(0) => return Err(BackupError::ZeroRetention),
            Some(days) => days,
            None => DEFAULT_RETENTION_DAYS,
        };
        tracing::debug!(?vault, schedule = %schedule, delete_after_days, "resolved backup parameters");
        Ok(ResolvedBackup { vault, schedule, delete_after_days })
    }
}

/// Vault access policy denying manual deletion of recovery points to everyone.
pub fn manual_deletion_deny_policy() -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::new(Effect::Deny, &MANUAL_DELETION_ACTIONS)
            .sid("backup-recovery-point-manual-deletion-disabled")
            .principal(Principal::Any)
            .resource(json!("*")),
    ])
}

/// Backup selections whose resource list refers to `target`.
pub fn selections_covering<'a>(stack: &'a Stack, target: &'a ResourceId) -> impl Iterator<Item = &'a Resource> + 'a {
    stack
        .of_type("AWS::Backup::BackupSelection")
        .filter(move |s| s.pointer("BackupSelection.Resources").is_some_and(|r| references(r).contains(target)))
}

pub fn is_backed_up(stack: &Stack, target: &ResourceId) -> bool {
    selections_covering(stack, target).next().is_some()
}

/// Whether every vault receiving recovery points of `target` refuses manual
/// deletion. Imported vaults are trusted. Vacuously true when nothing backs
/// the resource up.
pub fn vaults_deny_manual_deletion(stack: &Stack, target: &ResourceId) -> bool {
    selections_covering(stack, target).all(|selection| {
        let Some(plan) = selection
            .prop("BackupPlanId")
            .and_then(|p| references(p).into_iter().next())
            .and_then(|id| stack.get(&id))
        else {
            return false;
        };
        let rules = plan.pointer("BackupPlan.BackupPlanRule").and_then(Json::as_array).cloned().unwrap_or_default();
        rules.iter().all(|rule| match rule.get("TargetBackupVault") {
            Some(Json::String(_)) => true,
            Some(vault) => {
                let ids = references(vault);
                !ids.is_empty()
                    && ids.iter().all(|id| {
                        stack.get(id).is_some_and(|v| v.prop("AccessPolicy").is_some_and(denies_manual_deletion))
                    })
            }
            None => false,
        })
    })
}

fn denies_manual_deletion(policy: &Json) -> bool {
    let statements = match policy.get("Statement") {
        Some(Json::Array(items)) => items.iter().collect::<Vec<_>>(),
        Some(single) => vec![single],
        None => return false,
    };
    statements.into_iter().any(|s| {
        let actions: Vec<&str> = match s.get("Action") {
            Some(Json::String(a)) => vec![a.as_str()],
            Some(Json::Array(items)) => items.iter().filter_map(Json::as_str).collect(),
            _ => Vec::new(),
        };
        s.get("Effect") == Some(&json!("Deny")) && MANUAL_DELETION_ACTIONS.iter().all(|a| actions.contains(a))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliant_aws::backup::{BackupPlan, BackupPlanRule, BackupSelection, BackupVault, VaultTarget};
    use compliant_core::get_att;

    fn opts(name: Option<&str>, days: Option<u32>, schedule: Option<&str>) -> BackupOptions {
        BackupOptions {
            backup_vault_name: name.map(String::from),
            delete_backup_after_days: days,
            backup_plan_start_time: schedule.map(Schedule::expression),
        }
    }

    #[test]
    fn defaults_are_daily_at_nine_pm_for_35_days() {
        let r = BackupOptions::default().resolve(true).unwrap();
        assert_eq!(r.schedule.as_str(), "cron(0 21 * * ? *)");
        assert_eq!(r.delete_after_days, 35);
        assert_eq!(r.vault, VaultPlan::Create { deny_manual_deletion: true });
    }

    #[test]
    fn opting_out_of_the_deny_policy_creates_a_plain_vault_even_when_one_is_named() {
        let named = opts(Some("existing-vault"), None, None);
        assert_eq!(named.resolve(true).unwrap().vault, VaultPlan::Import("existing-vault".into()));
        assert_eq!(named.resolve(false).unwrap().vault, VaultPlan::Create { deny_manual_deletion: false });
        assert_eq!(opts(None, None, None).resolve(false).unwrap().vault, VaultPlan::Create { deny_manual_deletion: false });
        assert_eq!(opts(Some("x"), None, None).resolve(false), Err(BackupError::InvalidVaultName("x".into())));
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        assert_eq!(opts(Some("x"), None, None).resolve(true), Err(BackupError::InvalidVaultName("x".into())));
        assert_eq!(opts(Some("bad name!"), None, None).resolve(true), Err(BackupError::InvalidVaultName("bad name!".into())));
        assert_eq!(opts(None, Some(0), None).resolve(true), Err(BackupError::ZeroRetention));
        assert!(matches!(opts(None, None, Some("every day")).resolve(true), Err(BackupError::InvalidSchedule(_))));
        assert!(opts(None, Some(7), Some("rate(12 hours)")).resolve(true).is_ok());
    }

    fn backed_up_stack(vault: VaultTarget, policy: Option<PolicyDocument>) -> Stack {
        let mut stack = Stack::new("s");
        stack.add(Resource::new(ResourceId::new("Table"), "AWS::DynamoDB::Table", json!({}))).unwrap();
        stack.add(Resource::new(ResourceId::new("Role"), "AWS::IAM::Role", json!({}))).unwrap();
        if let VaultTarget::Created(id) = &vault {
            stack.add(BackupVault { name: "v".into(), access_policy: policy }.to_cfn(id)).unwrap();
        }
        let rule = BackupPlanRule { rule_name: "daily".into(), schedule: Schedule::daily_at(21, 0), delete_after_days: 35 };
        stack.add(BackupPlan { name: "p".into(), vault, rules: vec![rule] }.to_cfn(&ResourceId::new("Plan"))).unwrap();
        stack.add(BackupSelection {
            name: "sel".into(),
            plan: ResourceId::new("Plan"),
            role: ResourceId::new("Role"),
            resources: vec![get_att(&ResourceId::new("Table"), "Arn")],
        }.to_cfn(&ResourceId::new("Selection"))).unwrap();
        stack
    }

    #[test]
    fn deny_policy_on_created_vault_is_detected() {
        let table = ResourceId::new("Table");
        let guarded = backed_up_stack(VaultTarget::Created(ResourceId::new("Vault")), Some(manual_deletion_deny_policy()));
        assert!(is_backed_up(&guarded, &table));
        assert!(vaults_deny_manual_deletion(&guarded, &table));

        let open = backed_up_stack(VaultTarget::Created(ResourceId::new("Vault")), None);
        assert!(!vaults_deny_manual_deletion(&open, &table));

        let mut dangling = backed_up_stack(VaultTarget::Created(ResourceId::new("Vault")), Some(manual_deletion_deny_policy()));
        dangling
            .get_mut(&ResourceId::new("Plan"))
            .unwrap()
            .add_override("BackupPlan.BackupPlanRule.0.TargetBackupVault", get_att(&ResourceId::new("Missing"), "BackupVaultName"))
            .unwrap();
        assert!(!vaults_deny_manual_deletion(&dangling, &table));

        let imported = backed_up_stack(VaultTarget::Imported("existing-vault".into()), None);
        assert!(vaults_deny_manual_deletion(&imported, &table));
        assert!(!is_backed_up(&imported, &ResourceId::new("Other")));
    }
}
