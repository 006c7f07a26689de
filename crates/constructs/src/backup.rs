use serde_json::Value as Json;

use compliant_aws::backup::{BackupPlan, BackupPlanRule, BackupSelection, BackupVault, VaultTarget};
use compliant_aws::iam::ServiceRole;
use compliant_core::{ResourceId, Stack, SynthError};
use compliant_policy::backup::{manual_deletion_deny_policy, ResolvedBackup, VaultPlan};

/// Logical ids of the backup resources protecting one construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandles {
    pub vault: VaultTarget,
    pub plan: ResourceId,
    pub selection: ResourceId,
    pub role: ResourceId,
}

/// What is being backed up, and how its resources are named.
pub(crate) struct BackupTarget<'a> {
    pub owner: &'a ResourceId,
    /// Prefix for logical ids, e.g. `DynamoDb`.
    pub prefix: &'a str,
    pub rule_name: &'a str,
    pub arn: Json,
    pub role_policies: &'a [&'a str],
}

/// Adds vault (unless imported), daily plan, service role and selection.
pub(crate) fn attach_backup(stack: &mut Stack, target: BackupTarget<'_>, backup: &ResolvedBackup) -> Result<BackupHandles, SynthError> {
    let vault = match &backup.vault {
        VaultPlan::Import(name) => VaultTarget::Imported(name.clone()),
        VaultPlan::Create { deny_manual_deletion } => {
            let id = target.owner.child(&format!("{}BackupVault", target.prefix));
            let access_policy = deny_manual_deletion.then(manual_deletion_deny_policy);
            stack.add(BackupVault { name: id.to_string(), access_policy }.to_cfn(&id))?;
            VaultTarget::Created(id)
        }
    };

    let plan = target.owner.child(&format!("{}BackupPlan", target.prefix));
    stack.add(BackupPlan {
        name: plan.to_string(),
        vault: vault.clone(),
        rules: vec![BackupPlanRule {
            rule_name: target.rule_name.to_string(),
            schedule: backup.schedule.clone(),
            delete_after_days: backup.delete_after_days,
        }],
    }.to_cfn(&plan))?;

    let role = plan.child("Role");
    stack.add(ServiceRole::new("backup.amazonaws.com", target.role_policies).to_cfn(&role))?;

    let selection = plan.child(&format!("{}Selection", target.prefix));
    stack.add(BackupSelection {
        name: selection.to_string(),
        plan: plan.clone(),
        role: role.clone(),
        resources: vec![target.arn],
    }.to_cfn(&selection))?;

    tracing::info!(owner = %target.owner, plan = %plan, ?vault, "attached backup plan");
    Ok(BackupHandles { vault, plan, selection, role })
}
