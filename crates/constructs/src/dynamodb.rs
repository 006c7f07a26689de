use anyhow::{Context, Result};
use serde::Deserialize;

use compliant_aws::dynamodb::{scaling_to_cfn, BillingMode, CapacityDimension, TableEncryption, TableProps};
use compliant_aws::kms::customer_managed_key;
use compliant_core::{get_att, DeletionPolicy, ResourceId, Stack};
use compliant_policy::backup::BackupOptions;
use compliant_policy::dynamodb::{resolve_table, TableValidator};
use compliant_policy::{DisabledRules, DynamoDbRule};

use crate::backup::{attach_backup, BackupHandles, BackupTarget};

#[derive(Debug, Clone, Deserialize)]
pub struct CompliantTableProps {
    #[serde(flatten)]
    pub table: TableProps,
    #[serde(flatten)]
    pub backup: BackupOptions,
    #[serde(default)]
    pub disabled_rules: DisabledRules<DynamoDbRule>,
}

impl CompliantTableProps {
    pub fn new(table: TableProps) -> Self {
        CompliantTableProps { table, backup: BackupOptions::default(), disabled_rules: DisabledRules::none() }
    }
}

#[derive(Debug, Clone)]
pub struct CompliantDynamodbTable {
    pub table: ResourceId,
    pub key: Option<ResourceId>,
    pub scaling: Vec<ResourceId>,
    pub backup: Option<BackupHandles>,
    pub props: TableProps,
}

impl CompliantDynamodbTable {
    pub fn new(stack: &mut Stack, id: &str, props: CompliantTableProps) -> Result<Self> {
        let CompliantTableProps { table: user, backup, disabled_rules } = props;
        disabled_rules.log_opt_outs(id);
        let resolved = resolve_table(&user, &disabled_rules);
        let backup = backup
            .resolve(disabled_rules.is_active(DynamoDbRule::BackupRecoveryPointManualDeletionDisabled))
            .with_context(|| format!("table '{id}'"))?;

        let table = ResourceId::new(id);
        let key = match (resolved.encryption, &resolved.encryption_key) {
            (Some(TableEncryption::CustomerManaged), None) => {
                let kid = table.child("Key");
                stack.add(customer_managed_key(&kid, &format!("Encryption key for table {id}")))?;
                Some(kid)
            }
            _ => None,
        };
        stack
            .add(resolved.to_cfn(&table, key.as_ref()).with_deletion_policy(DeletionPolicy::Retain))
            .with_context(|| format!("table '{id}'"))?;

        let mut scaling = Vec::new();
        for dim in [CapacityDimension::Read, CapacityDimension::Write] {
            let Some(bounds) = resolved.scaling_bounds(dim) else { continue };
            if resolved.effective_billing_mode() == BillingMode::PayPerRequest {
                tracing::warn!(construct = id, dimension = dim.scalable_dimension(), "on-demand tables do not auto scale, ignoring bounds");
                continue;
            }
            for r in scaling_to_cfn(&table, dim, bounds) {
                scaling.push(stack.add(r)?);
            }
        }

        let backup = if disabled_rules.is_active(DynamoDbRule::InBackupPlan) {
            Some(attach_backup(stack, BackupTarget {
                owner: &table,
                prefix: "DynamoDb",
                rule_name: "daily-dynamodb-backup",
                arn: get_att(&table, "Arn"),
                role_policies: &[
                    "service-role/AWSBackupServiceRolePolicyForBackup",
                    "service-role/AWSBackupServiceRolePolicyForRestores",
                ],
            }, &backup)?)
        } else {
            None
        };

        stack.add_validation(id, TableValidator { table: table.clone(), props: resolved.clone(), disabled: disabled_rules });
        tracing::info!(construct = id, table = %table, billing_mode = resolved.effective_billing_mode().as_str(), "materialized table");
        Ok(CompliantDynamodbTable { table, key, scaling, backup, props: resolved })
    }
}
