use serde_json::Value as Json;

use compliant_aws::dynamodb::{BillingMode, CapacityDimension, TableEncryption, TableProps};
use compliant_core::{Misconfiguration, Resource, ResourceId, Stack, Validation};

use crate::backup::{is_backed_up, vaults_deny_manual_deletion};
use crate::{DisabledRules, Findings};

rules! {
    DynamoDbRule, "dynamodb" {
        BackupRecoveryPointManualDeletionDisabled => "backup-recovery-point-manual-deletion-disabled", "BACKUP_RECOVERY_POINT_MANUAL_DELETION_DISABLED";
        InBackupPlan => "in-backup-plan", "DYNAMODB_IN_BACKUP_PLAN";
        PitrEnabled => "pitr-enabled", "DYNAMODB_PITR_ENABLED";
        AutoscalingEnabled => "autoscaling-enabled", "DYNAMODB_AUTOSCALING_ENABLED";
        ThroughputLimitCheck => "throughput-limit-check", "DYNAMODB_THROUGHPUT_LIMIT_CHECK";
        TableEncryptedKms => "table-encrypted-kms", "DYNAMODB_TABLE_ENCRYPTED_KMS";
        TableDeletionProtectionEnabled => "table-deletion-protection-enabled", "DYNAMODB_TABLE_DELETION_PROTECTION_ENABLED";
        BillingMode => "billing-mode", "DYNAMODB_BILLING_MODE";
    }
}

pub fn resolve_table(props: &TableProps, disabled: &DisabledRules<DynamoDbRule>) -> TableProps {
    let resolved = TableProps {
        encryption: disabled.enforce(DynamoDbRule::TableEncryptedKms, props.encryption, TableEncryption::CustomerManaged),
        point_in_time_recovery: disabled.enforce(DynamoDbRule::PitrEnabled, props.point_in_time_recovery, true),
        deletion_protection: disabled.enforce(DynamoDbRule::TableDeletionProtectionEnabled, props.deletion_protection, true),
        billing_mode: disabled.enforce(DynamoDbRule::BillingMode, props.billing_mode, BillingMode::PayPerRequest),
        ..props.clone()
    };
    tracing::debug!(
        billing_mode = resolved.effective_billing_mode().as_str(),
        encryption = ?resolved.encryption,
        "resolved table configuration"
    );
    resolved
}

fn flag(table: &Resource, path: &str) -> bool {
    table.pointer(path).and_then(Json::as_bool).unwrap_or(false)
}

fn encrypted_with_kms(table: &Resource) -> bool {
    flag(table, "SSESpecification.SSEEnabled") && table.pointer("SSESpecification.SSEType").and_then(Json::as_str) == Some("KMS")
}

fn is_provisioned(table: &Resource) -> bool {
    table.prop("BillingMode").and_then(Json::as_str) != Some("PAY_PER_REQUEST")
}

fn scaled(stack: &Stack, table: &ResourceId, dim: CapacityDimension) -> bool {
    stack.of_type("AWS::ApplicationAutoScaling::ScalableTarget").any(|t| {
        t.refers_to(table) && t.prop("ScalableDimension").and_then(Json::as_str) == Some(dim.scalable_dimension())
    })
}

fn throughput_within_limits(props: &TableProps) -> bool {
    if props.effective_billing_mode() != BillingMode::Provisioned {
        return true;
    }
    matches!((props.read_capacity, props.write_capacity), (Some(r), Some(w)) if r > 0 && w > 0)
}

#[derive(Debug, Clone)]
pub struct TableValidator {
    pub table: ResourceId,
    /// Resolved properties, used for checks on declared intent.
    pub props: TableProps,
    pub disabled: DisabledRules<DynamoDbRule>,
}

impl Validation for TableValidator {
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration> {
        let table = stack
            .get(&self.table)
            .ok_or_else(|| Misconfiguration::new(format!("table '{}' is not in the stack", self.table)))?;
        let mut findings = Findings::new(&self.disabled);
        findings.check(DynamoDbRule::TableEncryptedKms, || encrypted_with_kms(table),
            "table must be encrypted with a KMS key");
        findings.check(DynamoDbRule::PitrEnabled, || flag(table, "PointInTimeRecoverySpecification.PointInTimeRecoveryEnabled"),
            "point-in-time recovery must be enabled");
        findings.check(DynamoDbRule::TableDeletionProtectionEnabled, || flag(table, "DeletionProtectionEnabled"),
            "deletion protection must be enabled");
        findings.check(DynamoDbRule::BillingMode, || !is_provisioned(table),
            "billing mode must be PAY_PER_REQUEST");
        findings.check(DynamoDbRule::ThroughputLimitCheck, || throughput_within_limits(&self.props),
            "provisioned tables must set read and write capacity above zero");
        findings.check(DynamoDbRule::AutoscalingEnabled,
            || !is_provisioned(table) || (scaled(stack, &self.table, CapacityDimension::Read) && scaled(stack, &self.table, CapacityDimension::Write)),
            "provisioned tables must auto scale read and write capacity");
        findings.check(DynamoDbRule::InBackupPlan, || is_backed_up(stack, &self.table),
            "table must be protected by a backup plan");
        findings.check(DynamoDbRule::BackupRecoveryPointManualDeletionDisabled, || vaults_deny_manual_deletion(stack, &self.table),
            "backup vault must deny manual deletion of recovery points");
        Ok(findings.finish())
    }
}
