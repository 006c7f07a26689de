use anyhow::{Context, Result};
use serde::Deserialize;

use compliant_aws::kms::customer_managed_key;
use compliant_aws::s3::{ssl_only_policy_to_cfn, BucketProps};
use compliant_core::{get_att, DeletionPolicy, ResourceId, Stack};
use compliant_policy::backup::BackupOptions;
use compliant_policy::s3::{resolve_bucket, BucketValidator};
use compliant_policy::{DisabledRules, S3Rule};

use crate::backup::{attach_backup, BackupHandles, BackupTarget};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompliantS3Props {
    #[serde(flatten)]
    pub bucket: BucketProps,
    #[serde(flatten)]
    pub backup: BackupOptions,
    #[serde(default)]
    pub disabled_rules: DisabledRules<S3Rule>,
}

#[derive(Debug, Clone)]
pub struct CompliantS3 {
    pub bucket: ResourceId,
    pub key: Option<ResourceId>,
    pub policy: Option<ResourceId>,
    pub backup: Option<BackupHandles>,
    pub props: BucketProps,
}

impl CompliantS3 {
    pub fn new(stack: &mut Stack, id: &str, props: CompliantS3Props) -> Result<Self> {
        let CompliantS3Props { bucket: user, backup, disabled_rules } = props;
        disabled_rules.log_opt_outs(id);
        let resolved = resolve_bucket(&user, &disabled_rules);
        // Bucket vaults always refuse manual deletion unless imported.
        let backup = backup.resolve(true).with_context(|| format!("bucket '{id}'"))?;

        let bucket = ResourceId::new(id);
        let key = match (resolved.encryption, &resolved.encryption_key) {
            (Some(enc), None) if enc.needs_key() => {
                let kid = bucket.child("Key");
                stack.add(customer_managed_key(&kid, &format!("Encryption key for bucket {id}")))?;
                Some(kid)
            }
            _ => None,
        };
        stack
            .add(resolved.to_cfn(&bucket, key.as_ref()).with_deletion_policy(DeletionPolicy::Retain))
            .with_context(|| format!("bucket '{id}'"))?;

        let policy = if resolved.enforce_ssl == Some(true) {
            let pid = bucket.child("Policy");
            stack.add(ssl_only_policy_to_cfn(&pid, &bucket))?;
            Some(pid)
        } else {
            None
        };

        let backup = if disabled_rules.is_active(S3Rule::ResourcesProtectedByBackupPlan) {
            Some(attach_backup(stack, BackupTarget {
                owner: &bucket,
                prefix: "S3",
                rule_name: "daily-s3-backup",
                arn: get_att(&bucket, "Arn"),
                role_policies: &[
                    "service-role/AWSBackupServiceRolePolicyForBackup",
                    "service-role/AWSBackupServiceRolePolicyForRestores",
                    "AWSBackupServiceRolePolicyForS3Backup",
                    "AWSBackupServiceRolePolicyForS3Restore",
                ],
            }, &backup)?)
        } else {
            None
        };

        stack.add_validation(id, BucketValidator { bucket: bucket.clone(), disabled: disabled_rules });
        tracing::info!(construct = id, bucket = %bucket, encryption = ?resolved.encryption, "materialized bucket");
        Ok(CompliantS3 { bucket, key, policy, backup, props: resolved })
    }
}
