use serde_json::Value as Json;

use compliant_aws::s3::{BlockPublicAccess, BucketAccessControl, BucketEncryption, BucketProps};
use compliant_core::{references, Misconfiguration, Resource, ResourceId, Stack, Validation};

use crate::backup::is_backed_up;
use crate::{DisabledRules, Findings};

rules! {
    S3Rule, "s3" {
        BucketAclProhibited => "bucket-acl-prohibited", "S3_BUCKET_ACL_PROHIBITED";
        BucketDefaultLockEnabled => "bucket-default-lock-enabled", "S3_BUCKET_DEFAULT_LOCK_ENABLED";
        BucketLevelPublicAccessProhibited => "bucket-level-public-access-prohibited", "S3_BUCKET_LEVEL_PUBLIC_ACCESS_PROHIBITED";
        BucketLoggingEnabled => "bucket-logging-enabled", "S3_BUCKET_LOGGING_ENABLED";
        BucketPublicReadProhibited => "bucket-public-read-prohibited", "S3_BUCKET_PUBLIC_READ_PROHIBITED";
        BucketPublicWriteProhibited => "bucket-public-write-prohibited", "S3_BUCKET_PUBLIC_WRITE_PROHIBITED";
        BucketServerSideEncryptionEnabled => "bucket-server-side-encryption-enabled", "S3_BUCKET_SERVER_SIDE_ENCRYPTION_ENABLED";
        BucketSslRequestsOnly => "bucket-ssl-requests-only", "S3_BUCKET_SSL_REQUESTS_ONLY";
        DefaultEncryptionKms => "default-encryption-kms", "S3_DEFAULT_ENCRYPTION_KMS";
        EventNotificationsEnabled => "event-notifications-enabled", "S3_EVENT_NOTIFICATIONS_ENABLED";
        LifecyclePolicyCheck => "lifecycle-policy-check", "S3_LIFECYCLE_POLICY_CHECK";
        ResourcesProtectedByBackupPlan => "resources-protected-by-backup-plan", "S3_RESOURCES_PROTECTED_BY_BACKUP_PLAN";
    }
}

use S3Rule::*;

/// Customer-key KMS wins over KMS-managed; with both rules off the user's
/// choice stands.
fn resolve_encryption(user: Option<BucketEncryption>, disabled: &DisabledRules<S3Rule>) -> Option<BucketEncryption> {
    if disabled.is_active(DefaultEncryptionKms) {
        Some(BucketEncryption::Kms)
    } else if disabled.is_active(BucketServerSideEncryptionEnabled) {
        Some(BucketEncryption::KmsManaged)
    } else {
        user
    }
}

pub fn resolve_bucket(props: &BucketProps, disabled: &DisabledRules<S3Rule>) -> BucketProps {
    let resolved = BucketProps {
        object_lock_enabled: disabled.enforce(BucketDefaultLockEnabled, props.object_lock_enabled, true),
        access_control: disabled.enforce(BucketAclProhibited, props.access_control, BucketAccessControl::Private),
        block_public_access: disabled.enforce(BucketLevelPublicAccessProhibited, props.block_public_access, BlockPublicAccess::BLOCK_ALL),
        enforce_ssl: disabled.enforce(BucketSslRequestsOnly, props.enforce_ssl, true),
        encryption: resolve_encryption(props.encryption, disabled),
        ..props.clone()
    };
    tracing::debug!(encryption = ?resolved.encryption, enforce_ssl = ?resolved.enforce_ssl, "resolved bucket configuration");
    resolved
}

fn public_access_flag(bucket: &Resource, name: &str) -> bool {
    bucket
        .prop("PublicAccessBlockConfiguration")
        .and_then(|c| c.get(name))
        .and_then(Json::as_bool)
        .unwrap_or(false)
}

fn blocks_all_public_access(bucket: &Resource) -> bool {
    ["BlockPublicAcls", "BlockPublicPolicy", "IgnorePublicAcls", "RestrictPublicBuckets"]
        .iter()
        .all(|f| public_access_flag(bucket, f))
}

/// Policies or cross-account access must be restricted, and ACLs blocked.
fn public_read_write_prohibited(bucket: &Resource) -> bool {
    (public_access_flag(bucket, "BlockPublicPolicy") || public_access_flag(bucket, "RestrictPublicBuckets"))
        && public_access_flag(bucket, "BlockPublicAcls")
}

fn sse_default(bucket: &Resource) -> Option<&Json> {
    bucket.pointer("BucketEncryption.ServerSideEncryptionConfiguration.0.ServerSideEncryptionByDefault")
}

fn sse_algorithm(bucket: &Resource) -> Option<&str> {
    sse_default(bucket)?.get("SSEAlgorithm")?.as_str()
}

fn encrypted_with_customer_key(bucket: &Resource) -> bool {
    sse_algorithm(bucket) == Some("aws:kms")
        && sse_default(bucket).and_then(|d| d.get("KMSMasterKeyID")).is_some_and(|k| !k.is_null())
}

fn denies_insecure_transport(stack: &Stack, bucket: &ResourceId) -> bool {
    stack
        .of_type("AWS::S3::BucketPolicy")
        .filter(|p| p.prop("Bucket").is_some_and(|b| references(b).contains(bucket)))
        .filter_map(|p| p.pointer("PolicyDocument.Statement").and_then(Json::as_array))
        .flatten()
        .any(|s| {
            let secure = s.pointer("/Condition/Bool/aws:SecureTransport");
            s.get("Effect").and_then(Json::as_str) == Some("Deny")
                && (matches!(secure, Some(Json::String(v)) if v == "false") || matches!(secure, Some(Json::Bool(false))))
        })
}

fn has_notifications(bucket: &Resource) -> bool {
    bucket.prop("NotificationConfiguration").and_then(Json::as_object).is_some_and(|n| !n.is_empty())
}

fn has_lifecycle_rules(bucket: &Resource) -> bool {
    bucket.pointer("LifecycleConfiguration.Rules").and_then(Json::as_array).is_some_and(|r| !r.is_empty())
}

#[derive(Debug, Clone)]
pub struct BucketValidator {
    pub bucket: ResourceId,
    pub disabled: DisabledRules<S3Rule>,
}

impl Validation for BucketValidator {
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration> {
        let bucket = stack
            .get(&self.bucket)
            .ok_or_else(|| Misconfiguration::new(format!("bucket '{}' is not in the stack", self.bucket)))?;
        let mut f = Findings::new(&self.disabled);
        f.check(BucketAclProhibited,
            || bucket.prop("AccessControl").map_or(true, |acl| acl.as_str() == Some("Private")),
            "bucket ACLs must not grant access beyond the owner");
        f.check(BucketDefaultLockEnabled,
            || bucket.prop("ObjectLockEnabled").and_then(Json::as_bool) == Some(true),
            "object lock must be enabled");
        f.check(BucketLevelPublicAccessProhibited, || blocks_all_public_access(bucket),
            "all public access block settings must be enabled");
        f.check(BucketPublicReadProhibited, || public_read_write_prohibited(bucket),
            "public read access must be blocked");
        f.check(BucketPublicWriteProhibited, || public_read_write_prohibited(bucket),
            "public write access must be blocked");
        f.check(BucketSslRequestsOnly, || denies_insecure_transport(stack, &self.bucket),
            "bucket policy must deny requests made without TLS");
        f.check(DefaultEncryptionKms, || encrypted_with_customer_key(bucket),
            "default encryption must use a customer managed KMS key");
        f.check(BucketServerSideEncryptionEnabled,
            || matches!(sse_algorithm(bucket), Some("aws:kms" | "aws:kms:dsse")),
            "server-side encryption must use KMS");
        f.check(BucketLoggingEnabled, || bucket.prop("LoggingConfiguration").is_some(),
            "server access logging must be enabled");
        f.check(EventNotificationsEnabled, || has_notifications(bucket),
            "event notifications must be configured");
        f.check(LifecyclePolicyCheck, || has_lifecycle_rules(bucket),
            "a lifecycle policy must be configured");
        f.check(ResourcesProtectedByBackupPlan, || is_backed_up(stack, &self.bucket),
            "bucket must be protected by a backup plan");
        Ok(f.finish())
    }
}
