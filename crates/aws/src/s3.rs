use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json, Map as JsonMap};

use compliant_core::{get_att, ref_to, Resource, ResourceId};

use crate::iam::{Effect, PolicyDocument, PolicyStatement, Principal};
use crate::{join, put};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketEncryption {
    Unencrypted,
    S3Managed,
    KmsManaged,
    /// Customer managed key; created when no key ARN is given.
    Kms,
    DsseManaged,
    Dsse,
}

impl BucketEncryption {
    fn algorithm(self) -> Option<&'static str> {
        match self {
            BucketEncryption::Unencrypted => None,
            BucketEncryption::S3Managed => Some("AES256"),
            BucketEncryption::KmsManaged | BucketEncryption::Kms => Some("aws:kms"),
            BucketEncryption::DsseManaged | BucketEncryption::Dsse => Some("aws:kms:dsse"),
        }
    }

    pub fn needs_key(self) -> bool { matches!(self, BucketEncryption::Kms | BucketEncryption::Dsse) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockPublicAccess {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl BlockPublicAccess {
    pub const BLOCK_ALL: BlockPublicAccess = BlockPublicAccess {
        block_public_acls: true,
        block_public_policy: true,
        ignore_public_acls: true,
        restrict_public_buckets: true,
    };

    pub const BLOCK_ACLS: BlockPublicAccess = BlockPublicAccess {
        block_public_acls: true,
        block_public_policy: false,
        ignore_public_acls: true,
        restrict_public_buckets: false,
    };

    fn to_json(self) -> Json {
        json!({
            "BlockPublicAcls": self.block_public_acls,
            "BlockPublicPolicy": self.block_public_policy,
            "IgnorePublicAcls": self.ignore_public_acls,
            "RestrictPublicBuckets": self.restrict_public_buckets,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketAccessControl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    LogDeliveryWrite,
    BucketOwnerRead,
    BucketOwnerFullControl,
    AwsExecRead,
}

impl BucketAccessControl {
    pub fn as_str(self) -> &'static str {
        match self {
            BucketAccessControl::Private => "Private",
            BucketAccessControl::PublicRead => "PublicRead",
            BucketAccessControl::PublicReadWrite => "PublicReadWrite",
            BucketAccessControl::AuthenticatedRead => "AuthenticatedRead",
            BucketAccessControl::LogDeliveryWrite => "LogDeliveryWrite",
            BucketAccessControl::BucketOwnerRead => "BucketOwnerRead",
            BucketAccessControl::BucketOwnerFullControl => "BucketOwnerFullControl",
            BucketAccessControl::AwsExecRead => "AwsExecRead",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleRule {
    pub id: Option<String>,
    pub prefix: Option<String>,
    pub expiration_days: Option<u32>,
    pub noncurrent_version_expiration_days: Option<u32>,
    pub abort_incomplete_multipart_upload_days: Option<u32>,
}

impl LifecycleRule {
    fn to_json(&self) -> Json {
        let mut r = JsonMap::new();
        r.insert("Status".into(), json!("Enabled"));
        put(&mut r, "Id", self.id.as_deref());
        put(&mut r, "Prefix", self.prefix.as_deref());
        put(&mut r, "ExpirationInDays", self.expiration_days);
        if let Some(days) = self.noncurrent_version_expiration_days {
            r.insert("NoncurrentVersionExpiration".into(), json!({ "NoncurrentDays": days }));
        }
        if let Some(days) = self.abort_incomplete_multipart_upload_days {
            r.insert("AbortIncompleteMultipartUpload".into(), json!({ "DaysAfterInitiation": days }));
        }
        Json::Object(r)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationDestination {
    Queue(String),
    Topic(String),
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotification {
    /// S3 event name, e.g. `s3:ObjectCreated:*`.
    pub event: String,
    pub destination: NotificationDestination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketProps {
    pub bucket_name: Option<String>,
    pub encryption: Option<BucketEncryption>,
    /// ARN of an existing key for `KMS` / `DSSE`.
    pub encryption_key: Option<String>,
    pub bucket_key_enabled: Option<bool>,
    pub block_public_access: Option<BlockPublicAccess>,
    pub access_control: Option<BucketAccessControl>,
    pub enforce_ssl: Option<bool>,
    pub object_lock_enabled: Option<bool>,
    pub versioned: Option<bool>,
    pub server_access_logs_bucket: Option<String>,
    pub server_access_logs_prefix: Option<String>,
    pub lifecycle_rules: Vec<LifecycleRule>,
    pub event_bridge_enabled: Option<bool>,
    pub notifications: Vec<EventNotification>,
}

impl BucketProps {
    /// `key` is the logical id of a key created alongside the bucket.
    pub fn to_cfn(&self, id: &ResourceId, key: Option<&ResourceId>) -> Resource {
        let mut props = JsonMap::new();
        put(&mut props, "BucketName", self.bucket_name.as_deref());

        if let Some(algorithm) = self.encryption.and_then(BucketEncryption::algorithm) {
            let mut default = json!({ "SSEAlgorithm": algorithm });
            if self.encryption.is_some_and(BucketEncryption::needs_key) {
                match (&self.encryption_key, key) {
                    (Some(arn), _) => default["KMSMasterKeyID"] = json!(arn),
                    (None, Some(k)) => default["KMSMasterKeyID"] = get_att(k, "Arn"),
                    (None, None) => {}
                }
            }
            let mut rule = json!({ "ServerSideEncryptionByDefault": default });
            if let Some(bke) = self.bucket_key_enabled { rule["BucketKeyEnabled"] = json!(bke); }
            props.insert("BucketEncryption".into(), json!({ "ServerSideEncryptionConfiguration": [rule] }));
        }

        put(&mut props, "PublicAccessBlockConfiguration", self.block_public_access.map(BlockPublicAccess::to_json));
        put(&mut props, "AccessControl", self.access_control.map(BucketAccessControl::as_str));
        if self.object_lock_enabled == Some(true) {
            props.insert("ObjectLockEnabled".into(), json!(true));
        }
        if self.versioned == Some(true) || self.object_lock_enabled == Some(true) {
            props.insert("VersioningConfiguration".into(), json!({ "Status": "Enabled" }));
        }

        if self.server_access_logs_bucket.is_some() || self.server_access_logs_prefix.is_some() {
            let mut logging = JsonMap::new();
            put(&mut logging, "DestinationBucketName", self.server_access_logs_bucket.as_deref());
            put(&mut logging, "LogFilePrefix", self.server_access_logs_prefix.as_deref());
            props.insert("LoggingConfiguration".into(), Json::Object(logging));
        }

        if !self.lifecycle_rules.is_empty() {
            props.insert("LifecycleConfiguration".into(), json!({
                "Rules": self.lifecycle_rules.iter().map(LifecycleRule::to_json).collect::<Vec<_>>(),
            }));
        }

        if let Some(n) = self.notification_configuration() {
            props.insert("NotificationConfiguration".into(), n);
        }
        Resource::new(id.clone(), "AWS::S3::Bucket", Json::Object(props))
    }

    fn notification_configuration(&self) -> Option<Json> {
        let mut n = JsonMap::new();
        if self.event_bridge_enabled == Some(true) {
            n.insert("EventBridgeConfiguration".into(), json!({ "EventBridgeEnabled": true }));
        }
        let (mut queues, mut topics, mut functions) = (Vec::new(), Vec::new(), Vec::new());
        for e in &self.notifications {
            match &e.destination {
                NotificationDestination::Queue(arn) => queues.push(json!({ "Event": e.event, "Queue": arn })),
                NotificationDestination::Topic(arn) => topics.push(json!({ "Event": e.event, "Topic": arn })),
                NotificationDestination::Function(arn) => functions.push(json!({ "Event": e.event, "Function": arn })),
            }
        }
        for (key, list) in [("QueueConfigurations", queues), ("TopicConfigurations", topics), ("LambdaConfigurations", functions)] {
            if !list.is_empty() { n.insert(key.into(), Json::Array(list)); }
        }
        (!n.is_empty()).then_some(Json::Object(n))
    }
}

/// Bucket policy denying every request not made over TLS.
pub fn ssl_only_policy_to_cfn(id: &ResourceId, bucket: &ResourceId) -> Resource {
    let arn = get_att(bucket, "Arn");
    let doc = PolicyDocument::new(vec![
        PolicyStatement::new(Effect::Deny, &["s3:*"])
            .principal(Principal::Any)
            .condition(json!({ "Bool": { "aws:SecureTransport": "false" } }))
            .resource(arn.clone())
            .resource(join(vec![arn, json!("/*")])),
    ]);
    Resource::new(id.clone(), "AWS::S3::BucketPolicy", json!({
        "Bucket": ref_to(bucket),
        "PolicyDocument": doc.to_json(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kms_encryption_uses_the_created_key() {
        let b = BucketProps { encryption: Some(BucketEncryption::Kms), ..Default::default() }
            .to_cfn(&ResourceId::new("Bucket"), Some(&ResourceId::new("BucketKey")));
        let default = b.pointer("BucketEncryption.ServerSideEncryptionConfiguration.0.ServerSideEncryptionByDefault").unwrap();
        assert_eq!(default["SSEAlgorithm"], json!("aws:kms"));
        assert_eq!(default["KMSMasterKeyID"], json!({ "Fn::GetAtt": ["BucketKey", "Arn"] }));
    }

    #[test]
    fn kms_encryption_without_a_key_omits_the_key_id() {
        let b = BucketProps { encryption: Some(BucketEncryption::Kms), ..Default::default() }
            .to_cfn(&ResourceId::new("Bucket"), None);
        let default = b.pointer("BucketEncryption.ServerSideEncryptionConfiguration.0.ServerSideEncryptionByDefault").unwrap();
        assert_eq!(default["SSEAlgorithm"], json!("aws:kms"));
        assert!(default.get("KMSMasterKeyID").is_none());
    }

    #[test]
    fn kms_managed_encryption_has_no_key_id() {
        let b = BucketProps { encryption: Some(BucketEncryption::KmsManaged), ..Default::default() }
            .to_cfn(&ResourceId::new("Bucket"), None);
        assert!(b.pointer("BucketEncryption.ServerSideEncryptionConfiguration.0.ServerSideEncryptionByDefault.KMSMasterKeyID").is_none());
    }

    #[test]
    fn object_lock_turns_on_versioning() {
        let b = BucketProps { object_lock_enabled: Some(true), ..Default::default() }.to_cfn(&ResourceId::new("Bucket"), None);
        assert_eq!(b.pointer("VersioningConfiguration.Status"), Some(&json!("Enabled")));
        assert_eq!(b.prop("ObjectLockEnabled"), Some(&json!(true)));
    }

    #[test]
    fn notifications_are_grouped_by_destination() {
        let b = BucketProps {
            event_bridge_enabled: Some(true),
            notifications: vec![EventNotification {
                event: "s3:ObjectCreated:*".into(),
                destination: NotificationDestination::Queue("arn:aws:sqs:eu-west-1:123:q".into()),
            }],
            ..Default::default()
        }
        .to_cfn(&ResourceId::new("Bucket"), None);
        assert_eq!(b.pointer("NotificationConfiguration.EventBridgeConfiguration.EventBridgeEnabled"), Some(&json!(true)));
        assert_eq!(b.pointer("NotificationConfiguration.QueueConfigurations.0.Event"), Some(&json!("s3:ObjectCreated:*")));
        assert!(b.pointer("NotificationConfiguration.TopicConfigurations").is_none());
    }

    #[test]
    fn ssl_policy_denies_insecure_transport() {
        let p = ssl_only_policy_to_cfn(&ResourceId::new("BucketPolicy"), &ResourceId::new("Bucket"));
        assert_eq!(p.pointer("PolicyDocument.Statement.0.Effect"), Some(&json!("Deny")));
        assert_eq!(p.pointer("PolicyDocument.Statement.0.Condition.Bool.aws:SecureTransport"), Some(&json!("false")));
        assert!(p.refers_to(&ResourceId::new("Bucket")));
    }
}
