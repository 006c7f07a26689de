use serde_json::json;

use compliant_core::{DeletionPolicy, Resource, ResourceId};

use crate::iam::{Effect, PolicyDocument, PolicyStatement, Principal};
use crate::{account, join, partition};

/// Customer managed key with rotation on; the account root administers it.
pub fn customer_managed_key(id: &ResourceId, description: &str) -> Resource {
    let root = join(vec![json!("arn:"), partition(), json!(":iam::"), account(), json!(":root")]);
    let key_policy = PolicyDocument::new(vec![
        PolicyStatement::new(Effect::Allow, &["kms:*"]).principal(Principal::Aws(root)).resource(json!("*")),
    ]);
    Resource::new(id.clone(), "AWS::KMS::Key", json!({
        "Description": description,
        "EnableKeyRotation": true,
        "KeyPolicy": key_policy.to_json(),
    }))
    .with_deletion_policy(DeletionPolicy::Retain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rotates_and_is_retained() {
        let k = customer_managed_key(&ResourceId::new("TableKey"), "table key");
        assert_eq!(k.prop("EnableKeyRotation"), Some(&json!(true)));
        assert_eq!(k.deletion_policy, Some(DeletionPolicy::Retain));
        assert!(k.pointer("KeyPolicy.Statement.0.Principal.AWS").is_some());
    }
}
