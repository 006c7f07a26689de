use serde_json::{json, Value as Json};

use compliant_core::{Resource, ResourceId};

pub fn web_acl_association_to_cfn(id: &ResourceId, resource_arn: Json, web_acl_arn: Json) -> Resource {
    Resource::new(id.clone(), "AWS::WAFv2::WebACLAssociation", json!({
        "ResourceArn": resource_arn,
        "WebACLArn": web_acl_arn,
    }))
}
