use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json, Map as JsonMap};

use compliant_core::{get_att, ref_to, Resource, ResourceId};

use crate::{account, join, partition, put};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType { String, Number, Binary }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl Attribute {
    pub fn string(name: &str) -> Self { Attribute { name: name.into(), attribute_type: AttributeType::String } }
    pub fn number(name: &str) -> Self { Attribute { name: name.into(), attribute_type: AttributeType::Number } }

    fn type_code(&self) -> &'static str {
        match self.attribute_type {
            AttributeType::String => "S",
            AttributeType::Number => "N",
            AttributeType::Binary => "B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode { PayPerRequest, Provisioned }

impl BillingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BillingMode::PayPerRequest => "PAY_PER_REQUEST",
            BillingMode::Provisioned => "PROVISIONED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableEncryption {
    /// AWS owned key, no `SSESpecification`.
    Default,
    AwsManaged,
    CustomerManaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingBounds {
    pub min_capacity: u32,
    pub max_capacity: u32,
    #[serde(default)]
    pub target_utilization_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityDimension { Read, Write }

impl CapacityDimension {
    pub fn scalable_dimension(self) -> &'static str {
        match self {
            CapacityDimension::Read => "dynamodb:table:ReadCapacityUnits",
            CapacityDimension::Write => "dynamodb:table:WriteCapacityUnits",
        }
    }

    fn metric(self) -> &'static str {
        match self {
            CapacityDimension::Read => "DynamoDBReadCapacityUtilization",
            CapacityDimension::Write => "DynamoDBWriteCapacityUtilization",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            CapacityDimension::Read => "Read",
            CapacityDimension::Write => "Write",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProps {
    pub partition_key: Attribute,
    #[serde(default)]
    pub sort_key: Option<Attribute>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub billing_mode: Option<BillingMode>,
    #[serde(default)]
    pub read_capacity: Option<u32>,
    #[serde(default)]
    pub write_capacity: Option<u32>,
    #[serde(default)]
    pub encryption: Option<TableEncryption>,
    /// ARN of an existing key for `CUSTOMER_MANAGED`; a key is created when unset.
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub point_in_time_recovery: Option<bool>,
    #[serde(default)]
    pub deletion_protection: Option<bool>,
    #[serde(default)]
    pub time_to_live_attribute: Option<String>,
    #[serde(default)]
    pub auto_scale_read_capacity: Option<ScalingBounds>,
    #[serde(default)]
    pub auto_scale_write_capacity: Option<ScalingBounds>,
}

impl TableProps {
    pub fn new(partition_key: Attribute) -> Self {
        TableProps {
            partition_key,
            sort_key: None,
            table_name: None,
            billing_mode: None,
            read_capacity: None,
            write_capacity: None,
            encryption: None,
            encryption_key: None,
            point_in_time_recovery: None,
            deletion_protection: None,
            time_to_live_attribute: None,
            auto_scale_read_capacity: None,
            auto_scale_write_capacity: None,
        }
    }

    /// Unset billing mode means provisioned, as in CloudFormation.
    pub fn effective_billing_mode(&self) -> BillingMode {
        self.billing_mode.unwrap_or(BillingMode::Provisioned)
    }

    /// `key` is the logical id of a key created alongside the table.
    pub fn to_cfn(&self, id: &ResourceId, key: Option<&ResourceId>) -> Resource {
        let mut keys = vec![&self.partition_key];
        keys.extend(self.sort_key.as_ref());
        let mut props = JsonMap::new();
        props.insert("KeySchema".into(), json!(keys.iter().enumerate().map(|(i, a)| json!({
            "AttributeName": a.name,
            "KeyType": if i == 0 { "HASH" } else { "RANGE" },
        })).collect::<Vec<_>>()));
        props.insert("AttributeDefinitions".into(), json!(keys.iter().map(|a| json!({
            "AttributeName": a.name,
            "AttributeType": a.type_code(),
        })).collect::<Vec<_>>()));
        put(&mut props, "TableName", self.table_name.as_deref());

        let billing = self.effective_billing_mode();
        props.insert("BillingMode".into(), json!(billing.as_str()));
        if billing == BillingMode::Provisioned {
            props.insert("ProvisionedThroughput".into(), json!({
                "ReadCapacityUnits": self.read_capacity.unwrap_or(5),
                "WriteCapacityUnits": self.write_capacity.unwrap_or(5),
            }));
        }

        match self.encryption {
            None | Some(TableEncryption::Default) => {}
            Some(TableEncryption::AwsManaged) => {
                props.insert("SSESpecification".into(), json!({ "SSEEnabled": true }));
            }
            Some(TableEncryption::CustomerManaged) => {
                let mut sse = json!({ "SSEEnabled": true, "SSEType": "KMS" });
                match (&self.encryption_key, key) {
                    (Some(arn), _) => sse["KMSMasterKeyId"] = json!(arn),
                    (None, Some(k)) => sse["KMSMasterKeyId"] = get_att(k, "Arn"),
                    (None, None) => {}
                }
                props.insert("SSESpecification".into(), sse);
            }
        }

        if let Some(pitr) = self.point_in_time_recovery {
            props.insert("PointInTimeRecoverySpecification".into(), json!({ "PointInTimeRecoveryEnabled": pitr }));
        }
        put(&mut props, "DeletionProtectionEnabled", self.deletion_protection);
        if let Some(attr) = &self.time_to_live_attribute {
            props.insert("TimeToLiveSpecification".into(), json!({ "AttributeName": attr, "Enabled": true }));
        }
        Resource::new(id.clone(), "AWS::DynamoDB::Table", Json::Object(props))
    }

    pub fn scaling_bounds(&self, dim: CapacityDimension) -> Option<&ScalingBounds> {
        match dim {
            CapacityDimension::Read => self.auto_scale_read_capacity.as_ref(),
            CapacityDimension::Write => self.auto_scale_write_capacity.as_ref(),
        }
    }
}

/// Scalable target plus target-tracking policy for one capacity dimension.
pub fn scaling_to_cfn(table: &ResourceId, dim: CapacityDimension, bounds: &ScalingBounds) -> [Resource; 2] {
    let target_id = table.child(&format!("{}Scaling", dim.suffix()));
    let role = join(vec![
        json!("arn:"), partition(), json!(":iam::"), account(),
        json!(":role/aws-service-role/dynamodb.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_DynamoDBTable"),
    ]);
    let target = Resource::new(target_id.clone(), "AWS::ApplicationAutoScaling::ScalableTarget", json!({
        "MinCapacity": bounds.min_capacity,
        "MaxCapacity": bounds.max_capacity,
        "ResourceId": join(vec![json!("table/"), ref_to(table)]),
        "ScalableDimension": dim.scalable_dimension(),
        "ServiceNamespace": "dynamodb",
        "RoleARN": role,
    }));
    let policy = Resource::new(target_id.child("Policy"), "AWS::ApplicationAutoScaling::ScalingPolicy", json!({
        "PolicyName": format!("{}{}Scaling", table, dim.suffix()),
        "PolicyType": "TargetTrackingScaling",
        "ScalingTargetId": ref_to(&target_id),
        "TargetTrackingScalingPolicyConfiguration": {
            "PredefinedMetricSpecification": { "PredefinedMetricType": dim.metric() },
            "TargetValue": bounds.target_utilization_percent.unwrap_or(70.0),
        },
    }));
    [target, policy]
}
