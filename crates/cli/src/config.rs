//! Stack file model and its translation into constructs.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::HashMap;

use compliant_aws::{AwsAnyResource, AwsProvider};
use compliant_constructs::{
    associate_web_acl, CompliantApiStage, CompliantApiStageProps, CompliantDynamodbTable, CompliantLambda,
    CompliantLambdaProps, CompliantRestApi, CompliantRestApiProps, CompliantS3, CompliantS3Props, CompliantTableProps,
};
use compliant_core::Stack;

pub const DEFAULT_STACK_NAME: &str = "compliant-stack";

#[derive(Debug, Deserialize)]
pub struct StackFile {
    pub project: Option<String>,
    #[serde(default)]
    pub provider: Providers,
    #[serde(default)]
    pub resources: Vec<ResourceDef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Providers {
    #[serde(default)]
    pub aws: Option<AwsProvider>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDef {
    RestApi { name: String, #[serde(flatten)] props: CompliantRestApiProps },
    ApiStage { name: String, #[serde(flatten)] props: CompliantApiStageProps },
    Table { name: String, #[serde(flatten)] props: CompliantTableProps },
    Function { name: String, #[serde(flatten)] props: CompliantLambdaProps },
    Bucket { name: String, #[serde(flatten)] props: CompliantS3Props },
    /// `target` names a `rest_api` or `api_stage` declared in the same file.
    WafAssociation { name: String, web_acl_arn: Json, target: String },
    AwsAny(AwsAnyResource),
}

impl StackFile {
    pub fn stack_name(&self) -> &str {
        self.project.as_deref().unwrap_or(DEFAULT_STACK_NAME)
    }

    pub fn region(&self) -> Option<&str> {
        self.provider.aws.as_ref().map(|p| p.region.as_str())
    }

    /// Builds every construct. Web ACL associations are attached last so they
    /// can target stages declared anywhere in the file.
    pub fn build(self) -> Result<Stack> {
        let mut stack = Stack::new(self.stack_name());
        let mut stages: HashMap<String, Option<Json>> = HashMap::new();
        let mut associations = Vec::new();

        for def in self.resources {
            match def {
                ResourceDef::RestApi { name, props } => {
                    let api = CompliantRestApi::new(&mut stack, &name, props)?;
                    stages.insert(name, api.stage_arn());
                }
                ResourceDef::ApiStage { name, props } => {
                    let stage = CompliantApiStage::new(&mut stack, &name, props)?;
                    stages.insert(name, Some(stage.stage_arn()));
                }
                ResourceDef::Table { name, props } => { CompliantDynamodbTable::new(&mut stack, &name, props)?; }
                ResourceDef::Function { name, props } => { CompliantLambda::new(&mut stack, &name, props)?; }
                ResourceDef::Bucket { name, props } => { CompliantS3::new(&mut stack, &name, props)?; }
                ResourceDef::WafAssociation { name, web_acl_arn, target } => associations.push((name, web_acl_arn, target)),
                ResourceDef::AwsAny(res) => {
                    let r = res.to_cfn()?;
                    stack.add(r).with_context(|| format!("resource '{}'", res.name))?;
                }
            }
        }

        for (name, web_acl_arn, target) in associations {
            let arn = match stages.get(&target) {
                Some(Some(arn)) => arn.clone(),
                Some(None) => anyhow::bail!("waf association '{name}': '{target}' has no deployed stage"),
                None => anyhow::bail!("waf association '{name}': unknown target '{target}'"),
            };
            associate_web_acl(&mut stack, &name, arn, web_acl_arn)?;
        }
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> StackFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn resources_are_tagged_by_kind() {
        let f = parse(r#"
project: shop
provider: { aws: { region: eu-west-1 } }
resources:
  - kind: table
    name: Orders
    partition_key: { name: pk, type: STRING }
    disabled_rules: [in-backup-plan]
  - kind: bucket
    name: Assets
    versioned: true
  - kind: aws_any
    name: Topic
    type: AWS::SNS::Topic
    TopicName: events
"#);
        assert_eq!(f.stack_name(), "shop");
        assert_eq!(f.region(), Some("eu-west-1"));
        assert!(matches!(f.resources[0], ResourceDef::Table { ref name, .. } if name == "Orders"));
        assert!(matches!(f.resources[2], ResourceDef::AwsAny(ref r) if r.type_name == "AWS::SNS::Topic"));
    }

    #[test]
    fn waf_association_needs_a_known_stage() {
        let f = parse(r#"
resources:
  - kind: waf_association
    name: Acl
    web_acl_arn: arn:aws:wafv2:eu-west-1:123456789012:regional/webacl/x/y
    target: Nope
"#);
        assert_eq!(f.stack_name(), DEFAULT_STACK_NAME);
        let Err(err) = f.build() else { panic!("expected an unknown target error") };
        assert!(err.to_string().contains("unknown target 'Nope'"));
    }

    #[test]
    fn waf_association_targets_the_rest_api_stage() {
        let f = parse(r#"
resources:
  - kind: waf_association
    name: Acl
    web_acl_arn: arn:aws:wafv2:eu-west-1:123456789012:regional/webacl/x/y
    target: Api
  - kind: rest_api
    name: Api
"#);
        let stack = f.build().unwrap();
        assert_eq!(stack.of_type("AWS::WAFv2::WebACLAssociation").count(), 1);
    }
}
