use anyhow::{Context, Result};
use serde::{Serialize, Deserialize};
use serde_json::{Map as JsonMap, Value as Json};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use compliant_core::{Assembly, DeletionPolicy, Resource};

fn aws() -> Result<PathBuf> {
    which::which("aws").context("aws cli not found in PATH")
}

pub fn deploy_stack(stack_name: &str, template_file: &Path, region: Option<&str>) -> Result<()> {
    let mut cmd = Command::new(aws()?);
    cmd.arg("cloudformation").arg("deploy")
        .arg("--stack-name").arg(stack_name)
        .arg("--template-file").arg(template_file)
        .arg("--capabilities").arg("CAPABILITY_NAMED_IAM");
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    tracing::info!(stack = stack_name, template = %template_file.display(), "deploying stack");
    let st = cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit())
        .status().context("spawn aws cloudformation deploy")?;
    if !st.success() { anyhow::bail!("cloudformation deploy failed") }
    Ok(())
}

pub fn delete_stack(stack_name: &str, region: Option<&str>) -> Result<()> {
    let mut cmd = Command::new(aws()?);
    cmd.arg("cloudformation").arg("delete-stack")
        .arg("--stack-name").arg(stack_name);
    if let Some(r) = region { cmd.arg("--region").arg(r); }
    tracing::info!(stack = stack_name, "deleting stack");
    let st = cmd.status().context("aws cloudformation delete-stack")?;
    if !st.success() { anyhow::bail!("cloudformation delete-stack failed") }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfnResource {
    #[serde(rename="Type")]
    pub type_name: String,
    #[serde(rename="Properties", default, skip_serializing_if="JsonMap::is_empty")]
    pub properties: JsonMap<String, Json>,
    #[serde(rename="DependsOn", default, skip_serializing_if="Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename="DeletionPolicy", default, skip_serializing_if="Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename="UpdateReplacePolicy", default, skip_serializing_if="Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl From<&Resource> for CfnResource {
    fn from(r: &Resource) -> Self {
        let policy = r.deletion_policy.map(|p| match p {
            DeletionPolicy::Delete => "Delete".to_string(),
            DeletionPolicy::Retain => "Retain".to_string(),
            DeletionPolicy::Snapshot => "Snapshot".to_string(),
        });
        CfnResource {
            type_name: r.type_name.clone(),
            properties: r.properties.clone(),
            depends_on: r.depends_on.iter().map(|d| d.0.clone()).collect(),
            deletion_policy: policy.clone(),
            update_replace_policy: policy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfnTemplate {
    #[serde(rename="AWSTemplateFormatVersion")] pub version: Option<String>,
    #[serde(rename="Description")] pub description: Option<String>,
    #[serde(rename="Resources")] pub resources: BTreeMap<String, CfnResource>,
}

impl From<&Assembly> for CfnTemplate {
    fn from(a: &Assembly) -> Self {
        CfnTemplate {
            version: Some("2010-09-09".to_string()),
            description: Some(a.description.clone().unwrap_or_else(|| format!("{} (compliant)", a.stack_name))),
            resources: a.resources.iter().map(|r| (r.id.0.clone(), CfnResource::from(r))).collect(),
        }
    }
}

/// Writes `<out>/<stack>.template.json` and returns its path.
pub fn write_template(out: &Path, assembly: &Assembly) -> Result<PathBuf> {
    std::fs::create_dir_all(out).with_context(|| format!("create {}", out.display()))?;
    let path = out.join(format!("{}.template.json", assembly.stack_name));
    let body = serde_json::to_string_pretty(&CfnTemplate::from(assembly))?;
    let mut f = std::fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
    f.write_all(body.as_bytes())?;
    tracing::info!(path = %path.display(), resources = assembly.resources.len(), "wrote template");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliant_core::ResourceId;
    use serde_json::json;

    fn assembly() -> Assembly {
        let vault = Resource::new(ResourceId::new("Vault"), "AWS::Backup::BackupVault", json!({ "BackupVaultName": "v" }))
            .with_deletion_policy(DeletionPolicy::Retain);
        let plan = Resource::new(ResourceId::new("Plan"), "AWS::Backup::BackupPlan", json!({}))
            .depends_on(&ResourceId::new("Vault"));
        Assembly { stack_name: "demo".into(), description: None, resources: vec![vault, plan] }
    }

    #[test]
    fn template_renders_policies_and_dependencies() {
        let t = serde_json::to_value(CfnTemplate::from(&assembly())).unwrap();
        assert_eq!(t["AWSTemplateFormatVersion"], json!("2010-09-09"));
        assert_eq!(t["Resources"]["Vault"]["DeletionPolicy"], json!("Retain"));
        assert_eq!(t["Resources"]["Vault"]["UpdateReplacePolicy"], json!("Retain"));
        assert_eq!(t["Resources"]["Plan"]["DependsOn"], json!(["Vault"]));
        assert!(t["Resources"]["Plan"].get("Properties").is_none());
    }

    #[test]
    fn template_is_written_under_the_stack_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_template(&dir.path().join("out"), &assembly()).unwrap();
        assert!(path.ends_with("out/demo.template.json"));
        let parsed: Json = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed["Description"], json!("demo (compliant)"));
    }
}
