use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::format::FmtSpan;

use compliant_cfn as cfn;
use compliant_policy::{catalogue, ApiGatewayRule, DynamoDbRule, LambdaRule, Rule, S3Rule};

mod config;

use config::StackFile;

#[derive(Parser, Debug)]
#[command(author, version, about="compliant: synthesize AWS stacks that pass AWS Config rules by default")]
struct Cli {
    /// Stack file (YAML or .yml.age)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value="out", global = true)]
    out: PathBuf,

    /// AGE identity files, for .age stack files
    #[arg(long="age-identity", global = true)]
    age_ids: Vec<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum Kind { Apigateway, Dynamodb, Lambda, S3 }

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Build, validate and write the CloudFormation template
    Synth,
    /// Print the validation report as JSON
    Validate,
    /// List rule tokens and the AWS Config rules they map to
    Rules {
        #[arg(long, value_enum)] kind: Option<Kind>,
    },
    Deploy {
        #[arg(long)] stack: Option<String>,
    },
    Destroy {
        #[arg(long)] stack: Option<String>,
    },
}

fn load(file: Option<&Path>, age_ids: &[PathBuf]) -> Result<StackFile> {
    let file = file.context("no stack file given; pass --file")?;
    let body = compliant_crypto::read_maybe_encrypted(file, age_ids)?;
    serde_yaml::from_slice(body.expose_secret()).with_context(|| format!("parse {}", file.display()))
}

fn print_rules<R: Rule>() {
    for (id, config) in catalogue::<R>() {
        println!("{}\t{id}\t{config}", R::KIND);
    }
}

fn synth(cfg: StackFile, out: &Path) -> Result<PathBuf> {
    let stack = cfg.build()?;
    let assembly = stack.synth()?;
    cfn::write_template(out, &assembly)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().json().with_writer(std::io::stderr).with_span_events(FmtSpan::CLOSE).init();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Rules { kind } => {
            let all = kind.is_none();
            if all || kind == Some(Kind::Apigateway) { print_rules::<ApiGatewayRule>(); }
            if all || kind == Some(Kind::Dynamodb) { print_rules::<DynamoDbRule>(); }
            if all || kind == Some(Kind::Lambda) { print_rules::<LambdaRule>(); }
            if all || kind == Some(Kind::S3) { print_rules::<S3Rule>(); }
        }
        Cmd::Synth => {
            let cfg = load(cli.file.as_deref(), &cli.age_ids)?;
            let path = synth(cfg, &cli.out)?;
            println!("{}", path.display());
        }
        Cmd::Validate => {
            let cfg = load(cli.file.as_deref(), &cli.age_ids)?;
            let report = cfg.build()?.validate()?;
            tracing::info!(compliant = report.is_compliant(), diagnostics = report.diagnostics.len(), "validated stack");
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_compliant() {
                anyhow::bail!("stack is not compliant: {} diagnostic(s)", report.diagnostics.len());
            }
        }
        Cmd::Deploy { stack } => {
            let cfg = load(cli.file.as_deref(), &cli.age_ids)?;
            let stack_name = stack.unwrap_or_else(|| cfg.stack_name().to_string());
            let region = cfg.region().map(str::to_string);
            let path = synth(cfg, &cli.out)?;
            cfn::deploy_stack(&stack_name, &path, region.as_deref())?
        }
        Cmd::Destroy { stack } => {
            let cfg = load(cli.file.as_deref(), &cli.age_ids)?;
            let stack_name = stack.unwrap_or_else(|| cfg.stack_name().to_string());
            cfn::delete_stack(&stack_name, cfg.region())?
        }
    }
    Ok(())
}
