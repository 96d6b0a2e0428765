use super::{CliLookup, insert_required, parse_words};
use crate::error::Result;
use crate::params::{ParameterDefinition, Patch, Validator, Values};
use crate::runner::Invocation;
use serde_json::{Map, Value};

pub const CREDENTIAL_ENV: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

pub const INSTANCE_TYPES: &[&str] = &[
    "g5.2xlarge",
    "g5.4xlarge",
    "g5.8xlarge",
    "g5.12xlarge",
    "g5.16xlarge",
    "g5.24xlarge",
    "g5.48xlarge",
    "g6e.2xlarge",
    "g6e.4xlarge",
    "g6e.12xlarge",
];

pub(super) fn patches() -> Vec<Patch> {
    vec![
        Patch::InsertAfter(
            "deployment-name",
            ParameterDefinition::text("aws-access-key-id", "AWS access key ID")
                .default_env("AWS_ACCESS_KEY_ID")
                .prompt("AWS access key ID"),
        ),
        Patch::InsertAfter(
            "aws-access-key-id",
            ParameterDefinition::secret("aws-secret-access-key", "AWS secret access key")
                .default_env("AWS_SECRET_ACCESS_KEY")
                .prompt("AWS secret access key"),
        ),
        Patch::Remove("region"),
        Patch::InsertAfter(
            "existing",
            ParameterDefinition::text("region", "AWS region to deploy into")
                .default_value("us-east-1")
                .validator(Validator::live(regions())),
        ),
        Patch::Append(
            ParameterDefinition::text("instance-type", "EC2 instance type")
                .default_value("g5.2xlarge")
                .validator(Validator::one_of(INSTANCE_TYPES)),
        ),
    ]
}

fn regions() -> CliLookup {
    CliLookup {
        prerequisites: &["aws-access-key-id", "aws-secret-access-key"],
        invocation: region_lookup,
        parse: parse_words,
    }
}

fn region_lookup(context: &Values) -> Invocation {
    Invocation::new("aws")
        .args([
            "ec2",
            "describe-regions",
            "--region",
            "us-east-1",
            "--query",
            "Regions[].RegionName",
            "--output",
            "text",
        ])
        .env(
            "AWS_ACCESS_KEY_ID",
            context.text("aws-access-key-id").unwrap_or_default(),
        )
        .env(
            "AWS_SECRET_ACCESS_KEY",
            context.text("aws-secret-access-key").unwrap_or_default(),
        )
}

pub(super) fn variables(values: &Values) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    insert_required(&mut vars, values, "aws_access_key_id", "aws-access-key-id")?;
    insert_required(&mut vars, values, "aws_secret_access_key", "aws-secret-access-key")?;
    insert_required(&mut vars, values, "region", "region")?;
    Ok(vars)
}
