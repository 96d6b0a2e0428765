use super::{CliLookup, insert_required};
use crate::error::Result;
use crate::params::{ParameterDefinition, Patch, Validator, Values};
use crate::runner::Invocation;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const CREDENTIAL_ENV: &[&str] = &["ALICLOUD_ACCESS_KEY", "ALICLOUD_SECRET_KEY"];

pub const INSTANCE_TYPES: &[&str] = &[
    "ecs.gn7i-c8g1.2xlarge",
    "ecs.gn7i-c16g1.4xlarge",
    "ecs.gn7i-c32g1.8xlarge",
    "ecs.gn7i-c48g1.12xlarge",
];

pub(super) fn patches() -> Vec<Patch> {
    vec![
        Patch::InsertAfter(
            "deployment-name",
            ParameterDefinition::text("aliyun-access-key", "Alibaba Cloud access key ID")
                .default_env("ALICLOUD_ACCESS_KEY")
                .prompt("Alibaba Cloud access key ID"),
        ),
        Patch::InsertAfter(
            "aliyun-access-key",
            ParameterDefinition::secret("aliyun-secret-key", "Alibaba Cloud access key secret")
                .default_env("ALICLOUD_SECRET_KEY")
                .prompt("Alibaba Cloud access key secret"),
        ),
        Patch::Remove("region"),
        Patch::InsertAfter(
            "existing",
            ParameterDefinition::text("region", "Alibaba Cloud region to deploy into")
                .default_value("us-east-1")
                .validator(Validator::live(regions())),
        ),
        // nvcr.io is not reliably reachable from every Alibaba Cloud region.
        Patch::Remove("ngc-api-key-check"),
        Patch::Append(
            ParameterDefinition::text("instance-type", "ECS instance type")
                .default_value("ecs.gn7i-c16g1.4xlarge")
                .validator(Validator::one_of(INSTANCE_TYPES)),
        ),
    ]
}

fn regions() -> CliLookup {
    CliLookup {
        prerequisites: &["aliyun-access-key", "aliyun-secret-key"],
        invocation: region_lookup,
        parse: parse_regions,
    }
}

fn region_lookup(context: &Values) -> Invocation {
    Invocation::new("aliyun")
        .args(["ecs", "DescribeRegions", "--region", "cn-hangzhou"])
        .env(
            "ALIBABA_CLOUD_ACCESS_KEY_ID",
            context.text("aliyun-access-key").unwrap_or_default(),
        )
        .env(
            "ALIBABA_CLOUD_ACCESS_KEY_SECRET",
            context.text("aliyun-secret-key").unwrap_or_default(),
        )
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeRegions {
    regions: RegionList,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionList {
    region: Vec<Region>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Region {
    region_id: String,
}

fn parse_regions(stdout: &str) -> std::result::Result<Vec<String>, String> {
    let response: DescribeRegions = serde_json::from_str(stdout)
        .map_err(|e| format!("Failed to parse DescribeRegions output: {e}"))?;
    Ok(response
        .regions
        .region
        .into_iter()
        .map(|r| r.region_id)
        .collect())
}

pub(super) fn variables(values: &Values) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    insert_required(&mut vars, values, "access_key", "aliyun-access-key")?;
    insert_required(&mut vars, values, "secret_key", "aliyun-secret-key")?;
    insert_required(&mut vars, values, "region", "region")?;
    Ok(vars)
}
