use super::{CliLookup, insert_required, parse_words};
use crate::error::Result;
use crate::params::{ParameterDefinition, Patch, Validator, Values};
use crate::runner::Invocation;
use serde_json::{Map, Value};

pub const CREDENTIAL_ENV: &[&str] = &["GOOGLE_CLOUD_PROJECT", "GOOGLE_APPLICATION_CREDENTIALS"];

pub const INSTANCE_TYPES: &[&str] = &[
    "g2-standard-8",
    "g2-standard-16",
    "g2-standard-32",
    "g2-standard-48",
    "g2-standard-96",
];

// GCP places machines by zone, so the base region option is swapped for one.
pub(super) fn patches() -> Vec<Patch> {
    vec![
        Patch::InsertAfter(
            "deployment-name",
            ParameterDefinition::text("gcp-project", "GCP project ID")
                .default_env("GOOGLE_CLOUD_PROJECT")
                .prompt("GCP project ID"),
        ),
        Patch::Remove("region"),
        Patch::InsertAfter(
            "gcp-project",
            ParameterDefinition::text("zone", "GCP zone to deploy into")
                .default_value("us-central1-a")
                .validator(Validator::live(zones())),
        ),
        Patch::Append(
            ParameterDefinition::text("instance-type", "GCP machine type")
                .default_value("g2-standard-8")
                .validator(Validator::one_of(INSTANCE_TYPES)),
        ),
    ]
}

fn zones() -> CliLookup {
    CliLookup {
        prerequisites: &["gcp-project"],
        invocation: zone_lookup,
        parse: parse_words,
    }
}

fn zone_lookup(context: &Values) -> Invocation {
    Invocation::new("gcloud").args([
        "compute".to_string(),
        "zones".to_string(),
        "list".to_string(),
        format!("--project={}", context.text("gcp-project").unwrap_or_default()),
        "--format=value(name)".to_string(),
    ])
}

pub(super) fn variables(values: &Values) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    insert_required(&mut vars, values, "project", "gcp-project")?;
    insert_required(&mut vars, values, "zone", "zone")?;
    Ok(vars)
}
