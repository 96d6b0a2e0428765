use super::{CliLookup, insert_required, parse_words};
use crate::error::Result;
use crate::params::{ParameterDefinition, Patch, Validator, Values};
use crate::runner::Invocation;
use serde_json::{Map, Value};

pub const CREDENTIAL_ENV: &[&str] = &[
    "ARM_SUBSCRIPTION_ID",
    "ARM_TENANT_ID",
    "ARM_CLIENT_ID",
    "ARM_CLIENT_SECRET",
];

pub const INSTANCE_TYPES: &[&str] = &[
    "Standard_NV36ads_A10_v5",
    "Standard_NV72ads_A10_v5",
    "Standard_NC8as_T4_v3",
    "Standard_NC16as_T4_v3",
];

pub(super) fn patches() -> Vec<Patch> {
    vec![
        // Optional: `az login` may already have selected a subscription.
        Patch::InsertAfter(
            "deployment-name",
            ParameterDefinition::text("azure-subscription-id", "Azure subscription ID")
                .default_env("ARM_SUBSCRIPTION_ID"),
        ),
        Patch::Remove("region"),
        Patch::InsertAfter(
            "existing",
            ParameterDefinition::text("region", "Azure location to deploy into")
                .default_value("westus3")
                .validator(Validator::live(locations())),
        ),
        Patch::InsertAfter(
            "region",
            ParameterDefinition::text(
                "resource-group",
                "Existing resource group to deploy into, created per deployment if omitted",
            ),
        ),
        Patch::Append(
            ParameterDefinition::text("instance-type", "Azure VM size")
                .default_value("Standard_NV36ads_A10_v5")
                .validator(Validator::one_of(INSTANCE_TYPES)),
        ),
    ]
}

fn locations() -> CliLookup {
    CliLookup {
        prerequisites: &["azure-subscription-id"],
        invocation: location_lookup,
        parse: parse_words,
    }
}

fn location_lookup(context: &Values) -> Invocation {
    Invocation::new("az").args([
        "account",
        "list-locations",
        "--subscription",
        context.text("azure-subscription-id").unwrap_or_default(),
        "--query",
        "[].name",
        "--output",
        "tsv",
    ])
}

pub(super) fn variables(values: &Values) -> Result<Map<String, Value>> {
    let mut vars = Map::new();
    insert_required(&mut vars, values, "region", "region")?;
    if let Some(subscription) = values.text("azure-subscription-id") {
        vars.insert("subscription_id".to_string(), Value::from(subscription));
    }
    if let Some(group) = values.text("resource-group") {
        vars.insert("resource_group".to_string(), Value::from(group));
    }
    Ok(vars)
}
