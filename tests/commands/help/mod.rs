use crate::common::Workspace;
use predicates::prelude::*;
use predicates::str::contains;

#[test]
fn test_help_lists_commands() {
    Workspace::new()
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("deploy-aws"))
        .stdout(contains("deploy-gcp"))
        .stdout(contains("deploy-azure"))
        .stdout(contains("deploy-alicloud"))
        .stdout(contains("connect"))
        .stdout(contains("destroy"))
        .stdout(contains("list"));
}

#[test]
fn test_gcp_help_shows_zone_instead_of_region() {
    Workspace::new()
        .command()
        .args(["deploy-gcp", "--help"])
        .assert()
        .success()
        .stdout(contains("--gcp-project"))
        .stdout(contains("--zone"))
        .stdout(contains("us-central1-a"))
        .stdout(contains("--region").not());
}

#[test]
fn test_help_hides_secret_defaults() {
    Workspace::new()
        .command()
        .env("AWS_SECRET_ACCESS_KEY", "leaked-secret")
        .args(["deploy-aws", "--help"])
        .assert()
        .success()
        .stdout(contains("$AWS_SECRET_ACCESS_KEY"))
        .stdout(contains("leaked-secret").not())
        .stdout(contains("--no-upload"))
        .stdout(contains("g6e.12xlarge"));
}

#[test]
fn test_alicloud_has_no_registry_check() {
    Workspace::new()
        .command()
        .args(["deploy-alicloud", "--help"])
        .assert()
        .success()
        .stdout(contains("--aliyun-access-key"))
        .stdout(contains("--ngc-api-key-check").not());
}
