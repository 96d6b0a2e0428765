use crate::common::{PUBLIC_IP, Workspace};
use predicates::str::contains;

#[test]
fn test_list_empty() {
    Workspace::new()
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("No deployments found"));
}

#[test]
fn test_list_shows_deployments() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();

    workspace
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("demo"))
        .stdout(contains("provisioned"))
        .stdout(contains(PUBLIC_IP));
}
