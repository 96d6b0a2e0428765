use crate::common::Workspace;
use predicates::str::contains;

#[test]
fn test_destroy_requires_confirmation() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();

    workspace
        .command()
        .args(["destroy", "demo"])
        .assert()
        .failure()
        .stdout(contains("Pass '--yes'"));
    assert_eq!(workspace.count("terraform destroy"), 0);
    assert!(workspace.deployment_file("demo", "state.json").exists());
}

#[test]
fn test_destroy_tears_down_and_forgets() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();

    workspace
        .command()
        .args(["destroy", "demo", "--yes"])
        .assert()
        .success()
        .stdout(contains("Destroyed deployment 'demo'."));

    assert_eq!(workspace.count("terraform destroy"), 1);
    assert!(!workspace.state_dir.join("demo").exists());

    workspace
        .command()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("No deployments found"));
}

#[test]
fn test_destroy_unknown_deployment() {
    Workspace::new()
        .command()
        .args(["destroy", "ghost", "--yes"])
        .assert()
        .failure()
        .stdout(contains("Deployment 'ghost' not found."));
}
