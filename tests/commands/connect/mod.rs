use crate::common::{PUBLIC_IP, Workspace};
use predicates::str::contains;

#[test]
fn test_connect_unknown_deployment() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();

    workspace
        .command()
        .args(["connect", "other"])
        .assert()
        .failure()
        .stdout(contains("Deployment 'other' not found. Known deployments: demo"));
    assert_eq!(workspace.count("ssh "), 0);
}

#[test]
fn test_connect_opens_ssh() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();

    workspace.command().args(["connect", "demo"]).assert().success();

    let key = workspace.deployment_file("demo", "key.pem");
    let calls = workspace.calls();
    let ssh = calls.iter().find(|call| call.starts_with("ssh ")).unwrap();
    assert!(ssh.contains(&format!("-i {}", key.display())));
    assert!(ssh.ends_with(&format!("ubuntu@{PUBLIC_IP}")));
}

#[test]
fn test_connect_to_application_container() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();

    workspace
        .command()
        .args(["connect", "demo", "--app"])
        .assert()
        .success();

    let calls = workspace.calls();
    let ssh = calls.iter().find(|call| call.starts_with("ssh ")).unwrap();
    assert!(ssh.ends_with(&format!("-t ubuntu@{PUBLIC_IP} docker exec -it isaac-sim bash")));
}
