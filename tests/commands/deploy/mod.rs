use crate::common::{PUBLIC_IP, Workspace};
use predicates::str::contains;
use std::fs;

fn position(calls: &[String], pattern: &str) -> usize {
    calls
        .iter()
        .position(|call| call.contains(pattern))
        .unwrap_or_else(|| panic!("'{pattern}' was never run"))
}

#[test]
fn test_deploy_aws_provisions_and_records_state() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&[])
        .assert()
        .success()
        .stdout(contains("Deployed 'demo'"))
        .stdout(contains(format!("ubuntu@{PUBLIC_IP}")));

    let calls = workspace.calls();
    assert!(position(&calls, "aws ec2 describe-regions") < position(&calls, "docker login"));
    assert!(position(&calls, "docker login nvcr.io") < position(&calls, "terraform init"));
    assert!(position(&calls, "terraform apply") < position(&calls, "terraform output"));
    assert!(position(&calls, "--tags initial") < position(&calls, "--tags autorun"));

    let state = workspace.state("demo");
    assert_eq!(state["lifecycle"], "provisioned");
    assert_eq!(state["last_completed"], "summary");
    assert_eq!(state["provider"], "aws");
    assert_eq!(state["outputs"]["public_ip"], PUBLIC_IP);

    let tfvars = fs::read_to_string(workspace.deployment_file("demo", "terraform.tfvars.json"))
        .unwrap();
    assert!(tfvars.contains("\"region\": \"us-east-1\""));
    assert!(tfvars.contains("\"instance_type\": \"g5.2xlarge\""));
    assert!(workspace.deployment_file("demo", "key.pem").exists());
    assert!(workspace.deployment_file("demo", "connection.txt").exists());
}

#[test]
fn test_deploy_uploads_user_data() {
    let workspace = Workspace::new();
    let uploads = workspace.temp_dir.path().join("uploads");
    fs::create_dir_all(&uploads).unwrap();
    fs::write(uploads.join("scene.usd"), "#usda 1.0\n").unwrap();

    workspace.deploy_aws(&[]).assert().success();

    let calls = workspace.calls();
    let upload = &calls[position(&calls, "scp -r")];
    assert!(upload.ends_with(&format!("ubuntu@{PUBLIC_IP}:~/uploads")));
    assert!(position(&calls, "--tags initial") < position(&calls, "scp -r"));
    assert!(position(&calls, "scp -r") < position(&calls, "--tags autorun"));
}

#[test]
fn test_no_upload_flag_skips_upload() {
    let workspace = Workspace::new();
    fs::create_dir_all(workspace.temp_dir.path().join("uploads")).unwrap();
    workspace.deploy_aws(&["--no-upload"]).assert().success();
    assert_eq!(workspace.count("scp"), 0);
}

#[test]
fn test_existing_deployment_fails_without_policy() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();
    let calls_before = workspace.calls().len();

    workspace
        .deploy_aws(&[])
        .assert()
        .failure()
        .stdout(contains("Deployment 'demo' already exists"))
        .stdout(contains("run-config-management-only"));

    // Only the region lookup ran; nothing touched the deployment.
    let calls = workspace.calls();
    assert!(calls[calls_before..].iter().all(|call| call.starts_with("aws ")));
    assert_eq!(workspace.state("demo")["lifecycle"], "provisioned");
}

#[test]
fn test_run_config_management_only() {
    let workspace = Workspace::new();
    workspace.deploy_aws(&[]).assert().success();
    let calls_before = workspace.calls().len();

    workspace
        .deploy_aws(&["--existing", "run-config-management-only"])
        .assert()
        .success();

    let calls = workspace.calls()[calls_before..].to_vec();
    assert!(!calls.iter().any(|call| call.starts_with("terraform")));
    assert_eq!(calls.iter().filter(|c| c.contains("--tags initial")).count(), 1);
    assert_eq!(calls.iter().filter(|c| c.contains("--tags autorun")).count(), 1);
}

#[test]
fn test_missing_required_parameter() {
    let workspace = Workspace::new();
    workspace
        .command()
        .args([
            "deploy-aws",
            "--deployment-name",
            "demo",
            "--aws-access-key-id",
            "AKIDEXAMPLE",
            "--aws-secret-access-key",
            "secret-example",
            "--ngc-api-key",
            "ngc-example",
        ])
        .assert()
        .failure()
        .stdout(contains("Missing required parameter '--vnc-password'."));
    assert!(!workspace.state_dir.join("demo").exists());
}

#[test]
fn test_credentials_from_environment() {
    let workspace = Workspace::new();
    workspace
        .command()
        .env("AWS_ACCESS_KEY_ID", "AKIDFROMENV")
        .env("AWS_SECRET_ACCESS_KEY", "secret-from-env")
        .env("NGC_API_KEY", "ngc-from-env")
        .env("VNC_PASSWORD", "vnc-from-env")
        .args(["deploy-aws", "--deployment-name", "demo"])
        .assert()
        .success();

    let tfvars = fs::read_to_string(workspace.deployment_file("demo", "terraform.tfvars.json"))
        .unwrap();
    assert!(tfvars.contains("AKIDFROMENV"));
}

#[test]
fn test_command_line_beats_environment() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&[])
        .env("AWS_ACCESS_KEY_ID", "AKIDFROMENV")
        .assert()
        .success();

    let tfvars = fs::read_to_string(workspace.deployment_file("demo", "terraform.tfvars.json"))
        .unwrap();
    assert!(tfvars.contains("AKIDEXAMPLE"));
    assert!(!tfvars.contains("AKIDFROMENV"));
}

#[test]
fn test_region_outside_live_domain() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&["--region", "mars-north-1"])
        .assert()
        .failure()
        .stdout(contains("Invalid value 'mars-north-1' for '--region'"))
        .stdout(contains("us-west-2"));
    assert_eq!(workspace.count("terraform"), 0);
}

#[test]
fn test_mixed_case_region_is_normalized() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&["--region", "US-West-2"])
        .assert()
        .success();
    assert_eq!(workspace.count("aws ec2 describe-regions"), 1);

    let tfvars = fs::read_to_string(workspace.deployment_file("demo", "terraform.tfvars.json"))
        .unwrap();
    assert!(tfvars.contains("\"region\": \"us-west-2\""));
}

#[test]
fn test_invalid_existing_policy() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&["--existing", "sometimes"])
        .assert()
        .failure()
        .stdout(contains("Invalid value 'sometimes' for '--existing'"))
        .stdout(contains("destroy-and-recreate"));
}

#[test]
fn test_rejected_registry_key_stops_before_infra() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&["--ngc-api-key", "rejected-key"])
        .assert()
        .failure()
        .stdout(contains("Registry credential rejected"));
    assert_eq!(workspace.count("terraform"), 0);
    assert!(!workspace.deployment_file("demo", "state.json").exists());
}

#[test]
fn test_registry_check_can_be_disabled() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&["--ngc-api-key", "rejected-key", "--no-ngc-api-key-check"])
        .assert()
        .success();
    assert_eq!(workspace.count("docker login"), 0);
}

#[test]
fn test_kit_deploys_without_registry_key() {
    let workspace = Workspace::new();
    workspace
        .command()
        .args([
            "deploy-aws",
            "--deployment-name",
            "demo",
            "--aws-access-key-id",
            "AKIDEXAMPLE",
            "--aws-secret-access-key",
            "secret-example",
            "--vnc-password",
            "vnc-example",
            "--application",
            "kit",
        ])
        .assert()
        .success()
        .stdout(contains("Deployed 'demo'"));
    assert_eq!(workspace.count("docker login"), 0);
    assert_eq!(workspace.state("demo")["application"], "kit");
}

#[test]
fn test_gated_application_requires_registry_key() {
    let workspace = Workspace::new();
    workspace
        .command()
        .args([
            "deploy-aws",
            "--deployment-name",
            "demo",
            "--aws-access-key-id",
            "AKIDEXAMPLE",
            "--aws-secret-access-key",
            "secret-example",
            "--vnc-password",
            "vnc-example",
        ])
        .assert()
        .failure()
        .stdout(contains("Missing required parameter '--ngc-api-key'."));
    assert_eq!(workspace.count("terraform"), 0);
}

#[test]
fn test_playbook_failure_names_step() {
    let workspace = Workspace::new();
    workspace
        .deploy_aws(&[])
        .env("FAKE_ANSIBLE_EXIT", "2")
        .assert()
        .failure()
        .stdout(contains("Configuring host failed."))
        .stdout(contains("Configuration management failed"));

    let state = workspace.state("demo");
    assert_eq!(state["last_completed"], "key-export");
    assert_eq!(state["lifecycle"], "provisioned");
}
