//! Running the CLI inside its tool container.
//!
//! terraform, ansible and the cloud CLIs are expected to come from the
//! `simdeploy` image. When started on a bare host, the CLI re-runs itself in
//! that image with the working directory mounted at the same path.

use crate::error::{Error, Result};
use crate::log::*;
use crate::providers::Provider;
use crate::runner::{Exit, Invocation, ProcessRunner, ToolRunner};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

pub const IN_CONTAINER_ENV: &str = "SIMDEPLOY_IN_CONTAINER";
pub const IMAGE_ENV: &str = "SIMDEPLOY_IMAGE";
pub const DEFAULT_IMAGE: &str = "simdeploy:latest";

const DOCKER_MARKER: &str = "/.dockerenv";

pub fn inside_container(env: &dyn Fn(&str) -> Option<String>, marker: &Path) -> bool {
    env(IN_CONTAINER_ENV).is_some_and(|value| !value.is_empty()) || marker.exists()
}

/// Host variables handed to the container when they are set.
pub fn forwarded_env() -> Vec<&'static str> {
    let mut vars = vec![
        "NGC_API_KEY",
        "VNC_PASSWORD",
        "SIMDEPLOY_STATE_DIR",
        "SIMDEPLOY_DATA_DIR",
        "SIMDEPLOY_NON_INTERACTIVE",
    ];
    for provider in Provider::ALL {
        vars.extend(provider.credential_env());
    }
    vars
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sandbox {
    pub image: String,
    pub workdir: PathBuf,
    /// Extra absolute paths mounted at the same location, e.g. a state
    /// directory outside the working directory.
    pub mounts: Vec<PathBuf>,
    pub tty: bool,
}

impl Sandbox {
    pub fn invocation(&self, args: &[String]) -> Invocation {
        let mut invocation = Invocation::new("docker").args(["run", "--rm", "-i"]);
        if self.tty {
            invocation = invocation.arg("-t");
        }

        let mut mounted: Vec<&Path> = vec![self.workdir.as_path()];
        invocation = invocation.arg("-v").arg(bind(&self.workdir));
        for mount in &self.mounts {
            if mounted.iter().any(|m| mount.starts_with(m)) {
                continue;
            }
            mounted.push(mount);
            invocation = invocation.arg("-v").arg(bind(mount));
        }

        invocation = invocation
            .arg("-w")
            .arg(self.workdir.display().to_string())
            .arg("-e")
            .arg(format!("{IN_CONTAINER_ENV}=1"));
        for var in forwarded_env() {
            invocation = invocation.arg("-e").arg(var);
        }

        invocation.arg(&self.image).arg("simdeploy").args(args)
    }
}

fn bind(path: &Path) -> String {
    format!("{}:{}", path.display(), path.display())
}

/// Re-runs the current command inside the tool container unless already
/// inside one. Returns the container's exit code, or `None` to continue here.
pub fn enter(mounts: &[PathBuf]) -> Result<Option<i32>> {
    let env = |var: &str| std::env::var(var).ok();
    if inside_container(&env, Path::new(DOCKER_MARKER)) {
        return Ok(None);
    }

    let workdir = std::env::current_dir()
        .map_err(|e| Error::Configuration(format!("Failed to read working directory: {e}")))?;
    let mounts = mounts
        .iter()
        .filter(|path| path.exists())
        .map(std::path::absolute)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::Configuration(format!("Failed to resolve mount path: {e}")))?;
    let sandbox = Sandbox {
        image: env(IMAGE_ENV)
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
        workdir,
        mounts,
        tty: std::io::stdin().is_terminal(),
    };

    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    log_debug(&format!("Re-running inside container image '{}'.", sandbox.image));

    let output = ProcessRunner.run(&sandbox.invocation(&args))?;
    Ok(Some(match output.exit {
        Exit::Code(code) => code,
        Exit::Killed | Exit::TimedOut => 1,
    }))
}
