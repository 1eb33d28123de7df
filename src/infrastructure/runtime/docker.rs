//! Container runtime over the `docker` binary.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::container_runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutcome,
};

/// [`ContainerRuntime`] backed by the docker CLI.
#[derive(Debug, Default, Clone)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[String]) -> DomainResult<std::process::Output> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .map_err(|e| DomainError::Runtime(format!("failed to run docker: {e}")))?;
        Ok(output)
    }

    async fn run_ok(&self, args: &[String]) -> DomainResult<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::Runtime(format!(
                "docker {} failed: {}",
                args.first().map_or("", String::as_str),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> DomainResult<()> {
        self.run_ok(&["version".to_string(), "--format".to_string(), "{{.Server.Version}}".to_string()])
            .await
            .map_err(|e| DomainError::Runtime(format!("docker daemon unreachable: {e}")))?;
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> DomainResult<ContainerHandle> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--cpus".into(),
            spec.cpu_limit.to_string(),
            "--memory".into(),
            format!("{}m", spec.memory_mb),
            "-w".into(),
            "/workspace".into(),
        ];
        for (key, value) in &spec.labels {
            args.push("--label".into());
            args.push(format!("{key}={value}"));
        }
        for mount in &spec.mounts {
            let mode = if mount.read_only { ":ro" } else { "" };
            args.push("-v".into());
            args.push(format!(
                "{}:{}{mode}",
                mount.source.display(),
                mount.target
            ));
        }
        args.push(spec.image.clone());
        // Keep the container alive; agent commands come through exec.
        args.push("sleep".into());
        args.push("infinity".into());

        let stdout = self.run_ok(&args).await?;
        let id = stdout.trim().to_string();
        debug!(container = %id, image = %spec.image, "container created");
        Ok(ContainerHandle { id })
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        cmd: &[String],
        deadline: Duration,
    ) -> DomainResult<ExecOutcome> {
        let mut args: Vec<String> = vec!["exec".into(), handle.id.clone()];
        args.extend(cmd.iter().cloned());
        let output = tokio::time::timeout(deadline, self.run(&args))
            .await
            .map_err(|_| DomainError::Timeout(deadline.as_secs()))??;
        Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn destroy(&self, handle: &ContainerHandle) -> DomainResult<()> {
        self.run_ok(&["rm".to_string(), "-f".to_string(), handle.id.clone()])
            .await?;
        debug!(container = %handle.id, "container destroyed");
        Ok(())
    }

    async fn list_labelled(
        &self,
        label_key: &str,
    ) -> DomainResult<Vec<(ContainerHandle, String)>> {
        let stdout = self
            .run_ok(&[
                "ps".to_string(),
                "-a".to_string(),
                "--filter".to_string(),
                format!("label={label_key}"),
                "--format".to_string(),
                format!("{{{{.ID}}}} {{{{.Label \"{label_key}\"}}}}"),
            ])
            .await?;
        Ok(stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let id = parts.next()?;
                let owner = parts.next().unwrap_or_default();
                Some((
                    ContainerHandle { id: id.to_string() },
                    owner.to_string(),
                ))
            })
            .collect())
    }
}
