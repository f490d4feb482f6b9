//! Container runtime backed by the `docker` CLI.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;

use uuid::Uuid;

use super::{ContainerError, ContainerRuntime, PullFailure, RunSpec};

/// Drives the `docker` CLI.
pub struct Docker {
    program: String,
}

impl Default for Docker {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl Docker {
    /// A runtime invoking `program` (e.g. `docker` or `podman`).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the CLI with the given args and return stdout.
    fn output(&self, args: &[String]) -> Result<String, ContainerError> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| self.spawn_error(source))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ContainerError::Command {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn spawn_error(&self, source: std::io::Error) -> ContainerError {
        ContainerError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl ContainerRuntime for Docker {
    fn image_present(&self, image: &str) -> Result<bool, ContainerError> {
        let listing = self.output(&[
            "image".into(),
            "ls".into(),
            "--format".into(),
            "{{.Repository}}:{{.Tag}}".into(),
        ])?;
        Ok(listing.lines().any(|tag| tag.trim().ends_with(image)))
    }

    fn pull(&self, image: &str) -> Result<String, PullFailure> {
        let mut child = Command::new(&self.program)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PullFailure {
                log: String::new(),
                error: self.spawn_error(source),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut log = String::new();

        // stdout is consumed here, line by line, feeding both the log text and
        // tracing. stderr is drained alongside so neither pipe can fill up.
        let stderr_text = thread::scope(|s| {
            let drain = s.spawn(move || {
                let mut text = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut text);
                }
                text
            });

            if let Some(stdout) = stdout {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(line) => {
                            tracing::debug!(image, "{line}");
                            log.push_str(&line);
                            log.push('\n');
                        }
                        Err(e) => {
                            tracing::warn!(image, "stopped reading pull output: {e}");
                            break;
                        }
                    }
                }
            }

            drain.join().unwrap_or_default()
        });

        for line in stderr_text.lines() {
            tracing::debug!(image, "{line}");
            log.push_str(line);
            log.push('\n');
        }

        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => {
                return Err(PullFailure {
                    log,
                    error: e.into(),
                });
            }
        };

        if status.success() {
            Ok(log)
        } else {
            Err(PullFailure {
                log,
                error: ContainerError::Command {
                    command: format!("{} pull {image}", self.program),
                    status: status.to_string(),
                    stderr: stderr_text.trim().to_string(),
                },
            })
        }
    }

    fn run(&self, spec: &RunSpec) -> Result<(), ContainerError> {
        let name = format!("harbor-{}", Uuid::new_v4().simple());
        self.output(&create_args(&name, spec))?;
        let _removal = Removal {
            docker: self,
            name: &name,
        };

        tracing::debug!(container = %name, image = %spec.image, "starting container");
        let status = Command::new(&self.program)
            .args(["start", "--attach", &name])
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| self.spawn_error(source))?;

        if status.success() {
            Ok(())
        } else {
            Err(ContainerError::RunFailed {
                code: status.code(),
            })
        }
    }
}

/// Arguments for `docker create`.
fn create_args(name: &str, spec: &RunSpec) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--name".to_string(), name.to_string()];

    if !spec.work_dir.is_empty() {
        args.extend(["--workdir".to_string(), spec.work_dir.clone()]);
    }
    for (container_path, host_path) in &spec.mounts {
        args.extend([
            "--volume".to_string(),
            format!("{}:{container_path}", host_path.display()),
        ]);
    }
    for (key, value) in &spec.env {
        args.extend(["--env".to_string(), format!("{key}={value}")]);
    }
    if !spec.command.is_empty() {
        args.extend(["--entrypoint".to_string(), spec.command.clone()]);
    }

    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

/// Removes the named container when dropped, whatever path the run took.
struct Removal<'a> {
    docker: &'a Docker,
    name: &'a str,
}

impl Drop for Removal<'_> {
    fn drop(&mut self) {
        let args = ["rm".to_string(), "--force".to_string(), self.name.to_string()];
        if let Err(e) = self.docker.output(&args) {
            tracing::warn!(container = self.name, "failed to remove container: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn create_args_order() {
        let spec = RunSpec {
            image: "docker.io/hashicorp/terraform:0.12.28".into(),
            command: "terraform".into(),
            args: vec!["plan".into(), "-out=plan".into()],
            work_dir: "/work".into(),
            mounts: BTreeMap::from([("/work".to_string(), PathBuf::from("/host/work"))]),
            env: BTreeMap::from([("TF_IN_AUTOMATION".to_string(), "1".to_string())]),
        };

        let args = create_args("harbor-x", &spec);

        assert_eq!(
            args,
            vec![
                "create",
                "--name",
                "harbor-x",
                "--workdir",
                "/work",
                "--volume",
                "/host/work:/work",
                "--env",
                "TF_IN_AUTOMATION=1",
                "--entrypoint",
                "terraform",
                "docker.io/hashicorp/terraform:0.12.28",
                "plan",
                "-out=plan",
            ]
        );
    }

    #[test]
    fn create_args_without_command_keeps_entrypoint() {
        let spec = RunSpec {
            image: "alpine:3".into(),
            args: vec!["true".into()],
            ..RunSpec::default()
        };

        let args = create_args("harbor-y", &spec);

        assert!(!args.contains(&"--entrypoint".to_string()));
        assert!(!args.contains(&"--workdir".to_string()));
        assert_eq!(args[args.len() - 2..], ["alpine:3", "true"]);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let docker = Docker::new("harbor-no-such-container-cli");

        let err = docker.image_present("alpine").unwrap_err();
        assert!(matches!(err, ContainerError::Spawn { .. }));

        let failure = docker.pull("alpine").unwrap_err();
        assert!(failure.log.is_empty());
        assert!(matches!(failure.error, ContainerError::Spawn { .. }));
    }
}
