//! Sandbox Command Builder (C2): produces the exact invocation that launches
//! a single-use, network-isolated, resource-capped sandbox for one job.

use std::path::Path;

use olympus_common::CodeLanguage;

use crate::config::SandboxConfig;
use crate::job::TestCase;

/// 1.5 MiB, the sandbox's file-size ulimit (spec §4.2).
const FSIZE_LIMIT_BYTES: u64 = 1_572_864;
const PIDS_LIMIT: u32 = 50;
const OPEN_FILES_LIMIT: u32 = 32;

/// The program and argv the supervisor should spawn.
#[derive(Debug, Clone)]
pub struct SandboxInvocation {
    pub program: String,
    pub args: Vec<String>,
}

/// Parameters specific to one job, as opposed to the deployment-wide
/// [`SandboxConfig`].
pub struct SandboxRequest<'a> {
    pub scratch_dir: &'a Path,
    pub code_file_path: &'a Path,
    pub language: CodeLanguage,
    pub test_cases: &'a [TestCase],
    pub time_limit_sec: f64,
    pub memory_limit_mb: i64,
}

/// Builds the `docker run` argv implementing spec §4.2's isolation
/// requirements, plus the runner's own positional arguments.
pub fn build_invocation(
    config: &SandboxConfig,
    request: &SandboxRequest<'_>,
) -> anyhow::Result<SandboxInvocation> {
    let test_cases_json = serde_json::to_string(request.test_cases)?;
    let runner_script = config
        .runners_dir
        .join(request.language.to_string())
        .join("run.sh");

    let mut args: Vec<String> = Vec::new();
    args.push("run".to_string());
    args.push("--rm".to_string());
    args.push("--network".to_string());
    args.push("none".to_string());

    args.push("--mount".to_string());
    args.push(format!(
        "type=bind,src={},dst=/tmp",
        request.scratch_dir.display()
    ));
    args.push("--mount".to_string());
    args.push(format!(
        "type=bind,src={},dst=/{},readonly",
        request.code_file_path.display(),
        request.language.source_filename()
    ));
    args.push("--mount".to_string());
    args.push(format!(
        "type=bind,src={},dst=/tmp/run.sh,readonly",
        runner_script.display()
    ));

    args.push("--read-only".to_string());
    args.push(format!("--memory={}m", request.memory_limit_mb));
    args.push(format!("--memory-swap={}m", request.memory_limit_mb));
    args.push(format!("--cpus={}", config.cpu_fraction));
    args.push(format!("--pids-limit={PIDS_LIMIT}"));
    args.push(format!("--ulimit=nofile={OPEN_FILES_LIMIT}"));
    args.push(format!("--ulimit=fsize={FSIZE_LIMIT_BYTES}"));

    args.push("--cap-drop".to_string());
    args.push("ALL".to_string());
    args.push("--security-opt".to_string());
    args.push("no-new-privileges".to_string());
    args.push("--security-opt".to_string());
    args.push(format!("seccomp={}", config.seccomp_profile.display()));
    args.push("--init".to_string());

    args.push(config.image.clone());

    args.push("/tmp/run.sh".to_string());
    args.push(test_cases_json);
    args.push(request.time_limit_sec.to_string());
    args.push(request.memory_limit_mb.to_string());

    Ok(SandboxInvocation {
        program: "docker".to_string(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> SandboxConfig {
        SandboxConfig {
            runners_dir: PathBuf::from("/opt/minos/runners"),
            seccomp_profile: PathBuf::from("/etc/minos/seccomp.json"),
            cpu_fraction: 0.5,
            image: "olympus/minos-sandbox:latest".to_string(),
        }
    }

    #[test]
    fn builds_network_isolated_read_only_container() {
        let scratch = PathBuf::from("/var/minos/scratch/job-1");
        let code = PathBuf::from("/var/minos/scratch/job-1/main.py");
        let request = SandboxRequest {
            scratch_dir: &scratch,
            code_file_path: &code,
            language: CodeLanguage::Python3,
            test_cases: &[],
            time_limit_sec: 2.0,
            memory_limit_mb: 256,
        };
        let invocation = build_invocation(&config(), &request).unwrap();

        assert_eq!(invocation.program, "docker");
        assert!(invocation.args.contains(&"--read-only".to_string()));
        assert!(invocation.args.contains(&"none".to_string()));
        assert!(invocation.args.contains(&"--memory=256m".to_string()));
        assert!(invocation.args.contains(&"--memory-swap=256m".to_string()));
        assert!(invocation.args.contains(&"--pids-limit=50".to_string()));
        assert!(invocation
            .args
            .iter()
            .any(|a| a.contains("dst=/main.py,readonly")));
        assert!(invocation
            .args
            .iter()
            .any(|a| a.contains("dst=/tmp/run.sh,readonly")));

        let runner_args: Vec<&String> = invocation.args.iter().rev().take(4).collect();
        assert_eq!(runner_args[3], "/tmp/run.sh");
    }

    #[test]
    fn source_mount_name_is_language_specific() {
        let scratch = PathBuf::from("/scratch");
        let code = PathBuf::from("/scratch/Main.java");
        let request = SandboxRequest {
            scratch_dir: &scratch,
            code_file_path: &code,
            language: CodeLanguage::Java17,
            test_cases: &[],
            time_limit_sec: 2.0,
            memory_limit_mb: 256,
        };
        let invocation = build_invocation(&config(), &request).unwrap();
        assert!(invocation
            .args
            .iter()
            .any(|a| a.contains("dst=/Main.java,readonly")));
    }
}
