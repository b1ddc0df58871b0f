//! Common test utilities for Warden integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Path to the warden binary
pub fn bin_path() -> PathBuf {
    env!("CARGO_BIN_EXE_warden").into()
}

/// Isolated home directory for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub workspace_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".warden");
        let workspace_dir = data_dir.join("workspace");

        Ok(Self {
            temp_dir,
            data_dir,
            workspace_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Command with HOME pointed at the test environment and no inherited overrides
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(bin_path());
        self.isolate(cmd.env("HOME", self.temp_dir.path()));
        cmd
    }

    /// Same isolation for a plain process, for long-running commands
    pub fn process(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(bin_path());
        cmd.env("HOME", self.temp_dir.path())
            .env_remove("WARDEN_WORKER_ID")
            .env_remove("WARDEN_IDLE_TIMEOUT")
            .env_remove("RUST_LOG");
        cmd
    }

    fn isolate(&self, cmd: &mut Command) {
        cmd.env_remove("WARDEN_WORKER_ID")
            .env_remove("WARDEN_IDLE_TIMEOUT")
            .env_remove("RUST_LOG");
    }

    /// Write a config file with the given JSON body
    pub fn write_config(&self, body: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), body)?;
        Ok(())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
