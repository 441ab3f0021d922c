//! Remote filesystem mirroring over SSH.
//!
//! One-way mirror with delete-extraneous semantics: files present locally
//! but gone on the remote are removed. A cheap connectivity probe (open a
//! session, run `true`) runs before the bulk transfer so authentication and
//! network problems surface as such instead of as an opaque transfer error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::deadline::Deadline;
use crate::error::{classify_command_error, Result, SyncError};
use crate::exec::{Command, CommandRunner};
use crate::fsutil::ensure_dir;
use crate::mask::mask_credentials;
use crate::request::{path_with_trailing_slash, with_trailing_slash, SshDetails};
use crate::secrets::KeyMaterial;
use crate::syncer::Syncer;

/// Upper bound for the connectivity probe, inside the job deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteFsSyncer {
    details: SshDetails,
    target: PathBuf,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

enum SshAuth<'a> {
    /// Ephemeral key file; removed when the sync attempt ends.
    Key(KeyMaterial),
    /// Delivered through the `SSHPASS` environment variable, never argv.
    Password(&'a SecretString),
    /// Whatever the ambient agent or host configuration provides.
    Agent,
}

impl RemoteFsSyncer {
    pub fn new(
        details: SshDetails,
        target: PathBuf,
        timeout: Duration,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            details,
            target,
            timeout,
            runner,
        }
    }

    fn resolve_auth(&self) -> Result<SshAuth<'_>> {
        if let Some(path) = &self.details.key_path {
            return Ok(SshAuth::Key(KeyMaterial::from_file(path)?));
        }
        if let Some(encoded) = &self.details.private_key {
            return Ok(SshAuth::Key(KeyMaterial::from_base64(encoded)?));
        }
        if let Some(password) = &self.details.password {
            return Ok(SshAuth::Password(password));
        }
        Ok(SshAuth::Agent)
    }

    /// Common ssh options shared by the probe and the transfer shell.
    fn ssh_options(&self, auth: &SshAuth<'_>) -> Vec<String> {
        let mut options = vec![
            "-p".to_string(),
            self.details.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ];
        match auth {
            SshAuth::Key(key) => {
                options.push("-i".to_string());
                options.push(key.path().display().to_string());
            }
            SshAuth::Password(_) => {}
            SshAuth::Agent => {}
        }
        if !matches!(auth, SshAuth::Password(_)) {
            // Without a password source, ssh must fail instead of prompting.
            options.push("-o".to_string());
            options.push("BatchMode=yes".to_string());
        }
        options
    }

    /// Wraps a command in `sshpass -e` when password auth is in play.
    fn with_auth_transport(&self, auth: &SshAuth<'_>, program: &str, args: Vec<String>) -> Command {
        match auth {
            SshAuth::Password(password) => Command::new("sshpass")
                .arg("-e")
                .arg(program)
                .args(args)
                .env("SSHPASS", password.expose_secret()),
            _ => Command::new(program).args(args),
        }
    }

    async fn probe(&self, auth: &SshAuth<'_>, deadline: &Deadline) -> Result<()> {
        let destination = format!("{}@{}", self.details.user, self.details.host);
        let mut args = self.ssh_options(auth);
        args.push(destination);
        args.push("true".to_string());

        let command = self.with_auth_transport(auth, "ssh", args);
        let timeout = deadline.remaining_capped(PROBE_TIMEOUT)?;

        log::debug!("probing ssh connectivity: {}", command.display());
        let output = self.runner.run(&command, timeout).await?;
        if output.success() {
            return Ok(());
        }

        match classify_command_error(&mask_credentials(&output.error_text())) {
            err @ SyncError::Auth(_) => Err(err),
            err @ SyncError::Network(_) => Err(err),
            other => Err(SyncError::Network(format!(
                "connection probe failed: {}",
                other
            ))),
        }
    }

    async fn transfer(&self, auth: &SshAuth<'_>, deadline: &Deadline) -> Result<()> {
        let ssh_command = {
            let mut parts = vec!["ssh".to_string()];
            parts.extend(self.ssh_options(auth));
            parts.join(" ")
        };
        let source = format!(
            "{}@{}:{}",
            self.details.user,
            self.details.host,
            with_trailing_slash(&self.details.path)
        );

        let args = vec![
            "-az".to_string(),
            "--delete".to_string(),
            "-e".to_string(),
            ssh_command,
            source,
            path_with_trailing_slash(&self.target),
        ];
        let command = self.with_auth_transport(auth, "rsync", args);

        log::info!(
            "mirroring {}@{}:{} into {}",
            self.details.user,
            self.details.host,
            self.details.path,
            self.target.display()
        );
        let output = self.runner.run(&command, deadline.remaining()?).await?;
        if output.success() {
            return Ok(());
        }

        match classify_command_error(&mask_credentials(&output.error_text())) {
            err @ SyncError::Auth(_) => Err(err),
            err @ SyncError::Network(_) => Err(err),
            other => Err(SyncError::Network(format!(
                "mirror transfer failed: {}",
                other
            ))),
        }
    }
}

#[async_trait::async_trait]
impl Syncer for RemoteFsSyncer {
    async fn sync(&self) -> Result<()> {
        let deadline = Deadline::after(self.timeout);
        ensure_dir(&self.target)?;

        let auth = self.resolve_auth()?;
        self.probe(&auth, &deadline).await?;
        self.transfer(&auth, &deadline).await?;

        log::info!("mirror of {} completed", self.target.display());
        Ok(())
    }
}
