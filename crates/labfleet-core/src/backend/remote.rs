//! Remote execution backend.
//!
//! Relays every operation through an SSH session to the configured
//! remote host, opening one session per logical operation and
//! disconnecting on every exit path. File transfer rides an SFTP
//! subsystem channel paired with the session. Commands can optionally be
//! escalated with `sudo -S`, feeding a dedicated sudo password over
//! stdin so it never appears on a command line.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use super::{CommandOutput, ExecutionBackend};
use crate::domain::{FleetError, Result};
use crate::settings::RemoteHostSettings;

/// Backend relaying operations to a remote host over SSH.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    settings: RemoteHostSettings,
}

/// Client handler for lab-internal hosts; host keys are not pinned.
struct LabHostClient;

#[async_trait]
impl client::Handler for LabHostClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

impl RemoteBackend {
    pub fn new(settings: RemoteHostSettings) -> Result<Self> {
        if settings.host.is_empty() {
            return Err(FleetError::Settings(
                "remote backend selected but no remote host configured".into(),
            ));
        }
        if settings.username.is_empty() {
            return Err(FleetError::Settings(
                "remote host configured without a username".into(),
            ));
        }
        Ok(Self { settings })
    }

    /// Open and authenticate one SSH session.
    async fn open(&self) -> Result<client::Handle<LabHostClient>> {
        let config = Arc::new(client::Config::default());
        let addr = (self.settings.host.as_str(), self.settings.port);
        let connect_timeout = Duration::from_secs(self.settings.connect_timeout_secs);

        let mut handle =
            tokio::time::timeout(connect_timeout, client::connect(config, addr, LabHostClient))
                .await
                .map_err(|_| {
                    FleetError::Connection(format!(
                        "connect to {}:{} timed out",
                        self.settings.host, self.settings.port
                    ))
                })?
                .map_err(|e| FleetError::Connection(e.to_string()))?;

        let authenticated = if let Some(key_path) = &self.settings.private_key {
            let key = russh_keys::load_secret_key(key_path, None)
                .map_err(|e| FleetError::Connection(format!("load private key: {e}")))?;
            handle
                .authenticate_publickey(&self.settings.username, Arc::new(key))
                .await
                .map_err(|e| FleetError::Connection(e.to_string()))?
        } else if let Some(password) = &self.settings.password {
            handle
                .authenticate_password(&self.settings.username, password)
                .await
                .map_err(|e| FleetError::Connection(e.to_string()))?
        } else {
            return Err(FleetError::Connection(
                "remote host has neither password nor private key configured".into(),
            ));
        };

        if !authenticated {
            return Err(FleetError::Connection(format!(
                "authentication rejected for {}@{}",
                self.settings.username, self.settings.host
            )));
        }

        Ok(handle)
    }

    fn escalate(&self, cmd: &str) -> String {
        if self.settings.use_sudo {
            // -S reads the password from stdin, -p '' silences the prompt.
            format!("sudo -S -p '' sh -c '{}'", cmd.replace('\'', r"'\''"))
        } else {
            cmd.to_string()
        }
    }

    async fn exec_on(
        &self,
        handle: &client::Handle<LabHostClient>,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;

        channel
            .exec(true, self.escalate(cmd).as_str())
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;

        if self.settings.use_sudo {
            if let Some(sudo_password) = &self.settings.sudo_password {
                let line = format!("{sudo_password}\n");
                channel
                    .data(line.as_bytes())
                    .await
                    .map_err(|e| FleetError::Connection(e.to_string()))?;
            }
        }

        let collect = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let mut exit_code = -1;
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                    ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                        stderr.extend_from_slice(data)
                    }
                    ChannelMsg::ExitStatus { exit_status } => exit_code = exit_status as i32,
                    _ => {}
                }
            }
            CommandOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            }
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(output) => Ok(output),
            // The caller disconnects the session, force-closing the channel.
            Err(_) => Err(FleetError::Timeout {
                elapsed_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn sftp_on(&self, handle: &client::Handle<LabHostClient>) -> Result<SftpSession> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;
        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))
    }

    async fn close(&self, handle: client::Handle<LabHostClient>) {
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }

    async fn put_file(&self, sftp: &SftpSession, local: &Path, remote: &Path) -> Result<()> {
        let data = tokio::fs::read(local).await?;
        let mut file = sftp
            .create(remote.to_string_lossy().as_ref())
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;
        file.write_all(&data)
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;
        file.shutdown()
            .await
            .map_err(|e| FleetError::Connection(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for RemoteBackend {
    async fn run_command(&self, cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!(host = %self.settings.host, cmd, "running remote command");
        let handle = self.open().await?;
        let result = self.exec_on(&handle, cmd, timeout).await;
        self.close(handle).await;
        result
    }

    async fn upload_file(&self, local: &Path, remote: &Path) -> Result<()> {
        let handle = self.open().await?;
        let result = async {
            let sftp = self.sftp_on(&handle).await?;
            if let Some(parent) = remote.parent() {
                // Ignore "already exists"; a failed put surfaces the real problem.
                let _ = sftp.create_dir(parent.to_string_lossy().as_ref()).await;
            }
            self.put_file(&sftp, local, remote).await
        }
        .await;
        self.close(handle).await;
        result
    }

    async fn upload_tree(&self, local_dir: &Path, remote: &Path) -> Result<()> {
        let handle = self.open().await?;
        let result = async {
            let sftp = self.sftp_on(&handle).await?;
            for entry in WalkDir::new(local_dir) {
                let entry = entry.map_err(|e| {
                    FleetError::Io(e.into_io_error().unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                    }))
                })?;
                let rel = entry
                    .path()
                    .strip_prefix(local_dir)
                    .expect("walkdir yields paths under its root");
                let dest = remote.join(rel);
                if entry.file_type().is_dir() {
                    let _ = sftp.create_dir(dest.to_string_lossy().as_ref()).await;
                } else if entry.file_type().is_file() {
                    self.put_file(&sftp, entry.path(), &dest).await?;
                }
            }
            Ok(())
        }
        .await;
        self.close(handle).await;
        result
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        let connect_timeout = Duration::from_secs(self.settings.connect_timeout_secs);
        let out = self
            .run_command(
                &format!("mkdir -p '{}'", path.to_string_lossy().replace('\'', r"'\''")),
                connect_timeout,
            )
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(FleetError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RemoteHostSettings {
        RemoteHostSettings {
            enabled: true,
            host: "lab-host.example.net".into(),
            username: "labops".into(),
            password: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_missing_host() {
        let err = RemoteBackend::new(RemoteHostSettings::default()).unwrap_err();
        assert!(matches!(err, FleetError::Settings(_)));
    }

    #[test]
    fn test_new_rejects_missing_username() {
        let mut s = settings();
        s.username.clear();
        let err = RemoteBackend::new(s).unwrap_err();
        assert!(matches!(err, FleetError::Settings(_)));
    }

    #[test]
    fn test_sudo_wrapping_quotes_single_quotes() {
        let mut s = settings();
        s.use_sudo = true;
        let backend = RemoteBackend::new(s).unwrap();
        let wrapped = backend.escalate("echo 'hi'");
        assert!(wrapped.starts_with("sudo -S -p '' sh -c "));
        assert!(wrapped.contains(r"'\''hi'\''"));
    }

    #[test]
    fn test_no_sudo_leaves_command_untouched() {
        let backend = RemoteBackend::new(settings()).unwrap();
        assert_eq!(backend.escalate("uname -a"), "uname -a");
    }
}
