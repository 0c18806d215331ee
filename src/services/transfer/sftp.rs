use super::{TransferConnector, TransferSession};
use crate::models::AccountCredential;
use anyhow::{Context, Result, anyhow};
use ssh2::{Session, Sftp};
use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Password-authenticated SFTP over libssh2
#[derive(Debug, Default, Clone)]
pub struct Ssh2Connector;

pub struct Ssh2Session {
    session: Session,
    sftp: Option<Sftp>,
    closed: bool,
}

impl TransferConnector for Ssh2Connector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        credential: &AccountCredential,
        timeout: Duration,
    ) -> Result<Box<dyn TransferSession>> {
        let addr = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}:{}", host, port))?
            .next()
            .ok_or_else(|| anyhow!("No address for {}:{}", host, port))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .with_context(|| format!("TCP connect to {} failed", addr))?;
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))?;

        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {} failed", addr))?;

        session
            .userauth_password(&credential.username, &credential.password)
            .with_context(|| format!("Authentication failed for user {}", credential.username))?;
        if !session.authenticated() {
            return Err(anyhow!(
                "Authentication failed for user {}",
                credential.username
            ));
        }

        let sftp = session.sftp().context("Failed to open SFTP channel")?;
        tracing::debug!("SFTP session opened to {} as {}", addr, credential.username);

        Ok(Box::new(Ssh2Session {
            session,
            sftp: Some(sftp),
            closed: false,
        }))
    }
}

impl Ssh2Session {
    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| anyhow!("SFTP session already closed"))
    }
}

impl TransferSession for Ssh2Session {
    fn put(&mut self, local: &Path, remote_path: &str) -> Result<u64> {
        let mut source = File::open(local)
            .with_context(|| format!("Failed to open staged file {}", local.display()))?;
        let mut remote = self
            .sftp()?
            .create(Path::new(remote_path))
            .with_context(|| format!("Failed to create remote file {}", remote_path))?;
        let written = io::copy(&mut source, &mut remote)
            .with_context(|| format!("Failed to write {}", remote_path))?;
        remote
            .close()
            .with_context(|| format!("Server rejected close of {}", remote_path))?;
        Ok(written)
    }

    fn list(&mut self, remote_dir: &str) -> Result<Vec<String>> {
        let entries = self
            .sftp()?
            .readdir(Path::new(remote_dir))
            .with_context(|| format!("Failed to list {}", remote_dir))?;
        Ok(entries
            .into_iter()
            .filter_map(|(path, _)| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.to_string())
            })
            .collect())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The SFTP channel must be released before the session goes away
        self.sftp.take();
        self.session
            .disconnect(None, "transfer finished", None)
            .context("SSH disconnect failed")
    }
}

impl Drop for Ssh2Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("SFTP session close on drop: {}", e);
        }
    }
}
