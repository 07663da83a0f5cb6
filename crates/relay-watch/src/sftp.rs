//! SFTP-backed remote source
//!
//! libssh2 is blocking, so every call runs on the blocking pool and is awaited
//! right away. The pipeline is sequential anyway; this only keeps the runtime
//! worker threads free.

use async_trait::async_trait;
use relay_core::{Fingerprint, RelayError, Result, WatchConfig};
use ssh2::{ErrorCode, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use crate::source::RemoteSource;

/// libssh2's `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

struct SftpConnection {
    // Keeps the SSH session alive for as long as the SFTP channel is used
    _session: Session,
    sftp: Sftp,
}

/// Remote file access over SFTP
pub struct SftpSource {
    config: WatchConfig,
    connection: Arc<Mutex<Option<SftpConnection>>>,
}

impl SftpSource {
    /// Create a source without connecting yet
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a source and open the session
    pub async fn connect_with(config: WatchConfig) -> Result<Self> {
        let mut source = Self::new(config);
        source.connect().await?;
        Ok(source)
    }

    /// Run `op` against the live SFTP channel on the blocking pool
    async fn with_sftp<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp) -> Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| RelayError::Transport("SFTP session lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| RelayError::Transport("SFTP session is not open".to_string()))?;
            op(&conn.sftp)
        })
        .await
        .map_err(|e| RelayError::Other(format!("SFTP task failed: {}", e)))?
    }
}

fn open_connection(config: &WatchConfig) -> Result<SftpConnection> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| transport("resolve", e))?
        .next()
        .ok_or_else(|| {
            RelayError::Transport(format!("No address found for {}", config.host))
        })?;

    let tcp = TcpStream::connect_timeout(&addr, config.connect_timeout())
        .map_err(|e| transport("connect", e))?;

    let mut session = Session::new().map_err(|e| transport("session", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(config.connect_timeout().as_millis().min(u32::MAX as u128) as u32);
    session.handshake().map_err(|e| transport("handshake", e))?;

    let password = config.password();
    match (&config.key_file, &password) {
        (Some(key), _) => session
            .userauth_pubkey_file(&config.username, None, key, password.as_deref())
            .map_err(|e| transport("public key authentication", e))?,
        (None, Some(password)) => session
            .userauth_password(&config.username, password)
            .map_err(|e| transport("password authentication", e))?,
        (None, None) => session
            .userauth_agent(&config.username)
            .map_err(|e| transport("agent authentication", e))?,
    }

    if !session.authenticated() {
        return Err(RelayError::Transport(format!(
            "Authentication as {} was not accepted",
            config.username
        )));
    }

    let sftp = session.sftp().map_err(|e| transport("sftp subsystem", e))?;
    Ok(SftpConnection {
        _session: session,
        sftp,
    })
}

fn transport(stage: &str, e: impl std::fmt::Display) -> RelayError {
    RelayError::Transport(format!("SSH {} failed: {}", stage, e))
}

/// Classify a failed `open`
///
/// A missing file is expected absence. Other SFTP status codes (permission
/// denied and the like) are file-level problems on a healthy session; only
/// session-level errors mean the connection must be reopened.
fn open_failure(path: &str, e: ssh2::Error) -> Result<Option<Vec<u8>>> {
    match e.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => Ok(None),
        ErrorCode::SFTP(status) => Err(RelayError::Other(format!(
            "SFTP open of {} failed (status {}): {}",
            path, status, e
        ))),
        ErrorCode::Session(_) => Err(transport("open", e)),
    }
}

/// Read a whole remote file; `Ok(None)` when it does not exist
fn read_remote(sftp: &Sftp, path: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match sftp.open(Path::new(path)) {
        Ok(file) => file,
        Err(e) => return open_failure(path, e),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

#[async_trait]
impl RemoteSource for SftpSource {
    #[instrument(skip(self), fields(remote = %self.endpoint()))]
    async fn fingerprint(&self, path: &str) -> Result<Option<Fingerprint>> {
        let path = path.to_string();
        let bytes = self.with_sftp(move |sftp| read_remote(sftp, &path)).await?;
        Ok(bytes.as_deref().map(Fingerprint::of))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let owned = path.to_string();
        self.with_sftp(move |sftp| read_remote(sftp, &owned))
            .await?
            .ok_or_else(|| RelayError::Other(format!("Remote file vanished: {}", path)))
    }

    async fn connect(&mut self) -> Result<()> {
        let config = self.config.clone();
        let connection = Arc::clone(&self.connection);
        debug!("Opening SFTP session to {}", self.endpoint());

        tokio::task::spawn_blocking(move || {
            let opened = open_connection(&config)?;
            let mut guard = connection
                .lock()
                .map_err(|_| RelayError::Transport("SFTP session lock poisoned".to_string()))?;
            *guard = Some(opened);
            Ok::<_, RelayError>(())
        })
        .await
        .map_err(|e| RelayError::Other(format!("SFTP task failed: {}", e)))??;

        info!("SFTP session open to {}", self.endpoint());
        Ok(())
    }

    async fn close(&mut self) {
        let connection = Arc::clone(&self.connection);
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = connection.lock() {
                // Dropping the session sends the SSH disconnect
                guard.take();
            }
        })
        .await;
        debug!("SFTP session to {} closed", self.endpoint());
    }

    fn endpoint(&self) -> String {
        format!(
            "{}@{}:{}",
            self.config.username, self.config.host, self.config.port
        )
    }
}
