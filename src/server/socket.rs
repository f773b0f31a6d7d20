//! Local socket binding for the embedded server.
//!
//! On Linux and Android an abstract name is bound directly in the abstract
//! namespace. Elsewhere it maps to a socket file under the temp directory.

use std::io;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::config::SocketAddress;

/// Bind a listener. Must be called from within a tokio runtime.
pub fn bind(address: &SocketAddress) -> io::Result<UnixListener> {
    match address {
        SocketAddress::Abstract(name) => bind_abstract(name),
        SocketAddress::Path(path) => bind_path(path.clone()),
    }
}

pub async fn connect(address: &SocketAddress) -> io::Result<UnixStream> {
    match address {
        SocketAddress::Abstract(name) => connect_abstract(name).await,
        SocketAddress::Path(path) => UnixStream::connect(path).await,
    }
}

/// Socket file to remove after the listener is closed, if any.
pub fn socket_file(address: &SocketAddress) -> Option<PathBuf> {
    match address {
        SocketAddress::Path(path) => Some(path.clone()),
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        SocketAddress::Abstract(name) => Some(abstract_fallback_path(name)),
        #[cfg(any(target_os = "linux", target_os = "android"))]
        SocketAddress::Abstract(_) => None,
    }
}

fn bind_path(path: PathBuf) -> io::Result<UnixListener> {
    match UnixListener::bind(&path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse && is_stale(&path) => {
            info!("Removing stale socket file {}", path.display());
            std::fs::remove_file(&path)?;
            UnixListener::bind(&path)
        }
        Err(e) => Err(e),
    }
}

/// A socket file nobody is listening on, left behind by a crashed process.
fn is_stale(path: &Path) -> bool {
    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => false,
        Err(e) => {
            debug!("Socket {} refused connection: {}", path.display(), e);
            e.kind() == io::ErrorKind::ConnectionRefused
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_abstract(name: &str) -> io::Result<UnixListener> {
    #[cfg(target_os = "android")]
    use std::os::android::net::SocketAddrExt;
    #[cfg(target_os = "linux")]
    use std::os::linux::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
    let listener = std::os::unix::net::UnixListener::bind_addr(&addr)?;
    listener.set_nonblocking(true)?;
    UnixListener::from_std(listener)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
async fn connect_abstract(name: &str) -> io::Result<UnixStream> {
    #[cfg(target_os = "android")]
    use std::os::android::net::SocketAddrExt;
    #[cfg(target_os = "linux")]
    use std::os::linux::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
    let stream = tokio::task::spawn_blocking(move || {
        std::os::unix::net::UnixStream::connect_addr(&addr)
    })
    .await
    .map_err(io::Error::other)??;
    stream.set_nonblocking(true)?;
    UnixStream::from_std(stream)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn abstract_fallback_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}.sock", name))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_abstract(name: &str) -> io::Result<UnixListener> {
    bind_path(abstract_fallback_path(name))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
async fn connect_abstract(name: &str) -> io::Result<UnixStream> {
    UnixStream::connect(abstract_fallback_path(name)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_path_bind_and_connect() {
        let dir = tempfile::tempdir().unwrap();
        let address = SocketAddress::Path(dir.path().join("s.sock"));

        let listener = bind(&address).unwrap();
        let (accepted, connected) = tokio::join!(listener.accept(), connect(&address));
        accepted.unwrap();
        connected.unwrap();
        assert_eq!(socket_file(&address), Some(dir.path().join("s.sock")));
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        // Bind with std and drop: the file stays, nothing listens
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let address = SocketAddress::Path(path);
        assert!(bind(&address).is_ok());
    }

    #[tokio::test]
    async fn test_live_socket_is_not_stolen() {
        let dir = tempfile::tempdir().unwrap();
        let address = SocketAddress::Path(dir.path().join("live.sock"));

        let _first = bind(&address).unwrap();
        let err = bind(&address).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_abstract_bind_and_connect() {
        let name = format!("solus-test-{}", uuid::Uuid::new_v4());
        let address = SocketAddress::Abstract(name);

        let listener = bind(&address).unwrap();
        let (accepted, connected) = tokio::join!(listener.accept(), connect(&address));
        accepted.unwrap();
        connected.unwrap();
        assert_eq!(socket_file(&address), None);

        // Abstract names are exclusive too
        assert!(bind(&address).is_err());
    }
}
