//! Platform-specific socket/pipe implementation.
//!
//! - Unix: Unix Domain Socket at `/tmp/cmdwire-{hash}.sock`
//! - Windows: Named Pipe at `\\.\pipe\cmdwire-{hash}`
//!
//! The endpoint is derived from the project hash, so a client and the host
//! serving the same project find each other without any discovery step.
//!
//! # Example
//!
//! ```ignore
//! use cmdwire::transport::{endpoint_for_project, PipeListener};
//!
//! let endpoint = endpoint_for_project(Path::new("/work/game"));
//! let listener = PipeListener::bind(&endpoint).await?;
//! let stream = listener.accept().await?;
//! ```

use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::project::project_hash_for;

/// Endpoint name for a project hash.
///
/// Format:
/// - Unix: `/tmp/cmdwire-{hash}.sock`
/// - Windows: `\\.\pipe\cmdwire-{hash}`
pub fn endpoint_for_hash(hash: &str) -> String {
    #[cfg(unix)]
    {
        format!("/tmp/cmdwire-{}.sock", hash)
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\cmdwire-{}", hash)
    }
}

/// Endpoint name for a project root.
pub fn endpoint_for_project(root: &Path) -> String {
    endpoint_for_hash(&project_hash_for(root))
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
    }

    /// Unix Domain Socket stream (connected).
    pub struct PipeStream {
        stream: UnixStream,
    }

    impl PipeListener {
        /// Bind to a Unix socket path.
        ///
        /// Removes a stale socket file left by a previous host.
        pub async fn bind(path: &str) -> Result<Self> {
            if Path::new(path).exists() {
                std::fs::remove_file(path)?;
            }

            let listener = UnixListener::bind(path)?;

            Ok(Self {
                listener,
                path: path.to_string(),
            })
        }

        /// Accept the next connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream { stream })
        }

        /// Get the socket path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl PipeStream {
        /// Connect to a listening host.
        pub async fn connect(path: &str) -> Result<Self> {
            let stream = UnixStream::connect(path).await?;
            Ok(Self { stream })
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.stream).poll_write(cx, buf)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_shutdown(cx)
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    /// Windows Named Pipe listener.
    ///
    /// Always keeps one idle server instance so clients never see a missing
    /// pipe between accepts.
    pub struct PipeListener {
        path: String,
        next: Mutex<Option<NamedPipeServer>>,
    }

    enum PipeInner {
        Server(NamedPipeServer),
        Client(NamedPipeClient),
    }

    /// Windows Named Pipe stream (connected).
    pub struct PipeStream {
        pipe: PipeInner,
    }

    impl PipeListener {
        /// Create the first Named Pipe server instance.
        pub async fn bind(path: &str) -> Result<Self> {
            let first = ServerOptions::new()
                .first_pipe_instance(true)
                .create(path)?;

            Ok(Self {
                path: path.to_string(),
                next: Mutex::new(Some(first)),
            })
        }

        /// Accept the next connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let taken = match self.next.lock() {
                Ok(mut guard) => guard.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            let server = match taken {
                Some(server) => server,
                None => ServerOptions::new().create(&self.path)?,
            };

            server.connect().await?;

            let replacement = ServerOptions::new().create(&self.path)?;
            match self.next.lock() {
                Ok(mut guard) => *guard = Some(replacement),
                Err(poisoned) => *poisoned.into_inner() = Some(replacement),
            }

            Ok(PipeStream {
                pipe: PipeInner::Server(server),
            })
        }

        /// Get the pipe path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl PipeStream {
        /// Connect to a listening host.
        pub async fn connect(path: &str) -> Result<Self> {
            let client = ClientOptions::new().open(path)?;
            Ok(Self {
                pipe: PipeInner::Client(client),
            })
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match &mut self.pipe {
                PipeInner::Server(p) => std::pin::Pin::new(p).poll_read(cx, buf),
                PipeInner::Client(p) => std::pin::Pin::new(p).poll_read(cx, buf),
            }
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            match &mut self.pipe {
                PipeInner::Server(p) => std::pin::Pin::new(p).poll_write(cx, buf),
                PipeInner::Client(p) => std::pin::Pin::new(p).poll_write(cx, buf),
            }
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match &mut self.pipe {
                PipeInner::Server(p) => std::pin::Pin::new(p).poll_flush(cx),
                PipeInner::Client(p) => std::pin::Pin::new(p).poll_flush(cx),
            }
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match &mut self.pipe {
                PipeInner::Server(p) => std::pin::Pin::new(p).poll_shutdown(cx),
                PipeInner::Client(p) => std::pin::Pin::new(p).poll_shutdown(cx),
            }
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeListener, PipeStream};

/// Connect to the host serving `endpoint`.
pub async fn connect(endpoint: &str) -> Result<PipeStream> {
    PipeStream::connect(endpoint).await
}
