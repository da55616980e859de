//! Local asset server: serves the image directory over loopback HTTP.
//!
//! The image resolver fetches local images through this server so local and
//! remote images follow the same code path. The server lives between
//! [`AssetServer::start`] and [`AssetServer::close`]; it is never restarted.

use crate::error::Md2PdfError;
use axum::Router;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

enum State {
    Idle,
    Running {
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<io::Result<()>>,
    },
    Closed,
}

/// Static file server rooted at the image directory.
pub struct AssetServer {
    root: PathBuf,
    port: u16,
    state: State,
}

impl AssetServer {
    /// Create an idle server. `port` 0 picks a free port at start.
    pub fn new(root: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            root: root.into(),
            port,
            state: State::Idle,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bind `127.0.0.1:port` and start serving.
    ///
    /// # Errors
    /// * [`Md2PdfError::AssetServer`] if already running or closed
    /// * [`Md2PdfError::AssetServerBind`] if the port is taken
    pub async fn start(&mut self) -> Result<SocketAddr, Md2PdfError> {
        match self.state {
            State::Idle => {}
            State::Running { addr, .. } => {
                return Err(Md2PdfError::AssetServer(format!(
                    "already running on {addr}"
                )))
            }
            State::Closed => {
                return Err(Md2PdfError::AssetServer(
                    "cannot restart a closed image server".into(),
                ))
            }
        }

        if !self.root.is_dir() {
            warn!(
                "Image folder '{}' does not exist; local images will not resolve",
                self.root.display()
            );
        }

        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, self.port));
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|e| Md2PdfError::AssetServerBind {
                addr: requested.to_string(),
                source: e,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| Md2PdfError::AssetServerBind {
                addr: requested.to_string(),
                source: e,
            })?;

        let app = Router::new().fallback_service(ServeDir::new(&self.root));
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        info!(
            "Started image server on http://{} with image folder route '{}'",
            addr,
            self.root.display()
        );
        self.state = State::Running {
            addr,
            shutdown,
            task,
        };
        Ok(addr)
    }

    /// `http://127.0.0.1:<port>`, using the bound port while running.
    pub fn base_url(&self) -> String {
        match &self.state {
            State::Running { addr, .. } => format!("http://{addr}"),
            _ => format!("http://{}:{}", Ipv4Addr::LOCALHOST, self.port),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            State::Running { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Stop accepting connections and wait for the server task.
    ///
    /// Closing an idle server marks it closed without binding; closing twice
    /// is a no-op.
    pub async fn close(&mut self) -> Result<(), Md2PdfError> {
        let State::Running { shutdown, task, .. } =
            std::mem::replace(&mut self.state, State::Closed)
        else {
            return Ok(());
        };

        let _ = shutdown.send(());
        match task.await {
            Ok(Ok(())) => {
                info!("Gracefully shut down image server");
                Ok(())
            }
            Ok(Err(e)) => Err(Md2PdfError::AssetServer(format!("server error: {e}"))),
            Err(e) => Err(Md2PdfError::Internal(format!(
                "image server task failed: {e}"
            ))),
        }
    }
}

impl Drop for AssetServer {
    fn drop(&mut self) {
        if let State::Running { shutdown, .. } = std::mem::replace(&mut self.state, State::Closed)
        {
            debug!("Image server dropped while running; signalling shutdown");
            let _ = shutdown.send(());
        }
    }
}

impl std::fmt::Debug for AssetServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Idle => "idle",
            State::Running { .. } => "running",
            State::Closed => "closed",
        };
        f.debug_struct("AssetServer")
            .field("root", &self.root)
            .field("port", &self.port)
            .field("state", &state)
            .finish()
    }
}
