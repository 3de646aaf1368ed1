//! Gateway - TCP/TLS/WebSocket listeners that accept incoming connections.
//!
//! The Gateway binds the configured plaintext, TLS, and WebSocket sockets and
//! spawns a [`Connection`] task for each accepted client. TLS and WebSocket
//! listeners are optional and run as independent background tasks; the
//! plaintext listener drives [`Gateway::run`] itself.

use crate::config::{ListenConfig, TlsConfig, WebSocketConfig};
use crate::db::Database;
use crate::handlers::Registry;
use crate::network::Connection;
use crate::state::Matrix;
use std::io::Cursor;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::{error, info, instrument, warn};

/// The Gateway accepts incoming TCP/TLS/WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    tls_listener: Option<TcpListener>,
    websocket_listener: Option<TcpListener>,
    websocket_config: Option<WebSocketConfig>,
    /// Shared by the plaintext listener (for STARTTLS) and the TLS listener.
    tls_acceptor: Option<TlsAcceptor>,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
    db: Database,
}

impl Gateway {
    /// Bind the configured listeners.
    pub async fn bind(
        listen: ListenConfig,
        tls: Option<TlsConfig>,
        websocket: Option<WebSocketConfig>,
        matrix: Arc<Matrix>,
        registry: Arc<Registry>,
        db: Database,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(listen.address).await?;
        info!(address = %listen.address, "Gateway listening (plaintext)");

        let tls_acceptor = match &tls {
            Some(cfg) => Some(build_tls_acceptor(cfg).await?),
            None => None,
        };

        let tls_listener = match &tls {
            Some(cfg) => {
                let l = TcpListener::bind(cfg.address).await?;
                info!(address = %cfg.address, "Gateway listening (TLS)");
                Some(l)
            }
            None => None,
        };

        let websocket_listener = match &websocket {
            Some(cfg) => {
                let l = TcpListener::bind(cfg.address).await?;
                info!(address = %cfg.address, "Gateway listening (WebSocket)");
                Some(l)
            }
            None => None,
        };

        Ok(Self {
            listener,
            tls_listener,
            websocket_listener,
            websocket_config: websocket,
            tls_acceptor,
            matrix,
            registry,
            db,
        })
    }

    /// Run the gateway, accepting connections forever.
    ///
    /// The TLS and WebSocket listeners (if configured) run as independent
    /// spawned tasks; this future drives the plaintext listener and only
    /// returns if it fails.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> std::io::Result<()> {
        if let Some(tls_listener) = self.tls_listener {
            let acceptor = self
                .tls_acceptor
                .clone()
                .expect("TLS listener requires an acceptor");
            let matrix = Arc::clone(&self.matrix);
            let registry = Arc::clone(&self.registry);
            let db = self.db.clone();
            tokio::spawn(run_tls_listener(tls_listener, acceptor, matrix, registry, db));
        }

        if let Some(websocket_listener) = self.websocket_listener {
            let allow_origins = self
                .websocket_config
                .map(|cfg| cfg.allow_origins)
                .unwrap_or_default();
            let matrix = Arc::clone(&self.matrix);
            let registry = Arc::clone(&self.registry);
            let db = self.db.clone();
            tokio::spawn(run_websocket_listener(
                websocket_listener,
                allow_origins,
                matrix,
                registry,
                db,
            ));
        }

        run_plaintext_listener(self.listener, self.tls_acceptor, self.matrix, self.registry, self.db)
            .await
    }
}

/// Build a `TlsAcceptor` from a client-facing TLS config (no client-cert verification).
async fn build_tls_acceptor(config: &TlsConfig) -> std::io::Result<TlsAcceptor> {
    let cert_data = tokio::fs::read(&config.cert_path).await?;
    let cert_chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut Cursor::new(&cert_data))
        .filter_map(|r| r.ok())
        .collect();
    if cert_chain.is_empty() {
        return Err(std::io::Error::other("no certificates found in cert file"));
    }

    let key_data = tokio::fs::read(&config.key_path).await?;
    let key = rustls_pemfile::pkcs8_private_keys(&mut Cursor::new(&key_data))
        .filter_map(|r| r.ok())
        .map(PrivateKeyDer::Pkcs8)
        .next()
        .ok_or_else(|| std::io::Error::other("no private key found in key file"))?;

    let tls_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(std::io::Error::other)?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

async fn run_plaintext_listener(
    listener: TcpListener,
    starttls_acceptor: Option<TlsAcceptor>,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
    db: Database,
) -> std::io::Result<()> {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept plaintext connection");
                continue;
            }
        };
        info!(%addr, "Connection accepted (plaintext)");

        let matrix = Arc::clone(&matrix);
        let registry = Arc::clone(&registry);
        let db = db.clone();
        let starttls_acceptor = starttls_acceptor.clone();
        let uid = matrix.uid_gen.next();

        tokio::spawn(async move {
            let connection =
                Connection::new_plaintext(uid.clone(), stream, addr, matrix, registry, db, starttls_acceptor);
            if let Err(e) = connection.run().await {
                error!(%uid, %addr, error = %e, "Connection error");
            }
            info!(%uid, %addr, "Connection closed");
        });
    }
}

async fn run_tls_listener(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
    db: Database,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept TLS connection");
                continue;
            }
        };

        let matrix = Arc::clone(&matrix);
        let registry = Arc::clone(&registry);
        let db = db.clone();
        let acceptor = acceptor.clone();
        let uid = matrix.uid_gen.next();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(%addr, error = %e, "TLS handshake failed");
                    return;
                }
            };
            info!(%addr, "Connection accepted (TLS)");

            let connection = Connection::new_tls(uid.clone(), tls_stream, addr, matrix, registry, db);
            if let Err(e) = connection.run().await {
                error!(%uid, %addr, error = %e, "Connection error");
            }
            info!(%uid, %addr, "Connection closed");
        });
    }
}

async fn run_websocket_listener(
    listener: TcpListener,
    allow_origins: Vec<String>,
    matrix: Arc<Matrix>,
    registry: Arc<Registry>,
    db: Database,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "Failed to accept WebSocket connection");
                continue;
            }
        };

        let matrix = Arc::clone(&matrix);
        let registry = Arc::clone(&registry);
        let db = db.clone();
        let allow_origins = allow_origins.clone();
        let uid = matrix.uid_gen.next();

        tokio::spawn(async move {
            match accept_websocket(stream, &allow_origins).await {
                Ok(ws_stream) => {
                    info!(%addr, "Connection accepted (WebSocket)");
                    let connection = Connection::new_websocket(uid.clone(), ws_stream, addr, matrix, registry, db);
                    if let Err(e) = connection.run().await {
                        error!(%uid, %addr, error = %e, "Connection error");
                    }
                    info!(%uid, %addr, "Connection closed");
                }
                Err(e) => {
                    warn!(%addr, error = %e, "WebSocket handshake failed");
                }
            }
        });
    }
}

async fn accept_websocket(
    stream: TcpStream,
    allow_origins: &[String],
) -> Result<tokio_tungstenite::WebSocketStream<TcpStream>, tokio_tungstenite::tungstenite::Error> {
    if allow_origins.is_empty() {
        return tokio_tungstenite::accept_async(stream).await;
    }

    let allow_origins = allow_origins.to_vec();
    tokio_tungstenite::accept_hdr_async(stream, move |req: &tokio_tungstenite::tungstenite::handshake::server::Request, resp| {
        let origin_ok = req
            .headers()
            .get("Origin")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|origin| allow_origins.iter().any(|allowed| allowed == origin));

        if origin_ok {
            Ok(resp)
        } else {
            Err(http::Response::builder()
                .status(http::StatusCode::FORBIDDEN)
                .body(None::<String>)
                .unwrap())
        }
    })
    .await
}
