//! TLS material handling and the HTTPS accept loop for plugin RPC servers.
//!
//! The host hands each plugin its certificate chain and private key as PEM
//! blobs; [`server_config_from_pem`] turns them into a rustls config and
//! [`serve_tls`] runs an axum router behind it until a shutdown token
//! fires. [`generate_dev_certs`] mints a throwaway CA and server pair for
//! local hosts and tests.

pub mod error;

use std::{io::BufReader, net::SocketAddr, sync::Arc};

use {
    axum::Router,
    rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose, SanType},
    rustls::{
        ClientConfig, RootCertStore, ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer},
    },
    time::OffsetDateTime,
    tokio::{net::TcpListener, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
};

pub use error::{Error, Result};

use error::Context as _;

/// First byte of every TLS record carrying a handshake.
const TLS_HANDSHAKE: u8 = 0x16;
const ACCEPT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// Ensure a crypto provider is installed (ring via feature flag).
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(Error::EmptyPem {
            kind: "certificate",
        });
    }
    Ok(certs)
}

fn key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))?.ok_or(Error::EmptyPem {
        kind: "private key",
    })
}

/// Build a server config from a PEM certificate chain and private key.
pub fn server_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig> {
    install_crypto_provider();
    let certs = certs_from_pem(cert_pem)?;
    let key = key_from_pem(key_pem)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Build a client config that trusts only the given CA bundle.
pub fn client_config_from_ca(ca_pem: &[u8]) -> Result<ClientConfig> {
    install_crypto_provider();
    let mut roots = RootCertStore::empty();
    for cert in certs_from_pem(ca_pem)? {
        roots.add(cert)?;
    }
    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// A local CA plus a server certificate it signed, all PEM-encoded.
#[derive(Clone)]
pub struct DevCerts {
    pub ca_cert: String,
    pub server_cert: String,
    pub server_key: String,
}

impl std::fmt::Debug for DevCerts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevCerts")
            .field("ca_cert", &self.ca_cert)
            .field("server_cert", &self.server_cert)
            .field("server_key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a CA and a server certificate valid for `localhost`, the
/// loopback addresses and `host_name`.
pub fn generate_dev_certs(host_name: &str) -> Result<DevCerts> {
    let now = OffsetDateTime::now_utc();

    let ca_key = KeyPair::generate()?;
    let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "Hive Local CA");
    ca_params
        .distinguished_name
        .push(DnType::OrganizationName, "Hive");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    ca_params.not_before = now;
    ca_params.not_after = now + time::Duration::days(365 * 10);
    let ca_cert = ca_params.self_signed(&ca_key)?;

    let server_key = KeyPair::generate()?;
    let mut server_params = CertificateParams::new(vec![host_name.to_string()])?;
    server_params
        .distinguished_name
        .push(DnType::CommonName, host_name);
    let mut sans = vec![
        SanType::DnsName("localhost".try_into()?),
        SanType::IpAddress(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)),
        SanType::IpAddress(std::net::IpAddr::V6(std::net::Ipv6Addr::LOCALHOST)),
    ];
    if host_name != "localhost" {
        sans.push(SanType::DnsName(host_name.try_into()?));
    }
    server_params.subject_alt_names = sans;
    server_params.not_before = now;
    server_params.not_after = now + time::Duration::days(365);
    let server_cert = server_params.signed_by(&server_key, &ca_cert, &ca_key)?;

    Ok(DevCerts {
        ca_cert: ca_cert.pem(),
        server_cert: server_cert.pem(),
        server_key: server_key.serialize_pem(),
    })
}

/// Serve `app` over TLS on `listener` until `shutdown` is cancelled.
///
/// Connections that do not open with a TLS handshake are dropped. On
/// shutdown the listener is closed and every in-flight connection is
/// aborted before this returns.
pub async fn serve_tls(
    listener: TcpListener,
    tls_config: Arc<ServerConfig>,
    app: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    let acceptor = tokio_rustls::TlsAcceptor::from(tls_config);
    let local_addr = listener.local_addr().context("reading listener address")?;
    let mut make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let mut connections = JoinSet::new();

    info!(addr = %local_addr, "TLS server listening");

    loop {
        while connections.try_join_next().is_some() {}

        let (stream, addr) = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    if is_accept_error(&e) {
                        continue;
                    }
                    error!("accept error: {e}");
                    if backoff(&shutdown).await {
                        continue;
                    }
                    break;
                },
            },
        };

        let acceptor = acceptor.clone();
        let service = <_ as tower::Service<SocketAddr>>::call(&mut make_service, addr)
            .await
            .unwrap_or_else(|e| match e {});
        connections.spawn(async move {
            let mut peek_buf = [0u8; 1];
            match stream.peek(&mut peek_buf).await {
                Ok(1) if peek_buf[0] == TLS_HANDSHAKE => {},
                Ok(_) => {
                    debug!("dropping non-TLS connection from {addr}");
                    return;
                },
                Err(e) => {
                    debug!("peek failed from {addr}: {e}");
                    return;
                },
            }

            let Ok(tls_stream) = acceptor.accept(stream).await.inspect_err(|e| {
                debug!("TLS handshake failed from {addr}: {e}");
            }) else {
                return;
            };
            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let hyper_service = hyper_util::service::TowerToHyperService::new(service);
            if let Err(e) =
                hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                    .serve_connection_with_upgrades(io, hyper_service)
                    .await
            {
                debug!("connection error from {addr}: {e}");
            }
        });
    }

    drop(listener);
    connections.abort_all();
    while connections.join_next().await.is_some() {}
    info!(addr = %local_addr, "TLS server stopped");
    Ok(())
}

/// Pause after a failed accept. Returns `false` when shutdown arrived
/// first.
async fn backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

fn is_accept_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}
