//! Connection plumbing: dialing, the socket reader and the socket writer.
//!
//! The reader task is the only reader of the socket and the writer task
//! the only writer. Both are torn down through a per-connection
//! cancellation token; whoever notices a failure cancels it, and the
//! reader does the disconnect bookkeeping exactly once.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::Client;
use crate::event::Event;
use crate::parse;

/// Deadline for a single line write; missing it closes the connection.
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The dispatcher-side handle to a live connection. The sequence number
/// distinguishes it from earlier connections during teardown races.
#[derive(Debug)]
pub(crate) struct ConnHandle {
    pub(crate) wire_tx: mpsc::Sender<String>,
    pub(crate) token: CancellationToken,
    pub(crate) seq: u64,
}

/// Dials the server, optionally wrapping the stream in TLS.
pub(crate) async fn dial(addr: &str, ssl: bool, skip_verification: bool) -> io::Result<(BoxReader, BoxWriter)> {
    let stream = TcpStream::connect(addr).await?;

    if let Err(err) = enable_keepalive(&stream) {
        warn!("failed to enable TCP keepalive: {}", err);
    }

    if !ssl {
        let (read_half, write_half) = stream.into_split();
        return Ok((Box::new(read_half), Box::new(write_half)));
    }

    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = if skip_verification {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    let host = addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr);
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let connector = TlsConnector::from(Arc::new(config));
    let tls_stream = connector.connect(server_name, stream).await?;
    let (read_half, write_half) = tokio::io::split(tls_stream);

    Ok((Box::new(read_half), Box::new(write_half)))
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

/// Reads lines from the socket, parses them and feeds the dispatcher.
/// When the loop ends for any reason, it performs the disconnect
/// bookkeeping and emits `client.disconnect`.
pub(crate) async fn reader_task(client: Client, read_half: BoxReader, token: CancellationToken, seq: u64) {
    let mut reader = BufReader::new(read_half);
    let mut buffer = String::new();

    loop {
        buffer.clear();

        tokio::select! {
            _ = token.cancelled() => break,
            result = reader.read_line(&mut buffer) => match result {
                Ok(0) => {
                    client.emit_non_blocking(Event::error("network", "Connection closed by server"));
                    break;
                }
                Ok(_) => {
                    let line = buffer.trim_end_matches(&['\r', '\n'][..]);

                    match parse::parse_packet(line) {
                        Ok(event) => {
                            client.emit_non_blocking(event);
                        }
                        Err(err) => {
                            // Parse noise right after a QUIT is expected.
                            if !client.has_quit() {
                                client.emit_non_blocking(Event::error(
                                    "parse",
                                    &format!("Read failed: {}", err),
                                ));
                            }
                        }
                    }
                }
                Err(err) => {
                    client.emit_non_blocking(Event::error("read", &format!("Read failed: {}", err)));
                    break;
                }
            }
        }
    }

    token.cancel();
    debug!(id = client.id().as_str(), "connection reader finished");
    client.connection_lost(seq);
}

/// Writes lines to the socket in submission order, each under the write
/// deadline. A failed or timed-out write closes the connection.
pub(crate) async fn writer_task(
    client: Client,
    mut write_half: BoxWriter,
    mut wire_rx: mpsc::Receiver<String>,
    token: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            maybe = wire_rx.recv() => match maybe {
                Some(line) => line,
                None => break,
            },
        };

        let result = tokio::time::timeout(WRITE_TIMEOUT, async {
            write_half.write_all(line.as_bytes()).await?;
            write_half.flush().await
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                client.emit_non_blocking(Event::error("write", &err.to_string()));
                token.cancel();
                break;
            }
            Err(_) => {
                client.emit_non_blocking(Event::error("write", "write deadline exceeded"));
                token.cancel();
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
