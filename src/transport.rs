//! Byte-oriented duplex transport: plain TCP or TLS-wrapped TCP.
//!
//! [`Transport`] owns the connected stream and splits into independent
//! read and write halves so the reader task and writer task can run
//! concurrently. TLS is an upgrade applied to an already-connected TCP
//! stream; certificate validation uses the platform's native roots unless
//! the caller explicitly opted into the insecure accept-everything mode.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig as TlsConfig, RootCertStore};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::config::ServerAddr;
use crate::error::{EngineError, Result};

/// A connected client transport.
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// Open a plain TCP connection to the endpoint.
    pub async fn connect_tcp(addr: &ServerAddr) -> Result<TcpStream> {
        let stream = TcpStream::connect((addr.host.as_str(), addr.port)).await?;
        if let Err(e) = enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        Ok(stream)
    }

    /// Wrap an established TCP stream in TLS.
    ///
    /// With `accept_invalid_certs` set, certificate validation always
    /// succeeds. That mode is insecure and must be an explicit opt-in.
    pub async fn upgrade_tls(
        stream: TcpStream,
        host: &str,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let connector = tls_connector(accept_invalid_certs);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| EngineError::InvalidServerName(host.to_string()))?;
        let tls = connector.connect(server_name, stream).await?;
        Ok(Self::Tls(Box::new(tls)))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Split into independent read and write halves.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        match self {
            Self::Tcp(stream) => {
                let (r, w) = stream.into_split();
                (TransportReader::Tcp(r), TransportWriter::Tcp(w))
            }
            Self::Tls(stream) => {
                let (r, w) = tokio::io::split(*stream);
                (TransportReader::Tls(r), TransportWriter::Tls(w))
            }
        }
    }
}

/// Read half of a [`Transport`].
pub enum TransportReader {
    Tcp(OwnedReadHalf),
    Tls(ReadHalf<TlsStream<TcpStream>>),
}

impl TransportReader {
    /// Read up to `buf.len()` bytes. Returns 0 at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Tcp(r) => r.read(buf).await,
            Self::Tls(r) => r.read(buf).await,
        }
    }
}

/// Write half of a [`Transport`].
pub enum TransportWriter {
    Tcp(OwnedWriteHalf),
    Tls(WriteHalf<TlsStream<TcpStream>>),
}

impl TransportWriter {
    /// Transmit one line, appending the CRLF terminator, and flush.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            Self::Tcp(w) => write_line_to(w, line).await,
            Self::Tls(w) => write_line_to(w, line).await,
        }
    }

    /// Close the write side. Errors here are expected during teardown.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Self::Tcp(w) => w.shutdown().await,
            Self::Tls(w) => w.shutdown().await,
        }
    }
}

async fn write_line_to<W: AsyncWriteExt + Unpin>(w: &mut W, line: &str) -> std::io::Result<()> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};
    use std::time::Duration;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

fn tls_connector(accept_invalid_certs: bool) -> TlsConnector {
    let config = if accept_invalid_certs {
        TlsConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoVerification::new()))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            warn!("error loading native root certificate: {}", err);
        }
        for cert in native.certs {
            let _ = roots.add(cert);
        }
        TlsConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

mod danger {
    //! Certificate verifier that accepts everything.
    //!
    //! Only reachable through the `danger_accept_invalid_certs` opt-in.
    //! Signatures are still checked against the presented certificate so
    //! the handshake itself stays well-formed, but the chain, hostname,
    //! and validity period are not.

    use tokio_rustls::rustls::client::danger::{
        HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
    };
    use tokio_rustls::rustls::crypto::{
        verify_tls12_signature, verify_tls13_signature, CryptoProvider,
    };
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use tokio_rustls::rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub(super) struct NoVerification(CryptoProvider);

    impl NoVerification {
        pub(super) fn new() -> Self {
            Self(tokio_rustls::rustls::crypto::aws_lc_rs::default_provider())
        }
    }

    impl ServerCertVerifier for NoVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}
