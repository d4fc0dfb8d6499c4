//! TLS bundle handling: maps the configured PEM material onto a
//! `native-tls` connector for `tokio-postgres`.

use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::tls::MakeTlsConnect;

use super::PostgresTls;
use crate::error::SqlGatewayError;

/// Parse the bundle without connecting, so configuration errors surface at
/// client-build time.
pub(crate) fn validate(tls: &PostgresTls) -> Result<(), SqlGatewayError> {
    build_native_connector(tls).map(|_| ())
}

pub(crate) fn make_connector(
    tls: &PostgresTls,
) -> Result<GatewayTlsConnector, SqlGatewayError> {
    let connector = build_native_connector(tls)?;
    Ok(GatewayTlsConnector {
        inner: MakeTlsConnector::new(connector),
        server_name: tls.server_name.clone(),
    })
}

fn build_native_connector(tls: &PostgresTls) -> Result<NativeTlsConnector, SqlGatewayError> {
    let mut builder = NativeTlsConnector::builder();
    builder.danger_accept_invalid_certs(tls.allow_insecure);

    if let Some(ca) = &tls.server_ca_pem {
        let cert = Certificate::from_pem(ca.as_bytes()).map_err(|err| {
            SqlGatewayError::Config(format!("unable to parse server CA certificate: {err}"))
        })?;
        builder.add_root_certificate(cert);
    }

    match (&tls.client_cert_pem, &tls.client_key_pem) {
        (Some(cert), Some(key)) => {
            let identity =
                Identity::from_pkcs8(cert.as_bytes(), key.as_bytes()).map_err(|err| {
                    SqlGatewayError::Config(format!("unable to build client identity: {err}"))
                })?;
            builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(SqlGatewayError::Config(
                "client certificate and client key must both be provided".to_string(),
            ));
        }
    }

    builder.build().map_err(|err| {
        SqlGatewayError::Config(format!("unable to build TLS connector: {err}"))
    })
}

/// `MakeTlsConnect` shim that substitutes the configured server name for
/// the connection host during certificate verification.
#[derive(Clone)]
pub(crate) struct GatewayTlsConnector {
    inner: MakeTlsConnector,
    server_name: Option<String>,
}

impl<S> MakeTlsConnect<S> for GatewayTlsConnector
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = <MakeTlsConnector as MakeTlsConnect<S>>::Stream;
    type TlsConnect = <MakeTlsConnector as MakeTlsConnect<S>>::TlsConnect;
    type Error = <MakeTlsConnector as MakeTlsConnect<S>>::Error;

    fn make_tls_connect(&mut self, domain: &str) -> Result<Self::TlsConnect, Self::Error> {
        let domain = self.server_name.as_deref().unwrap_or(domain);
        <MakeTlsConnector as MakeTlsConnect<S>>::make_tls_connect(&mut self.inner, domain)
    }
}
