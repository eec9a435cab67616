use crate::acl::{AclError, AclManager, UserIdentity};
use crate::protocol::mysql::basic::{client_handshake_response, HandshakeResponse};
use crate::protocol::mysql::charset::DEFAULT_COLLATION_ID;
use crate::protocol::mysql::constants::{AuthPluginName, SCRAMBLE_SIZE};
use crate::protocol::mysql::error_codes::ErrorKind;
use crate::protocol::mysql::packet::packet_reader::PacketReader;
use crate::protocol::mysql::packet::packet_writer::PacketWriter;
use crate::protocol::mysql::packet::writers;
use crate::server::{default_capabilities, SERVER_VERSION};

use mysql_common::constants::StatusFlags;
use std::io::{self, Error};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Server-side `mysql_native_password` authentication: send the v10
/// handshake, read the client's response, verify it against the ACL engine.
pub struct NativeAuthenticator {
    acl: Arc<AclManager>,
}

impl NativeAuthenticator {
    pub fn new(acl: Arc<AclManager>) -> Self {
        NativeAuthenticator { acl }
    }

    /// Emit the initial handshake and parse the client's reply. Returns the
    /// reply's sequence id along with the parsed response.
    pub async fn initial_handshake<R, W>(
        &self,
        conn_id: u32,
        scramble: [u8; SCRAMBLE_SIZE],
        client_reader: &mut PacketReader<R>,
        client_writer: &mut PacketWriter<W>,
    ) -> Result<(u8, HandshakeResponse), Error>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        writers::write_initial_handshake(
            client_writer,
            conn_id,
            scramble,
            SERVER_VERSION.as_bytes(),
            default_capabilities(),
            StatusFlags::SERVER_STATUS_AUTOCOMMIT,
            DEFAULT_COLLATION_ID,
        )
        .await?;

        let Some((seq, pkt)) = client_reader.next_async().await? else {
            warn!("GateSrv failed to read client HandshakeResponse");
            return Err(Error::new(
                io::ErrorKind::ConnectionAborted,
                "peer terminated connection",
            ));
        };
        match client_handshake_response(&pkt) {
            Ok((_, response)) => Ok((seq, response)),
            Err(e) => {
                client_writer.set_seq(seq.wrapping_add(1));
                writers::write_err_packet(
                    client_writer,
                    default_capabilities(),
                    ErrorKind::ER_HANDSHAKE_ERROR,
                    b"malformed handshake response",
                )
                .await?;
                client_writer.flush_all().await?;
                Err(Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad handshake response: {e:?}"),
                ))
            }
        }
    }

    /// Verify one challenge-response pair against the grant tables.
    pub fn verify(
        &self,
        username: &str,
        client_host: &str,
        scramble: &[u8],
        auth_response: &[u8],
        auth_plugin: &[u8],
    ) -> Result<UserIdentity, AclError> {
        // an empty plugin name means the client took ours from the handshake
        if !auth_plugin.is_empty()
            && auth_plugin != AuthPluginName::AuthNativePassword.as_ref().as_bytes()
        {
            debug!(
                "GateSrv client offered unsupported auth plugin {:?}",
                String::from_utf8_lossy(auth_plugin)
            );
            return Err(AclError::AuthFailed {
                user: username.to_string(),
                host: client_host.to_string(),
            });
        }
        self.acl
            .authenticate(username, client_host, scramble, auth_response)
    }
}
