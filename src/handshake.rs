//! The `LINK`-framed authentication handshake run immediately after dialing
//! or accepting, unless `auto_auth` is turned off.

use std::time::Duration;

use crate::connection::{Connection, Role};
use crate::error::NcpError;
use crate::identifier::Identifier;
use crate::value::ParamValue;

/// Canned response the client echoes back for the challenge step. The source
/// protocol accepts any fixed string here; this is the one this library
/// always sends and always accepts.
const CANNED_AUTH_RESPONSE: &str = "NCP-CLIENT-AUTH-1";

fn id(s: &str) -> Identifier {
    Identifier::new(s).expect("well-known protocol identifiers are always valid")
}

async fn run_inner(conn: &Connection, role: Role) -> Result<(), NcpError> {
    match role {
        Role::Client => run_client(conn).await,
        Role::Server => run_server(conn).await,
    }
}

pub(crate) async fn run(conn: &Connection, role: Role, deadline: Option<Duration>) -> Result<(), NcpError> {
    let result = match deadline {
        Some(d) => tokio::time::timeout(d, run_inner(conn, role))
            .await
            .map_err(|_| NcpError::Authentication("handshake did not complete before the deadline".into()))?,
        None => run_inner(conn, role).await,
    };
    if result.is_err() {
        conn.close().await;
    }
    result
}

async fn run_client(conn: &Connection) -> Result<(), NcpError> {
    conn.recv_field(Some(id("LINK")), id("HELO")).await?;

    let hostname = conn.options().hostname_or_local();
    let mut challenge = conn
        .send(id("LINK"), id("CCRE"), [(id("CIW"), ParamValue::Str(hostname))])
        .await?;
    challenge.recv_field(id("SCAR")).await?;

    let mut confirm = conn
        .send(
            id("LINK"),
            id("CARE"),
            [(id("CAR"), ParamValue::Str(CANNED_AUTH_RESPONSE.to_string()))],
        )
        .await?;
    confirm.recv_field(id("SCON")).await?;
    Ok(())
}

async fn run_server(conn: &Connection) -> Result<(), NcpError> {
    let hostname = conn.options().hostname_or_local();
    conn.send(id("LINK"), id("HELO"), [(id("SRVN"), ParamValue::Str(hostname))])
        .await?;

    let ccre = conn.recv_field(Some(id("LINK")), id("CCRE")).await?;
    ccre.reply(
        id("LINK"),
        id("SCAR"),
        [(id("SIW"), ParamValue::Str(CANNED_AUTH_RESPONSE.to_string()))],
    )
    .await?;

    let care = conn.recv_field(Some(id("LINK")), id("CARE")).await?;
    let response_matches = matches!(
        care.get(id("CAR")),
        Some(ParamValue::Str(s)) if s == CANNED_AUTH_RESPONSE
    );
    if !response_matches {
        return Err(NcpError::Authentication("client auth response did not match".into()));
    }
    care.reply(id("LINK"), id("SCON"), []).await?;
    Ok(())
}
