//! Sentinel query client
//!
//! Issues `SENTINEL GET-MASTER-ADDR-BY-NAME` over a short-lived TCP
//! connection, one connection per tick, with the group's timeout bounding
//! both the connect and every read. Endpoints are tried in order; the first
//! one that answers wins. The caller treats any error uniformly as "no
//! observation this tick".

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::MonitoredGroup;
use crate::error::{Error, Result};
use crate::resp::{self, ParseError, Reply};

/// Query a group's sentinels for the currently reported master address.
pub async fn query_master(group: &MonitoredGroup) -> Result<String> {
    let mut last_err = Error::NoEndpoint;

    for (host, port) in &group.endpoints {
        match query_endpoint(host, *port, &group.master_name, group.query_timeout).await {
            Ok(addr) => return Ok(addr),
            Err(e) => {
                log::debug!(
                    "[{}] sentinel {}:{} query failed: {}",
                    group.namespace,
                    host,
                    port,
                    e
                );
                last_err = e;
            }
        }
    }

    Err(last_err)
}

async fn query_endpoint(
    host: &str,
    port: u16,
    master_name: &str,
    query_timeout: Duration,
) -> Result<String> {
    let addr = format!("{}:{}", host, port);

    let mut stream = match timeout(query_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(Error::Timeout("connect")),
    };

    let cmd = resp::encode_command(&[
        b"SENTINEL",
        b"get-master-addr-by-name",
        master_name.as_bytes(),
    ]);
    stream.write_all(&cmd).await?;

    let mut buffer = BytesMut::with_capacity(256);
    let reply = loop {
        match resp::parse_reply(&buffer) {
            Ok((reply, _)) => break reply,
            Err(ParseError::Incomplete) => {}
            Err(e) => return Err(Error::Protocol(e.to_string())),
        }

        let n = match timeout(query_timeout, stream.read_buf(&mut buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::Timeout("read")),
        };
        if n == 0 {
            return Err(Error::Protocol("connection closed mid-reply".to_string()));
        }
    };

    master_addr_from_reply(reply)
}

/// Extract `ip:port` from a GET-MASTER-ADDR-BY-NAME reply: a two-element
/// array of bulk strings, or a null reply when the master name is unknown.
fn master_addr_from_reply(reply: Reply) -> Result<String> {
    match reply {
        Reply::Array(Some(items)) if items.len() == 2 => {
            let mut parts = Vec::with_capacity(2);
            for item in items {
                match item {
                    Reply::Bulk(Some(data)) => {
                        parts.push(String::from_utf8_lossy(&data).into_owned())
                    }
                    other => {
                        return Err(Error::Protocol(format!(
                            "unexpected element in address reply: {:?}",
                            other
                        )));
                    }
                }
            }
            parts[1]
                .parse::<u16>()
                .map_err(|_| Error::Protocol(format!("invalid master port '{}'", parts[1])))?;
            Ok(format!("{}:{}", parts[0], parts[1]))
        }
        Reply::Array(None) | Reply::Bulk(None) => {
            Err(Error::Protocol("master name unknown to sentinel".to_string()))
        }
        Reply::Error(msg) => Err(Error::Protocol(String::from_utf8_lossy(&msg).into_owned())),
        other => Err(Error::Protocol(format!("unexpected reply: {:?}", other))),
    }
}
