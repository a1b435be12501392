// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport abstraction: one capability, `submit(frame) -> response bytes`,
//! implemented once for a direct TCP `rigctld` endpoint and once for a
//! locally spawned `rigctl` process driven over its stdio. The Connection
//! never sees which one it is talking to.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::error::RigError;
use crate::rig::RigAccess;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A channel a Connection can write request frames to and read response
/// bytes from. Implementations own reconnection; the Connection only calls
/// `write_frame`/`read_bytes`/`reconnect` in response to observed failures.
pub trait Transport: Send {
    fn write_frame<'a>(&'a mut self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), RigError>>;
    fn read_bytes<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, Result<usize, RigError>>;
    fn reconnect(&mut self) -> BoxFuture<'_, Result<(), RigError>>;
    fn close(&mut self);
}

/// Direct TCP connection to a `rigctld`-compatible endpoint.
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn write_frame<'a>(&'a mut self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), RigError>> {
        Box::pin(async move {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| RigError::io("write", "not connected"))?;
            stream
                .write_all(frame)
                .await
                .map_err(|e| RigError::io("write", e.to_string()))
        })
    }

    fn read_bytes<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, Result<usize, RigError>> {
        Box::pin(async move {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| RigError::io("read", "not connected"))?;
            let n = stream
                .read(buf)
                .await
                .map_err(|e| RigError::io("read", e.to_string()))?;
            if n == 0 {
                return Err(RigError::io("read", "peer closed connection"));
            }
            Ok(n)
        })
    }

    fn reconnect(&mut self) -> BoxFuture<'_, Result<(), RigError>> {
        Box::pin(async move {
            self.stream = None;
            let addr = format!("{}:{}", self.host, self.port);
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| RigError::io("connect", e.to_string()))?;
            self.stream = Some(stream);
            Ok(())
        })
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

/// A `rigctl` process spawned against a local device, driven over stdin and
/// stdout with the same wire frames a TCP endpoint would see.
pub struct SubprocessTransport {
    model_id: u32,
    device_path: String,
    baud: u32,
    args: Vec<String>,
    child: Option<Child>,
}

impl SubprocessTransport {
    pub fn new(model_id: u32, device_path: String, baud: u32, args: Vec<String>) -> Self {
        Self {
            model_id,
            device_path,
            baud,
            args,
            child: None,
        }
    }
}

impl Transport for SubprocessTransport {
    fn write_frame<'a>(&'a mut self, frame: &'a [u8]) -> BoxFuture<'a, Result<(), RigError>> {
        Box::pin(async move {
            let child = self
                .child
                .as_mut()
                .ok_or_else(|| RigError::io("write", "rigctl process not running"))?;
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| RigError::io("write", "rigctl stdin closed"))?;
            stdin
                .write_all(frame)
                .await
                .map_err(|e| RigError::io("write", e.to_string()))
        })
    }

    fn read_bytes<'a>(&'a mut self, buf: &'a mut [u8]) -> BoxFuture<'a, Result<usize, RigError>> {
        Box::pin(async move {
            let child = self
                .child
                .as_mut()
                .ok_or_else(|| RigError::io("read", "rigctl process not running"))?;
            let stdout = child
                .stdout
                .as_mut()
                .ok_or_else(|| RigError::io("read", "rigctl stdout closed"))?;
            let n = stdout
                .read(buf)
                .await
                .map_err(|e| RigError::io("read", e.to_string()))?;
            if n == 0 {
                return Err(RigError::io("read", "rigctl process exited"));
            }
            Ok(n)
        })
    }

    fn reconnect(&mut self) -> BoxFuture<'_, Result<(), RigError>> {
        Box::pin(async move {
            if let Some(mut child) = self.child.take() {
                let _ = child.start_kill();
            }
            let child = Command::new("rigctl")
                .arg("-m")
                .arg(self.model_id.to_string())
                .arg("-r")
                .arg(&self.device_path)
                .arg("-s")
                .arg(self.baud.to_string())
                .args(&self.args)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| RigError::io("spawn", e.to_string()))?;
            self.child = Some(child);
            Ok(())
        })
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

/// Build the transport described by a `RigAccess` descriptor.
pub fn transport_for(access: &RigAccess) -> Box<dyn Transport> {
    match access {
        RigAccess::Tcp { host, port } => Box::new(TcpTransport::new(host.clone(), *port)),
        RigAccess::Subprocess {
            model_id,
            device_path,
            baud,
            args,
        } => Box::new(SubprocessTransport::new(
            *model_id,
            device_path.clone(),
            *baud,
            args.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_for_picks_tcp_variant() {
        let access = RigAccess::Tcp {
            host: "127.0.0.1".into(),
            port: 4532,
        };
        let _t: Box<dyn Transport> = transport_for(&access);
    }

    #[test]
    fn transport_for_picks_subprocess_variant() {
        let access = RigAccess::Subprocess {
            model_id: 1,
            device_path: "/dev/ttyUSB0".into(),
            baud: 19200,
            args: vec![],
        };
        let _t: Box<dyn Transport> = transport_for(&access);
    }
}
