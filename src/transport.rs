//! Command transport seam and default UDP implementation.
//!
//! A [`Transport`] is bound to one `(ip, generation)` pair; the owning
//! bridge replaces it whenever the bridge's IP address moves. Tests inject
//! their own implementations through [`TransportFactory`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::debug;

use crate::commands::Command;
use crate::errors::Error;
use crate::types::Generation;

type Result<T> = std::result::Result<T, Error>;

/// The send function handed to zones, bound by the bridge to whatever
/// transport is current at call time.
pub type SendCommands = Arc<dyn Fn(Vec<Command>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Sends opaque command packets to one bridge endpoint.
pub trait Transport: Send + Sync {
    /// Send a batch of command packets, in order.
    fn send_commands(&self, commands: Vec<Command>) -> BoxFuture<'_, Result<()>>;

    /// Release any held resources; sends issued after closing fail.
    fn close(&self);
}

/// Builds a [`Transport`] for an `(ip, generation)` pair.
pub trait TransportFactory: Send + Sync {
    fn bind(&self, ip: &str, generation: Generation) -> Arc<dyn Transport>;
}

/// Fire-and-forget UDP datagram transport.
///
/// Every batch binds an ephemeral socket, connects it to the bridge's
/// command port and writes one datagram per command with a short gap in
/// between; the bridge never acknowledges, so there is nothing to read
/// back.
pub struct UdpTransport {
    addr: String,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Gap between consecutive packets of one batch; legacy bridges drop
    /// packets that arrive back to back.
    const COMMAND_GAP: Duration = Duration::from_millis(50);

    pub fn new(ip: &str, generation: Generation) -> Self {
        UdpTransport {
            addr: format!("{}:{}", ip, generation.command_port()),
            closed: AtomicBool::new(false),
        }
    }

    async fn send_datagrams(&self, commands: Vec<Command>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::TransportClosed);
        }
        if commands.is_empty() {
            return Ok(());
        }

        let socket = tokio::net::UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::socket("bind", e))?;
        socket
            .connect(&self.addr)
            .await
            .map_err(|e| Error::socket("connect", e))?;

        debug!("sending {} command(s) to {}", commands.len(), self.addr);
        for (index, command) in commands.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(Self::COMMAND_GAP).await;
            }
            socket
                .send(command.as_bytes())
                .await
                .map_err(|e| Error::socket("send", e))?;
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send_commands(&self, commands: Vec<Command>) -> BoxFuture<'_, Result<()>> {
        self.send_datagrams(commands).boxed()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Default factory producing [`UdpTransport`] instances.
#[derive(Debug, Default)]
pub struct UdpTransportFactory;

impl TransportFactory for UdpTransportFactory {
    fn bind(&self, ip: &str, generation: Generation) -> Arc<dyn Transport> {
        Arc::new(UdpTransport::new(ip, generation))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    pub(crate) struct FakeTransport {
        pub(crate) addr: String,
        closed: AtomicBool,
    }

    impl FakeTransport {
        pub(crate) fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl Transport for FakeTransport {
        fn send_commands(&self, _commands: Vec<Command>) -> BoxFuture<'_, Result<()>> {
            async { Ok(()) }.boxed()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Factory that records every transport it hands out.
    #[derive(Default)]
    pub(crate) struct FakeTransportFactory {
        pub(crate) bound: Mutex<Vec<Arc<FakeTransport>>>,
    }

    impl TransportFactory for FakeTransportFactory {
        fn bind(&self, ip: &str, generation: Generation) -> Arc<dyn Transport> {
            let transport = Arc::new(FakeTransport {
                addr: format!("{}:{}", ip, generation.command_port()),
                closed: AtomicBool::new(false),
            });
            self.bound.lock().unwrap().push(Arc::clone(&transport));
            transport
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ZoneCommands;
    use crate::types::ZoneType;

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let transport = UdpTransport::new("127.0.0.1", Generation::Legacy);
        transport.close();

        let command = ZoneCommands::for_zone(Generation::Legacy, ZoneType::Rgbw)
            .on(1)
            .unwrap();
        let result = transport.send_commands(vec![command]).await;
        assert_eq!(result.unwrap_err(), Error::TransportClosed);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let transport = UdpTransport::new("127.0.0.1", Generation::IBox);
        assert!(transport.send_commands(Vec::new()).await.is_ok());
    }
}
