use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::protocol::MAX_DATAGRAM_SIZE;

/// Unreliable datagram transport connected to a single server.
pub trait DatagramTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Non-blocking. `Ok(0)` means nothing is queued right now.
    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize>;
}

impl<T: DatagramTransport + ?Sized> DatagramTransport for Box<T> {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        (**self).send(datagram)
    }

    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        (**self).receive(buffer)
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl UdpTransport {
    pub fn connect<A: ToSocketAddrs>(bind: A, remote_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        socket.connect(remote_addr)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }
}

impl DatagramTransport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Datagram exceeds MTU",
            ));
        }

        self.socket.send(datagram)?;
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.socket.recv(buffer) {
                Ok(0) => continue,
                Ok(size) => return Ok(size),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                // ICMP port unreachable surfaces here on some platforms before the server is up.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionRefused => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_loopback() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut transport = UdpTransport::connect("127.0.0.1:0", server_addr).unwrap();
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        assert_eq!(transport.receive(&mut buffer).unwrap(), 0);

        transport.send(&[1, 2, 3]).unwrap();
        let (size, from) = server.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..size], &[1, 2, 3]);
        assert_eq!(from, transport.local_addr());

        server.send_to(&[9, 8], from).unwrap();
        let start = std::time::Instant::now();
        let mut size = 0;
        while size == 0 && start.elapsed() < std::time::Duration::from_millis(500) {
            size = transport.receive(&mut buffer).unwrap();
        }
        assert_eq!(&buffer[..size], &[9, 8]);
    }

    #[test]
    fn test_oversized_datagram_rejected() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut transport =
            UdpTransport::connect("127.0.0.1:0", server.local_addr().unwrap()).unwrap();
        let oversized = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(transport.send(&oversized).is_err());
    }
}
